//! Line-oriented command console for the `watch` dashboard.

use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, warn};

use crate::poller::Poller;

pub const HELP_TEXT: &str = "Commands:\n\
     /start - Start polling\n\
     /stop - Stop polling\n\
     /clear - Clear today's messages\n\
     /export - Export today's messages to JSON\n\
     /status - Show connection status\n\
     /interval <ms> - Set polling interval (1000-10000)\n\
     /token <bot token> - Set the bot token\n\
     /chat <chat id> - Set the chat id\n\
     /quit - Exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Clear,
    Export,
    Status,
    Help,
    Quit,
    Interval(u64),
    Token(String),
    Chat(String),
}

/// Parse one console line. The leading `/` is optional.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line);
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let require_arg = |usage: &str| {
        if arg.is_empty() {
            Err(format!("Usage: {usage}"))
        } else {
            Ok(arg.to_string())
        }
    };

    match name.to_ascii_lowercase().as_str() {
        "start" => Ok(Command::Start),
        "stop" => Ok(Command::Stop),
        "clear" => Ok(Command::Clear),
        "export" => Ok(Command::Export),
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "interval" => require_arg("/interval <ms>")?
            .parse::<u64>()
            .map(Command::Interval)
            .map_err(|_| "Interval must be a whole number of milliseconds".to_string()),
        "token" => require_arg("/token <bot token>").map(Command::Token),
        "chat" => require_arg("/chat <chat id>").map(Command::Chat),
        "" => Err(String::new()),
        other => Err(format!("Unknown command: /{other} (try /help)")),
    }
}

/// Carry out a command and describe the result. `Quit` is the caller's job.
pub async fn execute(poller: &Poller, command: Command, export_dir: &Path) -> Result<String> {
    let reply = match command {
        Command::Start => match poller.start().await {
            Ok(()) => "Polling started.".to_string(),
            Err(e) => format!("Cannot start: {e}. Set it with /token or /chat, or in config.toml."),
        },
        Command::Stop => {
            poller.stop().await;
            "Polling stopped.".to_string()
        }
        Command::Clear => {
            poller.clear().await;
            "Messages cleared.".to_string()
        }
        Command::Export => {
            let path = poller.export_day(export_dir).await?;
            format!("Exported to {}", path.display())
        }
        Command::Status => {
            let s = poller.snapshot().await;
            format!(
                "Status: {} | day: {} | messages: {} | last update: {} | interval: {}ms{}",
                s.status,
                s.day,
                s.messages.len(),
                s.last_update_id,
                s.interval.as_millis(),
                if poller.interactive_settings() { "" } else { " | settings locked" }
            )
        }
        Command::Help | Command::Quit => HELP_TEXT.to_string(),
        Command::Interval(ms) => match poller.set_interval(ms).await {
            Ok(interval) => format!("Polling every {}ms.", interval.as_millis()),
            Err(e) => format!("Cannot change interval: {e}"),
        },
        Command::Token(token) => match poller.set_bot_token(&token).await {
            Ok(()) => "Bot token updated. Use /start to (re)connect.".to_string(),
            Err(e) => format!("Cannot change token: {e}"),
        },
        Command::Chat(chat_id) => match poller.set_chat_id(&chat_id).await {
            Ok(()) => format!("Watching chat {chat_id}."),
            Err(e) => format!("Cannot change chat: {e}"),
        },
    };
    Ok(reply)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    /// Stdin closed; the dashboard keeps running without a console.
    Eof,
}

pub async fn run(poller: Poller, export_dir: &Path) -> ConsoleExit {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ConsoleExit::Eof,
            Err(e) => {
                warn!("Console read failed: {}", e);
                return ConsoleExit::Eof;
            }
        };

        let command = match parse_command(&line) {
            Ok(Command::Quit) => return ConsoleExit::Quit,
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    println!("{message}");
                }
                continue;
            }
        };

        match execute(&poller, command, export_dir).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => {
                error!("Command failed: {:#}", e);
                println!("Error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::today;
    use crate::poller::{ConnectionStatus, PollerSettings};
    use crate::telegram::HttpUpdateSource;
    use std::sync::Arc;
    use std::time::Duration;

    fn poller(interactive: bool) -> Poller {
        Poller::new(
            Arc::new(HttpUpdateSource::direct("http://127.0.0.1:9")),
            "",
            "-100",
            PollerSettings {
                interval: Duration::from_secs(2),
                interactive_settings: interactive,
            },
            today(),
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/start"), Ok(Command::Start));
        assert_eq!(parse_command("stop"), Ok(Command::Stop));
        assert_eq!(parse_command("  /CLEAR "), Ok(Command::Clear));
        assert_eq!(parse_command("/export"), Ok(Command::Export));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
        assert_eq!(parse_command("/interval 5000"), Ok(Command::Interval(5000)));
        assert_eq!(
            parse_command("/token 123:abc"),
            Ok(Command::Token("123:abc".to_string()))
        );
        assert_eq!(
            parse_command("/chat -100123"),
            Ok(Command::Chat("-100123".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command(""), Err(String::new()));
        assert_eq!(parse_command("/interval"), Err("Usage: /interval <ms>".to_string()));
        assert!(parse_command("/interval fast").is_err());
        assert!(parse_command("/bogus").unwrap_err().contains("Unknown command"));
    }

    #[tokio::test]
    async fn test_start_without_token_explains() {
        let p = poller(true);
        let reply = execute(&p, Command::Start, Path::new(".")).await.unwrap();
        assert!(reply.starts_with("Cannot start: configuration error: bot token is not set"));
        assert_eq!(p.snapshot().await.status, ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn test_interval_respects_interactive_flag() {
        let open = poller(true);
        let reply = execute(&open, Command::Interval(100), Path::new("."))
            .await
            .unwrap();
        assert_eq!(reply, "Polling every 1000ms.");

        let locked = poller(false);
        let reply = execute(&locked, Command::Interval(3000), Path::new("."))
            .await
            .unwrap();
        assert!(reply.starts_with("Cannot change interval"));
    }

    #[tokio::test]
    async fn test_status_and_export() {
        let p = poller(true);
        let status = execute(&p, Command::Status, Path::new(".")).await.unwrap();
        assert!(status.starts_with("Status: idle"));
        assert!(status.contains("messages: 0"));

        let dir = tempfile::tempdir().unwrap();
        let reply = execute(&p, Command::Export, dir.path()).await.unwrap();
        assert!(reply.starts_with("Exported to "));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
