//! Telegram day-log setup wizard.
//!
//! Prompts for the bot token, chat id, polling settings and relay address in
//! the terminal, then writes `config.toml` to the project root
//! (`DAYLOG_ROOT`, or the current directory).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    bot_token: &'a str,
    chat_id: &'a str,
    interval_ms: u64,
    interactive_settings: bool,
    relay_url: &'a str,
    relay_bind: &'a str,
    export_dir: &'a str,
}

/// TOML string literal for `s`, escaped as needed.
fn toml_str(s: &str) -> String {
    toml::Value::String(s.to_owned()).to_string()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    // Numeric ids stay numeric; @channel names are quoted.
    let chat_id = if p.chat_id.parse::<i64>().is_ok() {
        p.chat_id.to_owned()
    } else {
        toml_str(p.chat_id)
    };

    let relay_line = if p.relay_url.is_empty() {
        "# relay_url = \"http://127.0.0.1:3000/api/telegram\"".to_owned()
    } else {
        format!("relay_url = {}", toml_str(p.relay_url))
    };

    let bot_token = toml_str(p.bot_token);
    let interval_ms = p.interval_ms.clamp(1000, 10_000);
    let interactive = p.interactive_settings;
    let relay_bind = toml_str(p.relay_bind);
    let export_dir = toml_str(p.export_dir);

    format!(
        r#"[telegram]
bot_token = {bot_token}
chat_id = {chat_id}

[poller]
interval_ms = {interval_ms}
interactive_settings = {interactive}
{relay_line}
export_dir = {export_dir}

[relay]
bind = {relay_bind}
"#
    )
}

fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => true,
        "n" | "no" | "false" => false,
        _ => default,
    }
}

// ── CLI wizard ─────────────────────────────────────────────────────────────────

fn run_cli(project_root: &Path) -> Result<()> {
    println!("=== Telegram Day-Log Setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let bot_token = read_line("Telegram bot token: ")?;
    let chat_id = read_line("Chat id (e.g. -1001234567890): ")?;
    let interval_ms = or_default(read_line("Polling interval in ms [2000]: ")?, "2000")
        .parse::<u64>()
        .context("Polling interval must be a whole number of milliseconds")?;
    let interactive_settings = parse_yes_no(
        &read_line("Allow changing settings from the console? [Y/n]: ")?,
        true,
    );
    let relay_url = read_line("Relay URL to poll through (blank = call Telegram directly): ")?;
    let relay_bind = or_default(
        read_line("Relay listen address [127.0.0.1:3000]: ")?,
        "127.0.0.1:3000",
    );
    let export_dir = or_default(read_line("Export directory [.]: ")?, ".");

    let config = format_config(&ConfigParams {
        bot_token: &bot_token,
        chat_id: &chat_id,
        interval_ms,
        interactive_settings,
        relay_url: &relay_url,
        relay_bind: &relay_bind,
        export_dir: &export_dir,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the dashboard with:  cargo run");
    println!("   Run the relay with:      cargo run -- relay");
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Resolve project root: prefer DAYLOG_ROOT env, fall back to cwd.
    let project_root =
        PathBuf::from(std::env::var("DAYLOG_ROOT").unwrap_or_else(|_| ".".to_string()));

    run_cli(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
