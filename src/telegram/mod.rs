//! Telegram Bot API access: wire types and the `getUpdates` sources.
//! Docs: <https://core.telegram.org/bots/api#getupdates>

pub mod source;
pub mod types;

pub use source::{HttpUpdateSource, UpdateSource, UpdatesQuery};
pub use types::{Message, Update};

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
