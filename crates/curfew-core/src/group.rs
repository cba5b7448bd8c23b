//! Per-chat moderation policy.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, UserId};

pub const DEFAULT_OPEN_TIME: &str = "09:00";
pub const DEFAULT_CLOSE_TIME: &str = "22:00";
pub const DEFAULT_EVENING_MESSAGE: &str = "The chat is closed until morning. Good night! 🌙";
pub const DEFAULT_MORNING_MESSAGE: &str = "Good morning! The chat is open. 🌞";

/// Moderation settings of one group chat.
///
/// Stored as a single record so readers see either all fields of a write or none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratedGroup {
    pub chat_id: i64,
    /// Zero-padded `HH:MM`.
    pub open_time: String,
    /// Zero-padded `HH:MM`.
    pub close_time: String,
    #[serde(default)]
    pub whitelisted_links: Vec<String>,
    #[serde(default)]
    pub whitelisted_users: Vec<i64>,
    pub evening_message: String,
    pub morning_message: String,
    pub moderate_links: bool,
    pub moderate_scheduled: bool,
}

impl ModeratedGroup {
    /// Fresh record created by `/moderate`.
    pub fn with_defaults(chat_id: ChatId) -> Self {
        Self {
            chat_id: chat_id.0,
            open_time: DEFAULT_OPEN_TIME.to_string(),
            close_time: DEFAULT_CLOSE_TIME.to_string(),
            whitelisted_links: Vec::new(),
            whitelisted_users: Vec::new(),
            evening_message: DEFAULT_EVENING_MESSAGE.to_string(),
            morning_message: DEFAULT_MORNING_MESSAGE.to_string(),
            moderate_links: true,
            moderate_scheduled: true,
        }
    }

    pub fn id(&self) -> ChatId {
        ChatId(self.chat_id)
    }

    pub fn is_user_whitelisted(&self, user_id: UserId) -> bool {
        self.whitelisted_users.contains(&user_id.0)
    }

    /// Add a link/substring to the local whitelist. Returns false if an equal
    /// entry (ignoring case) is already present.
    pub fn add_whitelisted_link(&mut self, entry: &str) -> bool {
        let entry = entry.trim();
        if entry.is_empty() || contains_ignore_case(&self.whitelisted_links, entry) {
            return false;
        }
        self.whitelisted_links.push(entry.to_string());
        true
    }

    pub fn add_whitelisted_user(&mut self, user_id: UserId) -> bool {
        if self.whitelisted_users.contains(&user_id.0) {
            return false;
        }
        self.whitelisted_users.push(user_id.0);
        true
    }
}

pub(crate) fn contains_ignore_case(list: &[String], entry: &str) -> bool {
    let needle = entry.to_lowercase();
    list.iter().any(|e| e.to_lowercase() == needle)
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").expect("valid regex"))
}

/// Validate a 24-hour `HH:MM` time-of-day.
///
/// The hour may be a single digit (`9:05`); the minute must have two digits.
pub fn is_valid_time(raw: &str) -> bool {
    time_re().is_match(raw)
}

/// Validate and normalize to the zero-padded form the scheduler compares against.
pub fn normalize_time(raw: &str) -> Option<String> {
    let caps = time_re().captures(raw)?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some(format!("{hour:02}:{minute:02}"))
}
