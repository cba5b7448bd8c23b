use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::FixedOffset;

use crate::{domain::UserId, errors::Error, Result};

/// Typed configuration loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub global_admin_id: UserId,

    // Storage
    pub store_path: Option<PathBuf>,
    pub store_namespace: String,

    // Scheduling
    pub schedule_utc_offset: Option<FixedOffset>,
    pub scheduler_restart_backoff: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let global_admin_id = env_str("GLOBAL_ADMIN_ID")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(UserId)
            .ok_or_else(|| {
                Error::Config("GLOBAL_ADMIN_ID environment variable is required".to_string())
            })?;

        let store_path = env_str("STORE_PATH").and_then(non_empty).map(PathBuf::from);
        let store_namespace = env_str("STORE_NAMESPACE")
            .and_then(non_empty)
            .unwrap_or_else(|| "curfew".to_string());

        let schedule_utc_offset = match env_str("SCHEDULE_UTC_OFFSET").and_then(non_empty) {
            Some(raw) => Some(parse_utc_offset(&raw).ok_or_else(|| {
                Error::Config(format!("SCHEDULE_UTC_OFFSET must look like +03:00, got {raw}"))
            })?),
            None => None,
        };

        let scheduler_restart_backoff =
            Duration::from_secs(env_u64("SCHEDULER_RESTART_BACKOFF_SECS").unwrap_or(5));

        Ok(Self {
            telegram_bot_token,
            global_admin_id,
            store_path,
            store_namespace,
            schedule_utc_offset,
            scheduler_restart_backoff,
        })
    }
}

/// Parse `+HH:MM` / `-HH:MM` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let (h, m) = rest.split_once(':')?;
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if !(0..=14).contains(&h) || !(0..=59).contains(&m) {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
