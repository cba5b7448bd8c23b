//! Classifies message text as containing links or mentions outside the whitelist.

use std::sync::OnceLock;

use regex::Regex;

use crate::{group::ModeratedGroup, store::PolicyStore};

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://\S+").expect("valid regex"))
}

fn tme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)t\.me/\S+").expect("valid regex"))
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\w+").expect("valid regex"))
}

/// Every URL, `t.me/` link and @-mention in `text`, in that order.
///
/// The three classes are matched independently, so `https://t.me/x` yields both
/// the URL and the `t.me/x` token.
pub fn extract_references(text: &str) -> Vec<&str> {
    url_re()
        .find_iter(text)
        .chain(tme_re().find_iter(text))
        .chain(mention_re().find_iter(text))
        .map(|m| m.as_str())
        .collect()
}

/// A token is allowed if any whitelist entry is a case-insensitive substring of it.
fn is_whitelisted(token: &str, whitelist: &[String]) -> bool {
    let token = token.to_lowercase();
    whitelist
        .iter()
        .filter(|entry| !entry.is_empty())
        .any(|entry| token.contains(&entry.to_lowercase()))
}

/// True if `text` references something not covered by `global` or the group's
/// own whitelist. Text without references is always allowed.
pub fn contains_disallowed_reference(text: &str, group: &ModeratedGroup, global: &[String]) -> bool {
    extract_references(text).into_iter().any(|token| {
        !is_whitelisted(token, global) && !is_whitelisted(token, &group.whitelisted_links)
    })
}

/// Link filter bound to the policy store's global whitelist.
pub struct LinkFilter<'a> {
    store: &'a PolicyStore,
}

impl<'a> LinkFilter<'a> {
    pub fn new(store: &'a PolicyStore) -> Self {
        Self { store }
    }

    /// Like [`contains_disallowed_reference`], fetching the global whitelist first.
    ///
    /// An unreadable global whitelist is treated as empty, which makes the
    /// filter stricter rather than disabling it.
    pub async fn contains_disallowed_reference(&self, text: &str, group: &ModeratedGroup) -> bool {
        if extract_references(text).is_empty() {
            return false;
        }

        let global = match self.store.global_whitelist().await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "failed to load global whitelist");
                Vec::new()
            }
        };
        contains_disallowed_reference(text, group, &global)
    }
}
