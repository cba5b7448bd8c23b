//! Moderation engine for group chats: a daily open/close schedule and a link
//! filter with whitelists, backed by a key/value policy store.
//!
//! This crate is framework-agnostic. Telegram lives behind the
//! [`messaging::port::MessagingPort`] trait implemented in the adapter crate.

pub mod admin;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod group;
pub mod link_filter;
pub mod logging;
pub mod messaging;
pub mod scheduler;
pub mod store;

pub use errors::{Error, Result};
