//! Telegram update handlers.
//!
//! Each handler converts the teloxide message into the core's update model and
//! hands it to the moderation engine.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use curfew_core::{
    commands::{parse_command, ModerationCommand},
    domain::{ChatId, ChatKind, MessageId, UserId},
    messaging::types::{Command, IncomingUpdate, TextMessage},
};

use crate::router::AppState;

mod commands;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    for update in to_incoming(&msg) {
        match update {
            IncomingUpdate::Command(cmd) => {
                commands::handle_command(bot.clone(), msg.clone(), cmd, state.clone()).await?
            }
            IncomingUpdate::Text(text) => text::handle_text(text, state.clone()).await?,
        }
    }
    Ok(())
}

fn chat_kind(msg: &Message) -> ChatKind {
    if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    }
}

/// Updates to process for `msg`, in order.
///
/// Every text is handed to the link filter, commands included. A command the
/// bot owns is answered first. Empty for messages without a human sender or
/// without text.
fn to_incoming(msg: &Message) -> Vec<IncomingUpdate> {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Vec::new();
    };

    let chat_id = ChatId(msg.chat.id.0);
    let chat_kind = chat_kind(msg);
    let user_id = UserId(user.id.0 as i64);

    let mut out = Vec::with_capacity(2);
    if text.starts_with('/') {
        let (name, args) = parse_command(text);
        if ModerationCommand::from_parts(&name, &args).is_some() {
            out.push(IncomingUpdate::Command(Command {
                chat_id,
                chat_kind,
                user_id,
                name,
                args,
            }));
        }
    }

    out.push(IncomingUpdate::Text(TextMessage {
        chat_id,
        chat_kind,
        message_id: MessageId(msg.id.0),
        user_id,
        text: text.to_string(),
    }));
    out
}
