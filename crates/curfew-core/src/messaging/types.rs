use crate::domain::{ChatId, ChatKind, MessageId, MessageRef, UserId};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub user_id: UserId,
    pub name: String,
    pub args: String,
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub text: String,
}

impl TextMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// Default send-permissions of a group member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatPermissions {
    pub send_messages: bool,
    pub send_media_messages: bool,
    pub send_polls: bool,
    pub send_other_messages: bool,
    pub add_web_page_previews: bool,
    pub change_info: bool,
    pub invite_users: bool,
    pub pin_messages: bool,
}

impl ChatPermissions {
    /// Fully restrictive set applied when a group closes for the night.
    pub const fn closed() -> Self {
        Self {
            send_messages: false,
            send_media_messages: false,
            send_polls: false,
            send_other_messages: false,
            add_web_page_previews: false,
            change_info: false,
            invite_users: false,
            pin_messages: false,
        }
    }

    /// Permissive set applied when a group opens in the morning.
    pub const fn open() -> Self {
        Self {
            send_messages: true,
            send_media_messages: true,
            send_polls: true,
            send_other_messages: true,
            add_web_page_previews: true,
            change_info: false,
            invite_users: true,
            pin_messages: false,
        }
    }
}
