//! Telegram adapter (teloxide).
//!
//! This crate implements the `curfew-core` MessagingPort over the Telegram Bot API
//! and routes incoming updates into the moderation engine.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ChatPermissions as TgPermissions};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use curfew_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::ChatPermissions},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

pub(crate) fn to_tg_permissions(perms: ChatPermissions) -> TgPermissions {
    let mut out = TgPermissions::empty();
    let flags = [
        (perms.send_messages, TgPermissions::SEND_MESSAGES),
        (perms.send_media_messages, TgPermissions::SEND_MEDIA_MESSAGES),
        (perms.send_polls, TgPermissions::SEND_POLLS),
        (perms.send_other_messages, TgPermissions::SEND_OTHER_MESSAGES),
        (perms.add_web_page_previews, TgPermissions::ADD_WEB_PAGE_PREVIEWS),
        (perms.change_info, TgPermissions::CHANGE_INFO),
        (perms.invite_users, TgPermissions::INVITE_USERS),
        (perms.pin_messages, TgPermissions::PIN_MESSAGES),
    ];
    for (enabled, flag) in flags {
        if enabled {
            out |= flag;
        }
    }
    out
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn set_chat_permissions(&self, chat_id: ChatId, perms: ChatPermissions) -> Result<()> {
        let tg_perms = to_tg_permissions(perms);
        self.with_retry(|| {
            self.bot
                .set_chat_permissions(Self::tg_chat(chat_id), tg_perms)
        })
        .await?;
        Ok(())
    }

    async fn list_chat_admins(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        let admins = self
            .with_retry(|| self.bot.get_chat_administrators(Self::tg_chat(chat_id)))
            .await?;
        Ok(admins
            .into_iter()
            .map(|m| UserId(m.user.id.0 as i64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_permissions_are_empty() {
        assert_eq!(
            to_tg_permissions(ChatPermissions::closed()),
            TgPermissions::empty()
        );
    }

    #[test]
    fn open_permissions_allow_sending_but_not_admin_actions() {
        let p = to_tg_permissions(ChatPermissions::open());
        assert!(p.contains(TgPermissions::SEND_MESSAGES));
        assert!(p.contains(TgPermissions::SEND_POLLS));
        assert!(p.contains(TgPermissions::INVITE_USERS));
        assert!(!p.contains(TgPermissions::CHANGE_INFO));
        assert!(!p.contains(TgPermissions::PIN_MESSAGES));
    }
}
