use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::ChatPermissions,
    Result,
};

/// Outbound transport actions the moderation engine needs.
///
/// Every call reports success or failure; callers decide how to degrade.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn set_chat_permissions(&self, chat_id: ChatId, perms: ChatPermissions) -> Result<()>;

    /// Ids of every administrator (creator included) of `chat_id`.
    async fn list_chat_admins(&self, chat_id: ChatId) -> Result<Vec<UserId>>;
}
