use std::sync::Arc;

use crate::{
    domain::{ChatId, UserId},
    messaging::port::MessagingPort,
};

/// Decides whether a user may administer a chat.
#[derive(Clone)]
pub struct AdminResolver {
    global_admin: UserId,
    messenger: Arc<dyn MessagingPort>,
}

impl AdminResolver {
    pub fn new(global_admin: UserId, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            global_admin,
            messenger,
        }
    }

    pub fn is_global_admin(&self, user_id: UserId) -> bool {
        user_id == self.global_admin
    }

    /// Global admin, or one of the chat's administrators.
    ///
    /// A failed admin lookup is logged and treated as "not an admin".
    pub async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        if self.is_global_admin(user_id) {
            return true;
        }

        match self.messenger.list_chat_admins(chat_id).await {
            Ok(admins) => admins.contains(&user_id),
            Err(e) => {
                tracing::error!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    error = %e,
                    "failed to list chat administrators"
                );
                false
            }
        }
    }
}
