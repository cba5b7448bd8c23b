//! Recording messenger used by unit tests.

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::ChatPermissions},
    Result,
};

#[derive(Default)]
pub(crate) struct FakeMessenger {
    pub next_id: AtomicI32,
    pub sends: Mutex<Vec<(ChatId, String)>>,
    pub deletes: Mutex<Vec<MessageRef>>,
    pub permissions: Mutex<Vec<(ChatId, ChatPermissions)>>,
    pub admins: Mutex<Vec<(ChatId, UserId)>>,
    pub fail_admin_lookup: bool,
    pub fail_permissions_for: Mutex<Vec<ChatId>>,
    pub fail_delete: bool,
    pub fail_send: bool,
}

impl FakeMessenger {
    pub fn with_admin(chat_id: ChatId, user_id: UserId) -> Self {
        let fake = Self::default();
        fake.admins.lock().unwrap().push((chat_id, user_id));
        fake
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn permission_calls(&self) -> Vec<(ChatId, ChatPermissions)> {
        self.permissions.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        if self.fail_send {
            return Err(Error::Transport("send failed".to_string()));
        }
        self.sends.lock().unwrap().push((chat_id, text.to_string()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(id),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        if self.fail_delete {
            return Err(Error::Transport("delete failed".to_string()));
        }
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn set_chat_permissions(&self, chat_id: ChatId, perms: ChatPermissions) -> Result<()> {
        if self.fail_permissions_for.lock().unwrap().contains(&chat_id) {
            return Err(Error::Transport("not enough rights".to_string()));
        }
        self.permissions.lock().unwrap().push((chat_id, perms));
        Ok(())
    }

    async fn list_chat_admins(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        if self.fail_admin_lookup {
            return Err(Error::Transport("chat not found".to_string()));
        }
        Ok(self
            .admins
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, u)| *u)
            .collect())
    }
}
