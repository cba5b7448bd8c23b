//! Per-message link moderation.

use std::sync::Arc;

use crate::{
    admin::AdminResolver, link_filter::LinkFilter, messaging::port::MessagingPort,
    messaging::types::TextMessage, store::PolicyStore,
};

pub const REMOVAL_NOTICE: &str = "Your message was removed because it contains links or mentions \
that are not allowed in this group. If you think this is a mistake, contact the group admins.";

/// What the dispatcher decided for one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Not a group chat, or the group has no stored policy.
    Unmoderated,
    LinksNotModerated,
    SenderIsAdmin,
    SenderWhitelisted,
    Allowed,
    Deleted,
    /// The message should have been removed but deletion failed.
    DeleteFailed,
}

#[derive(Clone)]
pub struct ModerationDispatcher {
    store: Arc<PolicyStore>,
    admins: AdminResolver,
    messenger: Arc<dyn MessagingPort>,
}

impl ModerationDispatcher {
    pub fn new(
        store: Arc<PolicyStore>,
        admins: AdminResolver,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            store,
            admins,
            messenger,
        }
    }

    /// Hook for every inbound text message.
    pub async fn on_text_message(&self, msg: &TextMessage) -> Verdict {
        if !msg.chat_kind.is_group() {
            return Verdict::Unmoderated;
        }

        let group = match self.store.get(msg.chat_id).await {
            Ok(Some(group)) => group,
            Ok(None) => return Verdict::Unmoderated,
            Err(e) => {
                tracing::error!(chat_id = msg.chat_id.0, error = %e, "failed to load group policy");
                return Verdict::Unmoderated;
            }
        };

        if !group.moderate_links {
            return Verdict::LinksNotModerated;
        }
        // Cheap local check before the admin lookup hits the transport.
        if group.is_user_whitelisted(msg.user_id) {
            return Verdict::SenderWhitelisted;
        }
        if self.admins.is_admin(msg.chat_id, msg.user_id).await {
            return Verdict::SenderIsAdmin;
        }

        let filter = LinkFilter::new(&self.store);
        if !filter.contains_disallowed_reference(&msg.text, &group).await {
            return Verdict::Allowed;
        }

        if let Err(e) = self.messenger.delete_message(msg.message_ref()).await {
            tracing::error!(
                chat_id = msg.chat_id.0,
                user_id = msg.user_id.0,
                error = %e,
                "failed to delete message with disallowed link"
            );
            return Verdict::DeleteFailed;
        }
        tracing::info!(
            chat_id = msg.chat_id.0,
            user_id = msg.user_id.0,
            "deleted message with disallowed link"
        );

        // Private chat id equals the user id.
        let private = crate::domain::ChatId(msg.user_id.0);
        if let Err(e) = self.messenger.send_text(private, REMOVAL_NOTICE).await {
            tracing::warn!(user_id = msg.user_id.0, error = %e, "failed to notify sender");
        }

        Verdict::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, ChatKind, MessageId, UserId},
        group::ModeratedGroup,
        messaging::fake::FakeMessenger,
    };

    const GLOBAL_ADMIN: UserId = UserId(1);
    const CHAT: ChatId = ChatId(-100);

    fn text(user: i64, body: &str) -> TextMessage {
        TextMessage {
            chat_id: CHAT,
            chat_kind: ChatKind::Group,
            message_id: MessageId(10),
            user_id: UserId(user),
            text: body.to_string(),
        }
    }

    async fn setup(
        group: Option<ModeratedGroup>,
        fake: FakeMessenger,
    ) -> (ModerationDispatcher, Arc<FakeMessenger>) {
        let store = Arc::new(PolicyStore::in_memory());
        if let Some(g) = group {
            store.put(&g).await.unwrap();
        }
        let fake = Arc::new(fake);
        let admins = AdminResolver::new(GLOBAL_ADMIN, fake.clone());
        (ModerationDispatcher::new(store, admins, fake.clone()), fake)
    }

    #[tokio::test]
    async fn deletes_and_notifies_on_disallowed_link() {
        let (d, fake) = setup(
            Some(ModeratedGroup::with_defaults(CHAT)),
            FakeMessenger::default(),
        )
        .await;

        let verdict = d.on_text_message(&text(50, "buy at https://spam.example")).await;

        assert_eq!(verdict, Verdict::Deleted);
        assert_eq!(fake.deleted().len(), 1);
        assert_eq!(fake.sent_to(ChatId(50)), vec![REMOVAL_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn unconfigured_group_is_ignored() {
        let (d, fake) = setup(None, FakeMessenger::default()).await;
        let verdict = d.on_text_message(&text(50, "https://spam.example")).await;
        assert_eq!(verdict, Verdict::Unmoderated);
        assert!(fake.deleted().is_empty());
    }

    #[tokio::test]
    async fn disabled_link_moderation_is_ignored() {
        let mut g = ModeratedGroup::with_defaults(CHAT);
        g.moderate_links = false;
        let (d, fake) = setup(Some(g), FakeMessenger::default()).await;
        let verdict = d.on_text_message(&text(50, "https://spam.example")).await;
        assert_eq!(verdict, Verdict::LinksNotModerated);
        assert!(fake.deleted().is_empty());
    }

    #[tokio::test]
    async fn admins_are_never_moderated() {
        let (d, fake) = setup(
            Some(ModeratedGroup::with_defaults(CHAT)),
            FakeMessenger::with_admin(CHAT, UserId(7)),
        )
        .await;

        assert_eq!(
            d.on_text_message(&text(7, "https://spam.example")).await,
            Verdict::SenderIsAdmin
        );
        assert_eq!(
            d.on_text_message(&text(GLOBAL_ADMIN.0, "https://spam.example"))
                .await,
            Verdict::SenderIsAdmin
        );
        assert!(fake.deleted().is_empty());
    }

    #[tokio::test]
    async fn whitelisted_users_are_never_moderated() {
        let mut g = ModeratedGroup::with_defaults(CHAT);
        g.add_whitelisted_user(UserId(50));
        let (d, fake) = setup(Some(g), FakeMessenger::default()).await;
        assert_eq!(
            d.on_text_message(&text(50, "https://spam.example @spam")).await,
            Verdict::SenderWhitelisted
        );
        assert!(fake.deleted().is_empty());
    }

    #[tokio::test]
    async fn private_chats_are_not_moderated() {
        let (d, _fake) = setup(
            Some(ModeratedGroup::with_defaults(CHAT)),
            FakeMessenger::default(),
        )
        .await;
        let mut msg = text(50, "https://spam.example");
        msg.chat_kind = ChatKind::Private;
        assert_eq!(d.on_text_message(&msg).await, Verdict::Unmoderated);
    }

    #[tokio::test]
    async fn delete_failure_skips_notification() {
        let (d, fake) = setup(
            Some(ModeratedGroup::with_defaults(CHAT)),
            FakeMessenger {
                fail_delete: true,
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            d.on_text_message(&text(50, "https://spam.example")).await,
            Verdict::DeleteFailed
        );
        assert!(fake.sent_to(ChatId(50)).is_empty());
    }

    #[tokio::test]
    async fn notification_failure_is_best_effort() {
        let (d, fake) = setup(
            Some(ModeratedGroup::with_defaults(CHAT)),
            FakeMessenger {
                fail_send: true,
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            d.on_text_message(&text(50, "https://spam.example")).await,
            Verdict::Deleted
        );
        assert_eq!(fake.deleted().len(), 1);
    }

    #[tokio::test]
    async fn clean_text_is_allowed() {
        let (d, fake) = setup(
            Some(ModeratedGroup::with_defaults(CHAT)),
            FakeMessenger::default(),
        )
        .await;
        assert_eq!(
            d.on_text_message(&text(50, "good morning all")).await,
            Verdict::Allowed
        );
        assert!(fake.deleted().is_empty());
    }

    #[tokio::test]
    async fn store_failure_takes_no_action() {
        use crate::store::FlakyKv;

        let store = Arc::new(PolicyStore::new(
            Arc::new(FlakyKv {
                fail_get_suffix: Some("moderated_group:-100"),
                ..Default::default()
            }),
            "ns",
        ));
        let fake = Arc::new(FakeMessenger::default());
        let admins = AdminResolver::new(GLOBAL_ADMIN, fake.clone());
        let d = ModerationDispatcher::new(store, admins, fake.clone());

        assert_eq!(
            d.on_text_message(&text(50, "https://spam.example")).await,
            Verdict::Unmoderated
        );
        assert!(fake.deleted().is_empty());
        assert!(fake.sends.lock().unwrap().is_empty());
    }
}
