//! Admin commands that create and mutate a group's moderation policy.

use std::sync::Arc;

use crate::{
    admin::AdminResolver,
    domain::{ChatId, UserId},
    errors::Error,
    group::{is_valid_time, normalize_time, ModeratedGroup},
    messaging::types::Command,
    store::PolicyStore,
    Result,
};

pub const HELP_TEXT: &str = "Moderation commands:\n\
/moderate - enable moderation in this group (resets settings to defaults)\n\
/open HH:MM - time the chat opens\n\
/close HH:MM - time the chat closes\n\
/evening_message text - message sent when the chat closes\n\
/morning_message text - message sent when the chat opens\n\
/links on|off - toggle link moderation\n\
/schedule on|off - toggle the open/close schedule\n\
/allow_link text - allow links containing text in this group\n\
/allow_user id - exempt a user from link moderation\n\
/settings - show the current settings\n\
/whitelist text - add to the global whitelist (global admin, private chat)";

/// Split `/cmd@botname arg1 ...` into a lowercase command name and the raw argument string.
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModerationCommand {
    Moderate,
    SetOpenTime(String),
    SetCloseTime(String),
    AddGlobalWhitelist(String),
    SetEveningMessage(String),
    SetMorningMessage(String),
    Settings,
    Links(String),
    Schedule(String),
    AllowLink(String),
    AllowUser(String),
    Help,
}

impl ModerationCommand {
    /// `None` for commands this module does not own.
    pub fn from_parts(name: &str, args: &str) -> Option<Self> {
        let args = args.trim().to_string();
        let cmd = match name {
            "moderate" => Self::Moderate,
            "open" => Self::SetOpenTime(args),
            "close" => Self::SetCloseTime(args),
            "whitelist" => Self::AddGlobalWhitelist(args),
            "evening_message" => Self::SetEveningMessage(args),
            "morning_message" => Self::SetMorningMessage(args),
            "settings" => Self::Settings,
            "links" => Self::Links(args),
            "schedule" => Self::Schedule(args),
            "allow_link" => Self::AllowLink(args),
            "allow_user" => Self::AllowUser(args),
            "help" | "start" => Self::Help,
            _ => return None,
        };
        Some(cmd)
    }
}

#[derive(Clone)]
pub struct CommandHandlers {
    store: Arc<PolicyStore>,
    admins: AdminResolver,
}

impl CommandHandlers {
    pub fn new(store: Arc<PolicyStore>, admins: AdminResolver) -> Self {
        Self { store, admins }
    }

    /// Run `cmd` and render the reply, success or failure.
    ///
    /// Returns `None` for commands that are not moderation commands.
    pub async fn handle(&self, cmd: &Command) -> Option<String> {
        let parsed = ModerationCommand::from_parts(&cmd.name, &cmd.args)?;
        let reply = match self.execute(cmd, parsed).await {
            Ok(text) => text,
            Err(e) => {
                match &e {
                    Error::Store(_) | Error::Io(_) | Error::Json(_) => tracing::error!(
                        chat_id = cmd.chat_id.0,
                        user_id = cmd.user_id.0,
                        command = %cmd.name,
                        error = %e,
                        "command failed"
                    ),
                    _ => tracing::debug!(
                        chat_id = cmd.chat_id.0,
                        command = %cmd.name,
                        error = %e,
                        "command rejected"
                    ),
                }
                e.user_message()
            }
        };
        Some(reply)
    }

    pub async fn execute(&self, cmd: &Command, parsed: ModerationCommand) -> Result<String> {
        match parsed {
            ModerationCommand::Help => Ok(HELP_TEXT.to_string()),
            ModerationCommand::AddGlobalWhitelist(entry) => {
                self.add_global_whitelist(cmd, &entry).await
            }
            ModerationCommand::Moderate => {
                self.authorize_group_admin(cmd).await?;
                self.enable_moderation(cmd.chat_id).await
            }
            ModerationCommand::SetOpenTime(arg) => {
                self.authorize_group_admin(cmd).await?;
                let time = parse_time_arg(&arg, "/open 09:00")?;
                self.update(cmd.chat_id, |g| g.open_time = time.clone())
                    .await?;
                Ok(format!("The chat will open at {time}"))
            }
            ModerationCommand::SetCloseTime(arg) => {
                self.authorize_group_admin(cmd).await?;
                let time = parse_time_arg(&arg, "/close 22:00")?;
                self.update(cmd.chat_id, |g| g.close_time = time.clone())
                    .await?;
                Ok(format!("The chat will close at {time}"))
            }
            ModerationCommand::SetEveningMessage(text) => {
                self.authorize_group_admin(cmd).await?;
                let text = require_text(text, "Please provide the evening message text")?;
                self.update(cmd.chat_id, |g| g.evening_message = text).await?;
                Ok("Evening message updated".to_string())
            }
            ModerationCommand::SetMorningMessage(text) => {
                self.authorize_group_admin(cmd).await?;
                let text = require_text(text, "Please provide the morning message text")?;
                self.update(cmd.chat_id, |g| g.morning_message = text).await?;
                Ok("Morning message updated".to_string())
            }
            ModerationCommand::Links(arg) => {
                self.authorize_group_admin(cmd).await?;
                let on = parse_switch(&arg, "/links on")?;
                self.update(cmd.chat_id, |g| g.moderate_links = on).await?;
                Ok(format!("Link moderation {}", on_off(on)))
            }
            ModerationCommand::Schedule(arg) => {
                self.authorize_group_admin(cmd).await?;
                let on = parse_switch(&arg, "/schedule on")?;
                self.update(cmd.chat_id, |g| g.moderate_scheduled = on)
                    .await?;
                Ok(format!("Open/close schedule {}", on_off(on)))
            }
            ModerationCommand::AllowLink(entry) => {
                self.authorize_group_admin(cmd).await?;
                let entry = require_text(entry, "Please provide the link or text to allow")?;
                let mut added = false;
                self.update(cmd.chat_id, |g| added = g.add_whitelisted_link(&entry))
                    .await?;
                Ok(if added {
                    format!("'{entry}' added to this group's whitelist")
                } else {
                    format!("'{entry}' is already whitelisted")
                })
            }
            ModerationCommand::AllowUser(arg) => {
                self.authorize_group_admin(cmd).await?;
                let user_id = arg.parse::<i64>().map(UserId).map_err(|_| {
                    Error::Validation("Please provide a numeric user id, e.g. /allow_user 123456".to_string())
                })?;
                let mut added = false;
                self.update(cmd.chat_id, |g| added = g.add_whitelisted_user(user_id))
                    .await?;
                Ok(if added {
                    format!("User {} is now exempt from link moderation", user_id.0)
                } else {
                    format!("User {} is already exempt", user_id.0)
                })
            }
            ModerationCommand::Settings => {
                self.authorize_group_admin(cmd).await?;
                let group = self.store.require(cmd.chat_id).await?;
                Ok(render_settings(&group))
            }
        }
    }

    async fn authorize_group_admin(&self, cmd: &Command) -> Result<()> {
        if !cmd.chat_kind.is_group() {
            return Err(Error::WrongChat(
                "This command is only available in groups".to_string(),
            ));
        }
        if !self.admins.is_admin(cmd.chat_id, cmd.user_id).await {
            return Err(Error::Permission(
                "Only administrators can use this command".to_string(),
            ));
        }
        Ok(())
    }

    /// `/moderate`: (re)create the group's record with default settings.
    async fn enable_moderation(&self, chat_id: ChatId) -> Result<String> {
        let group = ModeratedGroup::with_defaults(chat_id);
        self.store.put(&group).await?;
        tracing::info!(chat_id = chat_id.0, "moderation enabled");

        Ok(format!(
            "Moderation is enabled for this group. Defaults:\n\
- the chat closes at {}\n\
- the chat opens at {}\n\
- link moderation is on\n\n\
Change them with:\n\
/close HH:MM - closing time\n\
/open HH:MM - opening time\n\
/allow_link text - allow a link in this group",
            group.close_time, group.open_time
        ))
    }

    async fn add_global_whitelist(&self, cmd: &Command, entry: &str) -> Result<String> {
        if !cmd.chat_kind.is_private() {
            return Err(Error::WrongChat(
                "This command is only available in a private chat with the bot".to_string(),
            ));
        }
        if !self.admins.is_global_admin(cmd.user_id) {
            return Err(Error::Permission(
                "This command is only available to the global administrator".to_string(),
            ));
        }
        let entry = require_text(
            entry.to_string(),
            "Please provide a word or link to add to the whitelist",
        )?;

        if self.store.add_global_whitelist_entry(&entry).await? {
            tracing::info!(entry = %entry, "global whitelist entry added");
            Ok(format!("'{entry}' added to the global whitelist"))
        } else {
            Ok(format!("'{entry}' is already in the global whitelist"))
        }
    }

    /// Read-modify-write of an existing group.
    async fn update(&self, chat_id: ChatId, mutate: impl FnOnce(&mut ModeratedGroup)) -> Result<()> {
        let mut group = self.store.require(chat_id).await?;
        mutate(&mut group);
        self.store.put(&group).await?;
        tracing::info!(chat_id = chat_id.0, "group settings updated");
        Ok(())
    }
}

fn parse_time_arg(arg: &str, example: &str) -> Result<String> {
    let mut parts = arg.split_whitespace();
    let (Some(raw), None) = (parts.next(), parts.next()) else {
        return Err(Error::Validation(format!(
            "Please specify the time as HH:MM, e.g. {example}"
        )));
    };
    if !is_valid_time(raw) {
        return Err(Error::Validation(format!(
            "Invalid time format. Use HH:MM, e.g. {}",
            example.split_whitespace().last().unwrap_or("09:00")
        )));
    }
    Ok(normalize_time(raw).unwrap_or_else(|| raw.to_string()))
}

fn parse_switch(arg: &str, example: &str) -> Result<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(Error::Validation(format!(
            "Please specify on or off, e.g. {example}"
        ))),
    }
}

fn require_text(text: String, prompt: &str) -> Result<String> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(Error::Validation(prompt.to_string()));
    }
    Ok(text)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

fn render_settings(g: &ModeratedGroup) -> String {
    let list = |items: Vec<String>| {
        if items.is_empty() {
            "(none)".to_string()
        } else {
            items.join(", ")
        }
    };
    format!(
        "Moderation settings:\n\
Opens at: {}\n\
Closes at: {}\n\
Schedule: {}\n\
Link moderation: {}\n\
Allowed links: {}\n\
Exempt users: {}\n\
Morning message: {}\n\
Evening message: {}",
        g.open_time,
        g.close_time,
        on_off(g.moderate_scheduled),
        on_off(g.moderate_links),
        list(g.whitelisted_links.clone()),
        list(g.whitelisted_users.iter().map(|u| u.to_string()).collect()),
        g.morning_message,
        g.evening_message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::ChatKind, messaging::fake::FakeMessenger};

    const GLOBAL_ADMIN: UserId = UserId(1);
    const CHAT_ADMIN: UserId = UserId(2);
    const MEMBER: UserId = UserId(3);
    const CHAT: ChatId = ChatId(-100);

    fn handlers() -> (CommandHandlers, Arc<PolicyStore>) {
        let store = Arc::new(PolicyStore::in_memory());
        let fake = Arc::new(FakeMessenger::with_admin(CHAT, CHAT_ADMIN));
        let admins = AdminResolver::new(GLOBAL_ADMIN, fake);
        (CommandHandlers::new(store.clone(), admins), store)
    }

    fn cmd(kind: ChatKind, user: UserId, text: &str) -> Command {
        let (name, args) = parse_command(text);
        let chat_id = if kind.is_private() { ChatId(user.0) } else { CHAT };
        Command {
            chat_id,
            chat_kind: kind,
            user_id: user,
            name,
            args,
        }
    }

    async fn run(h: &CommandHandlers, kind: ChatKind, user: UserId, text: &str) -> Result<String> {
        let c = cmd(kind, user, text);
        let parsed = ModerationCommand::from_parts(&c.name, &c.args).unwrap();
        h.execute(&c, parsed).await
    }

    #[test]
    fn parses_command_with_bot_suffix() {
        assert_eq!(
            parse_command("/Open@curfew_bot  9:30 "),
            ("open".to_string(), "9:30".to_string())
        );
        assert_eq!(parse_command("/moderate"), ("moderate".to_string(), String::new()));
    }

    #[test]
    fn unknown_commands_are_not_owned() {
        assert!(ModerationCommand::from_parts("ban", "").is_none());
    }

    #[tokio::test]
    async fn moderate_creates_default_record() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        assert_eq!(
            store.get(CHAT).await.unwrap(),
            Some(ModeratedGroup::with_defaults(CHAT))
        );
    }

    #[tokio::test]
    async fn moderate_again_resets_to_defaults() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/evening_message bye all")
            .await
            .unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/allow_link github.com")
            .await
            .unwrap();

        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        assert_eq!(
            store.get(CHAT).await.unwrap(),
            Some(ModeratedGroup::with_defaults(CHAT))
        );
    }

    #[tokio::test]
    async fn group_commands_require_group_chat() {
        let (h, _) = handlers();
        let err = run(&h, ChatKind::Private, CHAT_ADMIN, "/moderate")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WrongChat(_)));
    }

    #[tokio::test]
    async fn members_cannot_change_settings() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        let err = run(&h, ChatKind::Group, MEMBER, "/open 10:00")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permission(_)));
        assert_eq!(store.require(CHAT).await.unwrap().open_time, "09:00");
    }

    #[tokio::test]
    async fn global_admin_can_configure_any_group() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, GLOBAL_ADMIN, "/moderate").await.unwrap();
        run(&h, ChatKind::Group, GLOBAL_ADMIN, "/close 23:30")
            .await
            .unwrap();
        assert_eq!(store.require(CHAT).await.unwrap().close_time, "23:30");
    }

    #[tokio::test]
    async fn settings_need_moderate_first() {
        let (h, _) = handlers();
        let err = run(&h, ChatKind::Group, CHAT_ADMIN, "/open 10:00")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured));
        assert!(err.user_message().contains("/moderate"));
    }

    #[tokio::test]
    async fn open_time_is_validated_and_normalized() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();

        for bad in ["/open", "/open 24:00", "/open 9:5", "/open 12-30", "/open 10:00 11:00"] {
            let err = run(&h, ChatKind::Group, CHAT_ADMIN, bad).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{bad}");
        }
        assert_eq!(store.require(CHAT).await.unwrap().open_time, "09:00");

        run(&h, ChatKind::Group, CHAT_ADMIN, "/open 7:45").await.unwrap();
        assert_eq!(store.require(CHAT).await.unwrap().open_time, "07:45");
    }

    #[tokio::test]
    async fn setting_same_open_time_twice_is_idempotent() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/open 08:15").await.unwrap();
        let first = store.require(CHAT).await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/open 08:15").await.unwrap();
        assert_eq!(store.require(CHAT).await.unwrap(), first);
    }

    #[tokio::test]
    async fn messages_and_toggles_update_only_their_field() {
        let (h, store) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/morning_message Rise and shine")
            .await
            .unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/links off").await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/schedule off").await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/allow_user 555").await.unwrap();

        let mut expected = ModeratedGroup::with_defaults(CHAT);
        expected.morning_message = "Rise and shine".to_string();
        expected.moderate_links = false;
        expected.moderate_scheduled = false;
        expected.whitelisted_users = vec![555];
        assert_eq!(store.require(CHAT).await.unwrap(), expected);

        let err = run(&h, ChatKind::Group, CHAT_ADMIN, "/evening_message")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = run(&h, ChatKind::Group, CHAT_ADMIN, "/links maybe")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn global_whitelist_is_private_and_global_admin_only() {
        let (h, store) = handlers();

        let err = run(&h, ChatKind::Group, GLOBAL_ADMIN, "/whitelist t.me/news")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WrongChat(_)));

        let err = run(&h, ChatKind::Private, CHAT_ADMIN, "/whitelist t.me/news")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permission(_)));

        let err = run(&h, ChatKind::Private, GLOBAL_ADMIN, "/whitelist")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        run(&h, ChatKind::Private, GLOBAL_ADMIN, "/whitelist t.me/news channel")
            .await
            .unwrap();
        assert_eq!(
            store.global_whitelist().await.unwrap(),
            vec!["t.me/news channel".to_string()]
        );
    }

    #[tokio::test]
    async fn handle_renders_errors_and_ignores_foreign_commands() {
        let (h, _) = handlers();
        let reply = h
            .handle(&cmd(ChatKind::Group, MEMBER, "/moderate"))
            .await
            .unwrap();
        assert_eq!(reply, "Only administrators can use this command");
        assert!(h.handle(&cmd(ChatKind::Group, MEMBER, "/ban")).await.is_none());
    }

    #[tokio::test]
    async fn settings_lists_current_policy() {
        let (h, _) = handlers();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/moderate").await.unwrap();
        run(&h, ChatKind::Group, CHAT_ADMIN, "/allow_link github.com")
            .await
            .unwrap();
        let text = run(&h, ChatKind::Group, CHAT_ADMIN, "/settings").await.unwrap();
        assert!(text.contains("Opens at: 09:00"));
        assert!(text.contains("github.com"));
    }
}
