use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;

use curfew_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use curfew_core::{
    admin::AdminResolver,
    commands::CommandHandlers,
    config::Config,
    dispatcher::ModerationDispatcher,
    messaging::port::MessagingPort,
    scheduler::{ModerationScheduler, WallClock},
    store::PolicyStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub commands: CommandHandlers,
    pub moderation: ModerationDispatcher,
}

impl AppState {
    pub fn new(cfg: &Config, store: Arc<PolicyStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        let admins = AdminResolver::new(cfg.global_admin_id, messenger.clone());
        Self {
            commands: CommandHandlers::new(store.clone(), admins.clone()),
            moderation: ModerationDispatcher::new(store, admins, messenger),
        }
    }
}

/// Long-poll Telegram and run the schedule until `cancel` fires.
pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<PolicyStore>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "curfew started"),
        Err(e) => tracing::warn!(error = %e, "failed to fetch bot identity"),
    }

    // Throttle outbound calls so a busy scheduler tick stays under flood limits.
    // The Telegram adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let scheduler = ModerationScheduler::new(
        store.clone(),
        messenger.clone(),
        WallClock::from_offset(cfg.schedule_utc_offset),
        cfg.scheduler_restart_backoff,
    );
    let scheduler_handle = scheduler.spawn(cancel.child_token());

    let state = Arc::new(AppState::new(&cfg, store, messenger));

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let shutdown = dispatcher.shutdown_token();
    let watch = cancel.clone();
    tokio::spawn(async move {
        watch.cancelled().await;
        match shutdown.shutdown() {
            Ok(done) => done.await,
            Err(e) => tracing::warn!(error = ?e, "dispatcher was not running at shutdown"),
        }
    });

    dispatcher.dispatch().await;

    cancel.cancel();
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "scheduler task ended abnormally");
    }
    tracing::info!("curfew stopped");

    Ok(())
}
