//! Daily open/close schedule for moderated groups.
//!
//! One loop wakes at every wall-clock minute boundary, formats the boundary as
//! `HH:MM` and starts a tick comparing it with each group's `open_time` /
//! `close_time`.
//! A minute the process was not running for is simply missed; there is no
//! catch-up.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::ChatId,
    group::ModeratedGroup,
    messaging::{port::MessagingPort, types::ChatPermissions},
    store::PolicyStore,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Open,
    Close,
}

/// Transition due for `group` at `now_hhmm`, if any.
///
/// `open` is checked before `close`, so a group whose open and close times are
/// equal is only ever opened.
pub fn due_transition(group: &ModeratedGroup, now_hhmm: &str) -> Option<Transition> {
    if !group.moderate_scheduled {
        return None;
    }
    if group.open_time == now_hhmm {
        Some(Transition::Open)
    } else if group.close_time == now_hhmm {
        Some(Transition::Close)
    } else {
        None
    }
}

/// Wall clock the schedule is evaluated in.
#[derive(Clone, Copy, Debug)]
pub enum WallClock {
    Local,
    Fixed(FixedOffset),
}

impl WallClock {
    pub fn from_offset(offset: Option<FixedOffset>) -> Self {
        offset.map(WallClock::Fixed).unwrap_or(WallClock::Local)
    }

    pub fn format_hhmm(&self, now: DateTime<Utc>) -> String {
        match self {
            WallClock::Local => now.with_timezone(&Local).format("%H:%M").to_string(),
            WallClock::Fixed(offset) => now.with_timezone(offset).format("%H:%M").to_string(),
        }
    }
}

/// Time left until the next `:00` second.
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute =
        Duration::from_secs(now.second() as u64) + Duration::from_nanos(now.nanosecond() as u64);
    Duration::from_secs(60).saturating_sub(into_minute)
}

/// What one tick did, per chat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub opened: Vec<ChatId>,
    pub closed: Vec<ChatId>,
    pub failed: Vec<ChatId>,
}

#[derive(Clone)]
pub struct ModerationScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: Arc<PolicyStore>,
    messenger: Arc<dyn MessagingPort>,
    clock: WallClock,
    restart_backoff: Duration,
}

impl ModerationScheduler {
    pub fn new(
        store: Arc<PolicyStore>,
        messenger: Arc<dyn MessagingPort>,
        clock: WallClock,
        restart_backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                messenger,
                clock,
                restart_backoff,
            }),
        }
    }

    /// Run the loop on its own task until `cancel` fires.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    }

    /// Tick once per minute until `cancel` fires.
    ///
    /// Every boundary gets its own tick task, pinned to that boundary's
    /// `HH:MM`, so a tick that outlives its minute never costs the next one.
    /// A tick that panics is logged and the following tick is held back by the
    /// restart backoff. On cancel, ticks already running are allowed to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("moderation scheduler started");
        let mut ticks: JoinSet<TickReport> = JoinSet::new();
        let mut resume_at: Option<Instant> = None;

        loop {
            let now = Utc::now();
            let wait = until_next_minute(now);
            let boundary = now + chrono::Duration::nanoseconds(wait.as_nanos() as i64);
            tokio::select! {
              _ = cancel.cancelled() => break,
              Some(finished) = ticks.join_next() => {
                  self.on_tick_finished(finished, &mut resume_at);
                  continue;
              }
              _ = sleep(wait) => {}
            }

            if let Some(at) = resume_at.take() {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = sleep_until(at) => {}
                }
            }

            let now_hhmm = self.inner.clock.format_hhmm(boundary);
            let scheduler = self.clone();
            ticks.spawn(async move { scheduler.run_tick_at(&now_hhmm).await });
        }

        while let Some(finished) = ticks.join_next().await {
            self.on_tick_finished(finished, &mut resume_at);
        }
        tracing::info!("moderation scheduler stopped");
    }

    fn on_tick_finished(
        &self,
        finished: std::result::Result<TickReport, JoinError>,
        resume_at: &mut Option<Instant>,
    ) {
        match finished {
            Ok(report) => {
                if report != TickReport::default() {
                    tracing::info!(
                        opened = report.opened.len(),
                        closed = report.closed.len(),
                        failed = report.failed.len(),
                        "scheduler tick finished"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    backoff_secs = self.inner.restart_backoff.as_secs(),
                    "scheduler tick crashed, restarting"
                );
                *resume_at = Some(Instant::now() + self.inner.restart_backoff);
            }
        }
    }

    /// Evaluate the schedule against the current wall-clock minute.
    pub async fn tick(&self) -> TickReport {
        let now = self.inner.clock.format_hhmm(Utc::now());
        self.run_tick_at(&now).await
    }

    /// Evaluate the schedule as if the wall clock read `now_hhmm`.
    ///
    /// Groups are processed one by one; a failing group is recorded and the
    /// rest of the tick continues.
    pub async fn run_tick_at(&self, now_hhmm: &str) -> TickReport {
        let mut report = TickReport::default();

        let groups = match self.inner.store.list_all().await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!(error = %e, "failed to list moderated groups");
                return report;
            }
        };

        for group in groups {
            let Some(transition) = due_transition(&group, now_hhmm) else {
                continue;
            };

            let chat_id = group.id();
            match self.apply(&group, transition).await {
                Ok(()) => match transition {
                    Transition::Open => report.opened.push(chat_id),
                    Transition::Close => report.closed.push(chat_id),
                },
                Err(_) => report.failed.push(chat_id),
            }
        }

        report
    }

    /// Change the chat's permissions, then announce it.
    ///
    /// The announcement is only sent once the permission change succeeded.
    pub async fn apply(&self, group: &ModeratedGroup, transition: Transition) -> Result<()> {
        let chat_id = group.id();
        let (perms, message) = match transition {
            Transition::Open => (ChatPermissions::open(), &group.morning_message),
            Transition::Close => (ChatPermissions::closed(), &group.evening_message),
        };

        if let Err(e) = self.inner.messenger.set_chat_permissions(chat_id, perms).await {
            tracing::error!(
                chat_id = chat_id.0,
                ?transition,
                error = %e,
                "failed to change chat permissions"
            );
            return Err(e);
        }

        if !message.trim().is_empty() {
            if let Err(e) = self.inner.messenger.send_text(chat_id, message).await {
                tracing::warn!(
                    chat_id = chat_id.0,
                    ?transition,
                    error = %e,
                    "failed to send schedule announcement"
                );
            }
        }

        tracing::info!(chat_id = chat_id.0, ?transition, "chat schedule applied");
        Ok(())
    }
}
