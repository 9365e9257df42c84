//! Fixed-cadence poll of the directory and the active chat.
//!
//! One timer task at a time, held in the session context's timer slot. Each
//! tick runs as its own task so a slow tick never delays the next one;
//! aborting the timer drops its `JoinSet` and with it every running tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::directory::ChatDirectory;
use crate::messages::MessageStream;
use crate::state::SessionContext;

pub struct PollScheduler {
    ctx: Arc<SessionContext>,
    directory: Arc<ChatDirectory>,
    messages: Arc<MessageStream>,
    interval: Duration,
}

impl PollScheduler {
    pub fn new(
        ctx: Arc<SessionContext>,
        directory: Arc<ChatDirectory>,
        messages: Arc<MessageStream>,
        interval: Duration,
    ) -> Self {
        Self {
            ctx,
            directory,
            messages,
            interval,
        }
    }

    /// Start polling, replacing any timer already running. The first tick
    /// fires immediately.
    pub fn arm(&self) {
        self.disarm();

        let directory = self.directory.clone();
        let messages = self.messages.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = JoinSet::new();

            loop {
                ticker.tick().await;

                while let Some(finished) = ticks.try_join_next() {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Poll tick panicked");
                        }
                    }
                }

                let directory = directory.clone();
                let messages = messages.clone();
                ticks.spawn(async move { poll_once(&directory, &messages).await });
            }
        });

        self.ctx.install_poll_timer(handle);
        tracing::info!(interval_ms = period.as_millis() as u64, "Poll scheduler armed");
    }

    pub fn disarm(&self) -> bool {
        self.ctx.disarm_poll_timer()
    }

    pub fn is_armed(&self) -> bool {
        self.ctx.poll_timer_armed()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// One poll: refresh the directory, then reload the active chat if any.
pub async fn poll_once(directory: &ChatDirectory, messages: &MessageStream) {
    if let Err(e) = directory.refresh().await {
        tracing::warn!(error = %e, "Poll: chat refresh failed");
    }
    if let Some(Err(e)) = messages.reload_active().await {
        tracing::warn!(error = %e, "Poll: message reload failed");
    }
}
