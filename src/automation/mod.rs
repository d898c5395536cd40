pub mod core;
pub mod state;
pub mod workflows;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::automation::core::browser::{ping, BrowserCommand};
use crate::automation::workflows::{commenting, posting, BotContext};

/// Drives the two periodic triggers: the fixed-interval posting timer and
/// the continuous feed-walk loop. Neither touches the page directly; every
/// attempt goes through the coordinator's request contract.
pub struct Orchestrator {
    ctx: BotContext,
    browser_tx: mpsc::Sender<BrowserCommand>,
}

impl Orchestrator {
    pub fn new(ctx: BotContext, browser_tx: mpsc::Sender<BrowserCommand>) -> Self {
        Self { ctx, browser_tx }
    }

    pub async fn run(self) {
        info!(
            "orchestrator up: posting every {}s, feed walk pause {}s",
            self.ctx.config.post_interval_secs, self.ctx.config.feed_walk_pause_secs
        );

        let post_loop = self.post_loop();
        let walk_loop = self.walk_loop();
        tokio::join!(post_loop, walk_loop);
    }

    async fn post_loop(&self) {
        let mut timer = interval(Duration::from_secs(self.ctx.config.post_interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the first post
        // waits out a full interval after startup.
        timer.tick().await;

        loop {
            timer.tick().await;

            if !ping(&self.browser_tx).await {
                error!("browser health check failed, skipping posting cycle");
                continue;
            }

            if self.ctx.coordinator.is_processing().await {
                info!(
                    "posting timer fired while {} holds the page, preempting",
                    self.ctx.coordinator.current().await
                );
            }

            if let Err(e) = posting::run_posting_cycle(&self.ctx).await {
                warn!("posting cycle failed: {}", e);
            }
        }
    }

    async fn walk_loop(&self) {
        loop {
            if let Err(e) = commenting::run_feed_walk_cycle(&self.ctx).await {
                warn!("feed walk cycle failed: {}", e);
            }

            let jitter_ms = {
                let mut rng = rand::rng();
                rng.random_range(0..15_000)
            };
            let pause = Duration::from_secs(self.ctx.config.feed_walk_pause_secs)
                + Duration::from_millis(jitter_ms);
            sleep(pause).await;
        }
    }
}
