use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};

use crate::models::ActivityKind;

/// How long a preempting Posting request waits for the Commenting workflow
/// to notice the stop signal and release, before acquiring regardless.
pub const POSTING_GRACE: Duration = Duration::from_secs(3);
const GRACE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub enum CoordinatorCommand {
    Request {
        kind: ActivityKind,
        reply: oneshot::Sender<bool>,
    },
    /// Grace window expired: take the lock for Posting no matter what.
    Force {
        reply: oneshot::Sender<()>,
    },
    Release {
        kind: ActivityKind,
    },
    StopRequested {
        reply: oneshot::Sender<bool>,
    },
    Current {
        reply: oneshot::Sender<ActivityKind>,
    },
}

/// Owns the process-wide busy state: which activity currently holds the one
/// browser tab, and whether a Posting request is waiting on it. All reads
/// and writes go through the command channel; the workflows never touch the
/// flags directly.
pub struct CoordinatorActor {
    current: ActivityKind,
    posting_pending: bool,
    rx: mpsc::Receiver<CoordinatorCommand>,
}

impl CoordinatorActor {
    pub fn new(rx: mpsc::Receiver<CoordinatorCommand>) -> Self {
        Self {
            current: ActivityKind::Idle,
            posting_pending: false,
            rx,
        }
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                CoordinatorCommand::Request { kind, reply } => {
                    let _ = reply.send(self.handle_request(kind));
                }
                CoordinatorCommand::Force { reply } => {
                    if self.current != ActivityKind::Idle {
                        warn!(
                            "posting grace expired while {} still held the page, taking over",
                            self.current
                        );
                    }
                    self.current = ActivityKind::Posting;
                    self.posting_pending = false;
                    let _ = reply.send(());
                }
                CoordinatorCommand::Release { kind } => {
                    // A preempted Commenting workflow may release after
                    // Posting already took over; that release is a no-op.
                    if self.current == kind {
                        self.current = ActivityKind::Idle;
                    }
                }
                CoordinatorCommand::StopRequested { reply } => {
                    let _ = reply.send(
                        self.posting_pending || self.current == ActivityKind::Posting,
                    );
                }
                CoordinatorCommand::Current { reply } => {
                    let _ = reply.send(self.current);
                }
            }
        }
    }

    fn handle_request(&mut self, kind: ActivityKind) -> bool {
        match kind {
            ActivityKind::Posting => {
                if self.current == ActivityKind::Idle {
                    self.current = ActivityKind::Posting;
                    self.posting_pending = false;
                    true
                } else {
                    // Signal the holder; the client keeps polling during the
                    // grace window.
                    self.posting_pending = true;
                    false
                }
            }
            ActivityKind::Commenting => {
                // Low priority never queues: if the page is busy or a post
                // is about to go out, the caller skips this cycle.
                if self.current == ActivityKind::Idle && !self.posting_pending {
                    self.current = ActivityKind::Commenting;
                    true
                } else {
                    false
                }
            }
            // Liking is never separately lockable; it runs only inside a
            // granted Commenting window. Idle is not a requestable activity.
            ActivityKind::Liking | ActivityKind::Idle => false,
        }
    }
}

/// Scoped hold on the busy state. Dropping the guard releases the lock on
/// every exit path, including `?` and panic unwind.
pub struct ActivityGuard {
    kind: ActivityKind,
    tx: mpsc::Sender<CoordinatorCommand>,
}

impl ActivityGuard {
    pub fn kind(&self) -> ActivityKind {
        self.kind
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let _ = self.tx.try_send(CoordinatorCommand::Release { kind: self.kind });
    }
}

#[derive(Clone)]
pub struct CoordinatorClient {
    tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorClient {
    pub fn new(tx: mpsc::Sender<CoordinatorCommand>) -> Self {
        Self { tx }
    }

    /// Spawns the actor and returns its client.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(CoordinatorActor::new(rx).run());
        Self::new(tx)
    }

    /// Single non-blocking attempt, used by the feed walk. None means the
    /// page is busy and this cycle is skipped.
    pub async fn try_acquire(&self, kind: ActivityKind) -> Option<ActivityGuard> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(CoordinatorCommand::Request { kind, reply: reply_tx })
            .await;
        match reply_rx.await {
            Ok(true) => Some(ActivityGuard {
                kind,
                tx: self.tx.clone(),
            }),
            _ => None,
        }
    }

    /// Preempting acquisition for Posting: request, wait out the grace
    /// window polling for the Commenting workflow to back off, then take
    /// the lock regardless. Best effort by design; the handoff is not
    /// atomic.
    pub async fn acquire_posting(&self) -> ActivityGuard {
        let deadline = Instant::now() + POSTING_GRACE;
        loop {
            let (reply_tx, reply_rx) = oneshot::channel();
            let _ = self
                .tx
                .send(CoordinatorCommand::Request {
                    kind: ActivityKind::Posting,
                    reply: reply_tx,
                })
                .await;
            if let Ok(true) = reply_rx.await {
                return ActivityGuard {
                    kind: ActivityKind::Posting,
                    tx: self.tx.clone(),
                };
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(GRACE_POLL).await;
        }

        info!("posting grace window elapsed, forcing acquisition");
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(CoordinatorCommand::Force { reply: reply_tx })
            .await;
        let _ = reply_rx.await;
        ActivityGuard {
            kind: ActivityKind::Posting,
            tx: self.tx.clone(),
        }
    }

    /// Check-point poll for the Commenting workflow: true once a Posting
    /// request is pending or active, meaning the walk must unwind now.
    pub async fn stop_requested(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(CoordinatorCommand::StopRequested { reply: reply_tx })
            .await;
        reply_rx.await.unwrap_or(true)
    }

    pub async fn current(&self) -> ActivityKind {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(CoordinatorCommand::Current { reply: reply_tx })
            .await;
        reply_rx.await.unwrap_or(ActivityKind::Idle)
    }

    pub async fn is_processing(&self) -> bool {
        self.current().await != ActivityKind::Idle
    }
}
