//! Event loop driving reconciliation from Docker lifecycle events.
//!
//! Any `start`, `stop` or `die` event triggers one global rescan; which
//! container fired it does not matter.  Events are handled one at a time in
//! the order the stream delivers them.
//!
//! By default a failed subscription ends the loop.  With a
//! [`ReconnectPolicy`] the loop instead waits with exponential backoff,
//! pings until the daemon answers, runs a catch-up scan and subscribes
//! again.  The delay keeps growing across reconnects and only drops back
//! to the initial value once a subscription has delivered an event.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::StreamExt;
use log::{error, info, warn};
use tokio::sync::oneshot;
use tokio::time::sleep;

use crate::error::{log_scan_failure, Error, Result};
use crate::reconciler::Reconciler;
use crate::runtime::Connection;
use crate::types::{short_id, EventFilter};

/// Backoff between reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

/// Current position in the backoff sequence.
#[derive(Debug)]
struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl Backoff {
    fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            current: policy.initial_delay,
        }
    }

    /// Delay to wait now; the following call returns a longer one.
    fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.policy.next_delay(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = self.policy.initial_delay;
    }
}

/// Why a subscription stopped delivering.
enum StreamEnd {
    Shutdown,
    /// `delivered` counts the events the subscription yielded before failing.
    Failed { error: Error, delivered: usize },
}

pub struct Watcher {
    connection: Arc<Connection>,
    reconciler: Arc<Reconciler>,
    filter: EventFilter,
    reconnect: Option<ReconnectPolicy>,
}

impl Watcher {
    /// `reconnect: None` keeps the base behaviour: one subscription, and the
    /// loop ends when it fails.
    pub fn new(reconciler: Arc<Reconciler>, reconnect: Option<ReconnectPolicy>) -> Self {
        Self {
            connection: Arc::clone(reconciler.connection()),
            reconciler,
            filter: EventFilter::default(),
            reconnect,
        }
    }

    /// Runs until `shutdown` fires (or its sender is dropped), or until the
    /// subscription fails with reconnection disabled.
    ///
    /// # Errors
    ///
    /// [`Error::Unavailable`] if Docker was unreachable at start and
    /// [`Error::Stream`] if the event stream failed, both only without a
    /// reconnect policy.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        let mut backoff = self.reconnect.map(Backoff::new);

        if !self.connection.is_connected() {
            let Some(backoff) = backoff.as_mut() else {
                warn!("Not listening for Docker events: connection failed");
                return Err(Error::Unavailable("not connected at startup".to_string()));
            };
            if !self.reconnect_loop(backoff, &mut shutdown).await {
                return Ok(());
            }
        }

        loop {
            match self.listen(&mut shutdown).await {
                StreamEnd::Shutdown => {
                    info!("Event watcher stopped");
                    return Ok(());
                }
                StreamEnd::Failed { error, delivered } => {
                    error!("Docker event loop error: {}", error);
                    let Some(backoff) = backoff.as_mut() else {
                        return Err(error);
                    };
                    if delivered > 0 {
                        backoff.reset();
                    }
                    if !self.reconnect_loop(backoff, &mut shutdown).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn listen(&self, shutdown: &mut oneshot::Receiver<()>) -> StreamEnd {
        info!(
            "Listening for Docker events ({})",
            self.filter
                .actions
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stream = self.connection.runtime().subscribe(&self.filter);
        let mut delivered = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut *shutdown => return StreamEnd::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    delivered += 1;
                    if !self.filter.matches(&event) {
                        continue;
                    }
                    info!(
                        "Event {} from container {}",
                        event.action.to_uppercase(),
                        short_id(&event.container_id)
                    );
                    if let Err(e) = self.reconciler.run().await {
                        log_scan_failure("Scan", &e);
                    }
                }
                Some(Err(error)) => return StreamEnd::Failed { error, delivered },
                None => {
                    return StreamEnd::Failed {
                        error: Error::Stream("event stream ended".to_string()),
                        delivered,
                    }
                }
            }
        }
    }

    /// Pings with backoff until Docker answers, then runs a catch-up scan.
    ///
    /// Every attempt advances `backoff`, including the successful one, so a
    /// daemon that accepts pings but drops each subscription is retried at
    /// a growing interval.  Returns `false` if shutdown was requested while
    /// waiting.
    async fn reconnect_loop(
        &self,
        backoff: &mut Backoff,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> bool {
        loop {
            let delay = backoff.next();
            warn!("Reconnecting to Docker in {:?}", delay);
            tokio::select! {
                biased;
                _ = &mut *shutdown => return false,
                _ = sleep(delay) => {}
            }

            match self.connection.runtime().ping().await {
                Ok(()) => {
                    self.connection.mark_connected();
                    if let Err(e) = self.reconciler.run().await {
                        log_scan_failure("Catch-up scan", &e);
                    }
                    return true;
                }
                Err(e) => {
                    self.connection.mark_disconnected();
                    warn!("Docker still unreachable: {}", e);
                }
            }
        }
    }
}
