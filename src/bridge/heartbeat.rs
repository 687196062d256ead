//! Periodic liveness announcements.

use std::time::Duration;

use tokio::{select, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{message::Message, processor::Observers, router::Router};

/// Handle to a running emitter.
pub(super) struct Heartbeat {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub(super) fn spawn(interval: Duration, observers: Observers, router: Router) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(interval, observers, router, shutdown.clone()));
        Self { shutdown, handle }
    }

    pub(super) fn cancel(&self) { self.shutdown.cancel(); }

    pub(super) async fn join(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "heartbeat task failed");
        }
    }
}

/// After every `interval`, show the observers a liveness announcement and
/// broadcast it to every route. In-flight sends are abandoned on shutdown.
async fn run(interval: Duration, observers: Observers, router: Router, shutdown: CancellationToken) {
    loop {
        select! {
            biased;
            () = shutdown.cancelled() => break,
            () = sleep(interval) => {}
        }
        let alive = Message::service_alive();
        observers.observe(&shutdown, &alive);
        if let Err(e) = router.dispatch(&shutdown, &alive).await {
            debug!(error = %e, "liveness broadcast failed");
        }
    }
}
