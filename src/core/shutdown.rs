//! Cooperative shutdown: one cancellation token plus a drain that tracks
//! every spawned publish task.
//!
//! Sequence on SIGINT/SIGTERM:
//!
//! 1. cancel the token (the scheduler's gate wait and pacing sleep observe it)
//! 2. wait for the scheduler task to return
//! 3. wait until the drain reports zero in-flight publishes
//!
//! Only then may the broker connection be closed.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

/// Join counter for in-flight publish tasks.
#[derive(Debug, Default)]
pub struct PublishDrain {
    inflight: AtomicUsize,
    notify: Notify,
}

impl PublishDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one task. The count drops when the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> PublishGuard {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        PublishGuard {
            drain: Arc::clone(self),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Resolves once no guard is alive.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before checking the count so a guard dropped
            // in between still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps its drain's count raised while alive.
#[derive(Debug)]
pub struct PublishGuard {
    drain: Arc<PublishDrain>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        if self.drain.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drain.notify.notify_waiters();
        }
    }
}

/// Cancellation token and publish drain shared by the scheduler and `main`.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    drain: Arc<PublishDrain>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawns `task` on the runtime, counted by the drain from before the
    /// spawn until the task ends (including by panic).
    pub fn spawn_tracked<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.drain.enter();
        tokio::spawn(
            async move {
                let _guard = guard;
                task.await;
            }
            .in_current_span(),
        )
    }

    pub fn in_flight(&self) -> usize {
        self.drain.in_flight()
    }

    pub async fn wait_idle(&self) {
        self.drain.wait_idle().await;
    }

    /// Cancels, awaits `scheduler`, then drains. Returns the scheduler's output.
    pub async fn shutdown<F>(&self, scheduler: F) -> F::Output
    where
        F: Future,
    {
        info!("Shutdown requested, stopping scheduler");
        self.cancel.cancel();
        let output = scheduler.await;

        let pending = self.in_flight();
        if pending > 0 {
            info!(in_flight = pending, "Waiting for in-flight publishes");
        }
        self.drain.wait_idle().await;
        info!("All publishes completed");
        output
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM. Returns the signal name.
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
