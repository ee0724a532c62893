//! Shuts the relay down after it didn't handle any request for a while.
//!
//! Meant for socket activated deployments: systemd starts the relay on the
//! first incoming connection and the relay exits again once it became idle.
//! Every handled request pushes the deadline back by the full idle duration.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{self, Instant},
};

/// deadline used if the idle duration doesn't fit into an [Instant]
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Cloneable handle used by request handlers to report activity
#[derive(Debug, Clone)]
pub struct ActivityNotifier {
    tx: mpsc::Sender<()>,
}

impl ActivityNotifier {
    /// Rearms the idle timer. Never blocks; if a signal is already pending
    /// the scheduler will rearm anyway.
    pub fn notify_activity(&self) {
        let _ = self.tx.try_send(());
    }

    /// Returns a guard which reports activity when dropped
    pub fn guard(&self) -> ActivityGuard<'_> {
        ActivityGuard(self)
    }
}

/// Reports activity on drop, regardless of how the request handler returned
#[derive(Debug)]
pub struct ActivityGuard<'a>(&'a ActivityNotifier);

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.0.notify_activity();
    }
}

/// Owner of the idle deadline
#[derive(Debug)]
pub struct IdleScheduler {
    idle: Duration,
    rx: mpsc::Receiver<()>,
}

impl IdleScheduler {
    /// Constructs the scheduler together with the handle used to rearm it.
    /// The deadline starts running when [IdleScheduler::expired] is polled.
    pub fn new(idle: Duration) -> (Self, ActivityNotifier) {
        let (tx, rx) = mpsc::channel(1);

        (Self { idle, rx }, ActivityNotifier { tx })
    }

    /// Resolves once no activity was reported for the idle duration
    pub async fn expired(mut self) {
        let deadline = time::sleep(self.idle);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                Some(()) = self.rx.recv() => {
                    tracing::debug!("will exit after {:?}", self.idle);
                    deadline.as_mut().reset(self.next_deadline());
                }
                () = &mut deadline => {
                    tracing::info!("no requests for {:?}, shutting down", self.idle);
                    return;
                }
            }
        }
    }

    fn next_deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.idle).unwrap_or(now + FAR_FUTURE)
    }

    #[cfg(test)]
    pub(crate) fn has_pending_activity(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
