//! Single-flight coordination of access-token refreshes.
//!
//! Any number of requests may discover an expired token at once. The first
//! caller into [`RefreshCoordinator::run`] becomes the leader and performs the
//! refresh; later callers queue and receive the leader's outcome once it
//! settles. Checking for an in-flight refresh and claiming leadership happen
//! under one lock with no await in between.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,
    #[error("refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh response was malformed: {0}")]
    Malformed(String),
    #[error("refreshed tokens could not be stored: {0}")]
    Store(String),
    #[error("refresh was abandoned before it completed")]
    Cancelled,
}

/// Outcome shared with every waiter: the new access token or the refresh error.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshQueue {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

#[derive(Default)]
pub struct RefreshCoordinator {
    queue: Mutex<RefreshQueue>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_refreshing(&self) -> bool {
        self.queue.lock().in_flight
    }

    /// Number of callers parked behind the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.queue.lock().waiters.len()
    }

    /// Runs `refresh` unless one is already in flight, in which case this call
    /// waits for that refresh and returns its outcome instead.
    pub async fn run<F, Fut>(&self, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        let waiter = {
            let mut queue = self.queue.lock();
            if queue.in_flight {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back(tx);
                Some(rx)
            } else {
                queue.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("token refresh already in flight, queuing");
            return rx.await.unwrap_or(Err(RefreshError::Cancelled));
        }

        let mut leader = Leader {
            coordinator: self,
            settled: false,
        };
        let outcome = refresh().await;
        leader.settle(&outcome);
        outcome
    }

    fn settle(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut queue = self.queue.lock();
            queue.in_flight = false;
            std::mem::take(&mut queue.waiters)
        };
        debug!(
            waiters = waiters.len(),
            succeeded = outcome.is_ok(),
            "token refresh settled"
        );
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Releases the queue if the leader's future is dropped before the refresh settles.
struct Leader<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Leader<'_> {
    fn settle(&mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(&Err(RefreshError::Cancelled));
        }
    }
}
