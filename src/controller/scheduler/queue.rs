use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::{
    constants::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX},
    controller::context::ControllerKey,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyStatus {
    /// Sent to the workers, not picked up yet.
    Queued,
    InFlight,
    /// In flight and pushed again meanwhile; runs once more after `done`.
    InFlightPending,
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl Backoff {
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);

        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[derive(Default)]
struct QueueState {
    keys: HashMap<ControllerKey, KeyStatus>,
    failures: HashMap<ControllerKey, u32>,
    shut_down: bool,
}

/// Deduplicating work queue. A key is held by at most one worker at a time.
#[derive(Clone)]
pub struct WorkQueue {
    state: Arc<Mutex<QueueState>>,
    backoff: Backoff,
    tx: Sender<ControllerKey>,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> (Self, Receiver<ControllerKey>) {
        let (tx, rx) = async_channel::unbounded();

        (
            Self {
                state: Arc::new(Mutex::new(QueueState::default())),
                backoff,
                tx,
            },
            rx,
        )
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // a panic while holding the lock leaves the map consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, key: &ControllerKey) {
        let mut state = self.state();
        if state.shut_down {
            debug!("queue is shut down, dropping key {}", key);
            return;
        }

        match state.keys.get(key).copied() {
            Some(KeyStatus::Queued) | Some(KeyStatus::InFlightPending) => {
                debug!("key {} is already pending", key);
            }
            Some(KeyStatus::InFlight) => {
                state.keys.insert(key.clone(), KeyStatus::InFlightPending);
            }
            None => {
                state.keys.insert(key.clone(), KeyStatus::Queued);
                if self.tx.try_send(key.clone()).is_err() {
                    warn!("failed to send key {} to queue", key);
                    state.keys.remove(key);
                }
            }
        }
    }

    pub fn push_after(&self, key: &ControllerKey, delay: Duration) {
        let this = self.clone();
        let key = key.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.push(&key);
        });
    }

    /// Requeue after this key's next backoff step. Returns the delay used.
    pub fn push_rate_limited(&self, key: &ControllerKey) -> Duration {
        let delay = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };

        self.push_after(key, delay);
        delay
    }

    pub fn forget(&self, key: &ControllerKey) {
        self.state().failures.remove(key);
    }

    pub fn failures(&self, key: &ControllerKey) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Called by a worker when it picks a key off the channel.
    pub fn start(&self, key: &ControllerKey) {
        self.state().keys.insert(key.clone(), KeyStatus::InFlight);
    }

    pub fn done(&self, key: &ControllerKey) {
        let mut state = self.state();

        match state.keys.remove(key) {
            Some(KeyStatus::InFlightPending) if !state.shut_down => {
                state.keys.insert(key.clone(), KeyStatus::Queued);
                if self.tx.try_send(key.clone()).is_err() {
                    warn!("failed to requeue key {}", key);
                    state.keys.remove(key);
                }
            }
            _ => {}
        }
    }

    /// Number of keys queued or in flight.
    pub fn len(&self) -> usize {
        self.state().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        self.state().shut_down = true;
        self.tx.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ControllerKey {
        ControllerKey::new("default", name)
    }

    #[test]
    fn test_push_deduplicates_queued_keys() {
        let (queue, rx) = WorkQueue::new(Backoff::default());

        queue.push(&key("svc-a"));
        queue.push(&key("svc-a"));
        queue.push(&key("svc-b"));

        assert_eq!(rx.len(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_while_in_flight_runs_once_more() {
        let (queue, rx) = WorkQueue::new(Backoff::default());
        let svc = key("svc-a");

        queue.push(&svc);
        let picked = rx.try_recv().unwrap();
        queue.start(&picked);

        queue.push(&svc);
        queue.push(&svc);
        assert!(rx.is_empty());

        queue.done(&svc);
        assert_eq!(rx.try_recv().unwrap(), svc);
        assert!(rx.is_empty());

        queue.start(&svc);
        queue.done(&svc);
        assert!(rx.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_backoff_grows_and_is_bounded() {
        let backoff = Backoff {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(5));
        assert_eq!(backoff.delay(1), Duration::from_millis(10));
        assert_eq!(backoff.delay(4), Duration::from_millis(80));
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
        assert_eq!(backoff.delay(64), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_rate_limited_requeues_after_delay() {
        let (queue, rx) = WorkQueue::new(Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
        });
        let svc = key("svc-a");

        assert_eq!(queue.push_rate_limited(&svc), Duration::from_millis(100));
        assert_eq!(queue.push_rate_limited(&svc), Duration::from_millis(200));
        assert_eq!(queue.failures(&svc), 2);

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, svc);

        queue.forget(&svc);
        assert_eq!(queue.failures(&svc), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting_work() {
        let (queue, rx) = WorkQueue::new(Backoff::default());

        queue.shutdown();
        queue.push(&key("svc-a"));

        assert!(queue.is_shut_down());
        assert!(queue.is_empty());
        assert!(rx.recv().await.is_err());
    }
}
