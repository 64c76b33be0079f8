//! Collapses bursts of notifications into single passes.
//!
//! The first notification for a key schedules a pass after the cooldown;
//! notifications during the cooldown are absorbed. A notification that
//! arrives while the pass runs schedules one follow-up pass.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// A new pass was scheduled.
    Scheduled,
    /// A pass is already waiting out its cooldown.
    Absorbed,
    /// A pass is running; another one will follow it.
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    Running { rerun: bool },
}

/// Removes the slot of a pass that never reached `finish`, so a pass that
/// panics or is cancelled leaves its key free for the next notification.
struct RunningSlot<'a, K: Eq + Hash> {
    slots: &'a Mutex<HashMap<K, Slot>>,
    key: &'a K,
    armed: bool,
}

impl<K: Eq + Hash> Drop for RunningSlot<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            self.slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.key);
        }
    }
}

#[derive(Debug)]
pub struct Debouncer<K> {
    cooldown: Duration,
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(cooldown: Duration) -> Self {
        Debouncer {
            cooldown,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Request a pass for `key`. `run` is called once per pass.
    pub fn trigger<F, Fut>(self: &Arc<Self>, key: K, run: F) -> Trigger
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get_mut(&key) {
            Some(Slot::Waiting) => return Trigger::Absorbed,
            Some(Slot::Running { rerun }) => {
                *rerun = true;
                return Trigger::FollowUp;
            }
            None => {
                slots.insert(key.clone(), Slot::Waiting);
            }
        }
        drop(slots);

        let debouncer = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(debouncer.cooldown).await;
                debouncer.start(&key);
                tracing::debug!(key = ?key, "debounced pass starting");
                let mut guard = RunningSlot {
                    slots: &debouncer.slots,
                    key: &key,
                    armed: true,
                };
                run().await;
                guard.armed = false;
                if !debouncer.finish(&key) {
                    break;
                }
                tracing::debug!(key = ?key, "notification arrived during pass, running again");
            }
        });
        Trigger::Scheduled
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn start(&self, key: &K) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Slot::Running { rerun: false });
    }

    /// End a pass. Returns whether a follow-up is due, in which case the
    /// slot goes back to waiting.
    fn finish(&self, key: &K) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Slot::Running { rerun: true }) = slots.get(key) {
            slots.insert(key.clone(), Slot::Waiting);
            true
        } else {
            slots.remove(key);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pass(
        counter: Arc<AtomicUsize>,
        work: Duration,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static
    {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                tokio::time::sleep(work).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_pass() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_secs(5)));
        let runs = Arc::new(AtomicUsize::new(0));

        assert_eq!(
            debouncer.trigger("a", counting_pass(runs.clone(), Duration::ZERO)),
            Trigger::Scheduled
        );
        for _ in 0..10 {
            assert_eq!(
                debouncer.trigger("a", counting_pass(runs.clone(), Duration::ZERO)),
                Trigger::Absorbed
            );
        }

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_secs(5)));
        let runs = Arc::new(AtomicUsize::new(0));

        debouncer.trigger("a", counting_pass(runs.clone(), Duration::ZERO));
        assert_eq!(
            debouncer.trigger("b", counting_pass(runs.clone(), Duration::ZERO)),
            Trigger::Scheduled
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_pass_frees_its_key() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));
        let flaky = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first pass fails");
                    }
                }
            }
        };

        assert_eq!(debouncer.trigger("a", flaky.clone()), Trigger::Scheduled);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending(&"a"));

        assert_eq!(debouncer.trigger("a", flaky), Trigger::Scheduled);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!debouncer.is_pending(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_during_pass_schedules_follow_up() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_secs(5)));
        let runs = Arc::new(AtomicUsize::new(0));
        let pass = || counting_pass(runs.clone(), Duration::from_secs(10));

        debouncer.trigger("a", pass());
        // Cooldown over, pass running until t=15s.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(debouncer.trigger("a", pass()), Trigger::FollowUp);
        assert_eq!(debouncer.trigger("a", pass()), Trigger::FollowUp);

        // First pass ends at 15s, follow-up waits 5s and runs 10s.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!debouncer.is_pending(&"a"));
    }
}
