//! Cancellable session timers.
//!
//! Each armed timer is a spawned tokio task that sleeps and then reports a
//! `TimerFired` message over a channel. The tasks never touch session state;
//! the owner of the receiving end decides what a firing means.
//!
//! Every arm gets a fresh generation number. A message whose generation no
//! longer matches the armed handle for its key was sent by a timer that has
//! since been cancelled or re-armed, and `accept` rejects it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Buffer size for the timer message channel.
/// Only three timers exist and the countdown ticks once a second.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// The schedulable session actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    WarningStart,
    CountdownTick,
    HardLogout,
}

impl TimerKey {
    pub const ALL: [TimerKey; 3] = [
        TimerKey::WarningStart,
        TimerKey::CountdownTick,
        TimerKey::HardLogout,
    ];
}

/// Identifies one arming of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub key: TimerKey,
    pub generation: u64,
}

/// Sent by a timer task each time it elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub generation: u64,
}

struct Armed {
    generation: u64,
    repeating: bool,
    task: JoinHandle<()>,
}

pub struct TimerSet {
    tx: mpsc::Sender<TimerFired>,
    armed: HashMap<TimerKey, Armed>,
    next_generation: u64,
}

impl TimerSet {
    /// Create an empty set and the receiver its timers report to.
    pub fn new() -> (Self, mpsc::Receiver<TimerFired>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let timers = Self {
            tx,
            armed: HashMap::new(),
            next_generation: 1,
        };
        (timers, rx)
    }

    /// Arm a one-shot timer, replacing any timer already armed under `key`.
    ///
    /// A zero delay still fires from the spawned task, never synchronously.
    /// Must be called from within a tokio runtime.
    pub fn schedule_once(&mut self, key: TimerKey, delay: Duration) -> TimerHandle {
        let handle = self.next_handle(key);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx
                .send(TimerFired {
                    key: handle.key,
                    generation: handle.generation,
                })
                .await;
        });
        debug!(?key, delay_ms = delay.as_millis() as u64, "Armed one-shot timer");
        self.install(handle, false, task);
        handle
    }

    /// Arm a periodic timer; the first firing is one `interval` from now.
    pub fn schedule_repeating(&mut self, key: TimerKey, interval: Duration) -> TimerHandle {
        let handle = self.next_handle(key);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let fired = TimerFired {
                    key: handle.key,
                    generation: handle.generation,
                };
                // Receiver gone: nobody left to notify
                if tx.send(fired).await.is_err() {
                    break;
                }
            }
        });
        debug!(?key, interval_ms = interval.as_millis() as u64, "Armed repeating timer");
        self.install(handle, true, task);
        handle
    }

    /// Cancel the timer under `key`. No-op if nothing is armed.
    pub fn cancel(&mut self, key: TimerKey) {
        if let Some(armed) = self.armed.remove(&key) {
            armed.task.abort();
            debug!(?key, "Cancelled timer");
        }
    }

    /// Cancel warning-start, countdown-tick and hard-logout together
    pub fn cancel_all(&mut self) {
        for key in TimerKey::ALL {
            self.cancel(key);
        }
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    /// Armed keys in a stable order
    pub fn armed_keys(&self) -> Vec<TimerKey> {
        let mut keys: Vec<TimerKey> = self.armed.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Check a firing against the currently armed handle.
    ///
    /// Returns false for stale firings. An accepted one-shot is disarmed,
    /// since its task has finished.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        let (current, repeating) = match self.armed.get(&fired.key) {
            Some(armed) => (armed.generation == fired.generation, armed.repeating),
            None => (false, false),
        };
        if !current {
            debug!(key = ?fired.key, generation = fired.generation, "Ignoring stale timer");
            return false;
        }
        if !repeating {
            self.armed.remove(&fired.key);
        }
        true
    }

    fn next_handle(&mut self, key: TimerKey) -> TimerHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        TimerHandle { key, generation }
    }

    fn install(&mut self, handle: TimerHandle, repeating: bool, task: JoinHandle<()>) {
        let previous = self.armed.insert(
            handle.key,
            Armed {
                generation: handle.generation,
                repeating,
                task,
            },
        );
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_once_fires_after_delay() {
        let (mut timers, mut rx) = TimerSet::new();
        let handle = timers.schedule_once(TimerKey::HardLogout, Duration::from_secs(10));

        time::sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err());

        let fired = rx.recv().await.expect("timer fired");
        assert_eq!(fired.key, TimerKey::HardLogout);
        assert_eq!(fired.generation, handle.generation);
        assert!(timers.accept(fired));
        // One-shot is disarmed once accepted
        assert!(!timers.is_armed(TimerKey::HardLogout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_not_synchronous() {
        let (mut timers, mut rx) = TimerSet::new();
        timers.schedule_once(TimerKey::HardLogout, Duration::ZERO);

        assert!(rx.try_recv().is_err());
        let fired = rx.recv().await.expect("timer fired");
        assert!(timers.accept(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_fires_every_interval() {
        let (mut timers, mut rx) = TimerSet::new();
        timers.schedule_repeating(TimerKey::CountdownTick, Duration::from_secs(1));

        for _ in 0..3 {
            let fired = rx.recv().await.expect("tick");
            assert!(timers.accept(fired));
        }
        // Repeating timers stay armed
        assert!(timers.is_armed(TimerKey::CountdownTick));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_stops_firing() {
        let (mut timers, mut rx) = TimerSet::new();
        timers.cancel(TimerKey::WarningStart);

        timers.schedule_once(TimerKey::WarningStart, Duration::from_secs(1));
        timers.cancel(TimerKey::WarningStart);
        timers.cancel(TimerKey::WarningStart);
        assert!(!timers.is_armed(TimerKey::WarningStart));

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_makes_old_firing_stale() {
        let (mut timers, _rx) = TimerSet::new();
        let first = timers.schedule_once(TimerKey::HardLogout, Duration::from_secs(1));
        let second = timers.schedule_once(TimerKey::HardLogout, Duration::from_secs(60));
        assert_ne!(first.generation, second.generation);

        let stale = TimerFired {
            key: TimerKey::HardLogout,
            generation: first.generation,
        };
        assert!(!timers.accept(stale));
        assert!(timers.is_armed(TimerKey::HardLogout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_armed_timers() {
        let (mut timers, mut rx) = TimerSet::new();
        let tx = timers.tx.clone();
        timers.schedule_once(TimerKey::WarningStart, Duration::from_secs(1));
        timers.schedule_repeating(TimerKey::CountdownTick, Duration::from_secs(1));
        timers.schedule_once(TimerKey::HardLogout, Duration::from_secs(2));

        drop(timers);
        time::sleep(Duration::from_secs(10)).await;

        assert!(rx.try_recv().is_err());
        // Only the sender kept here is left; every task's clone is gone
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_disarms_everything() {
        let (mut timers, mut rx) = TimerSet::new();
        let warning = timers.schedule_once(TimerKey::WarningStart, Duration::from_secs(1));
        timers.schedule_repeating(TimerKey::CountdownTick, Duration::from_secs(1));
        timers.schedule_once(TimerKey::HardLogout, Duration::from_secs(2));
        assert_eq!(timers.armed_keys(), TimerKey::ALL.to_vec());

        timers.cancel_all();
        assert!(timers.armed_keys().is_empty());

        time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timers.accept(TimerFired {
            key: TimerKey::WarningStart,
            generation: warning.generation,
        }));
    }
}
