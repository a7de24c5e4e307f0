//! Interval-driven sync scheduling
//!
//! One [`Schedule`] owns the authoritative next-run instant. The countdown is
//! sampled from it on the scheduler's one-second tick; nothing else keeps
//! time.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::events::{EventBus, SyncEvent};

/// Receives the time left until the next scheduled run.
pub type CountdownCallback = Arc<dyn Fn(Duration) + Send + Sync>;

/// Shared next-run state, readable without the scheduler task.
#[derive(Default)]
pub struct Schedule {
    next_run: Mutex<Option<Instant>>,
    callback: Mutex<Option<CountdownCallback>>,
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("next_run", &self.next_run())
            .finish_non_exhaustive()
    }
}

impl Schedule {
    pub fn next_run(&self) -> Option<Instant> {
        *self.next_run.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Time left until the next run, `None` when nothing is scheduled.
    pub fn countdown(&self) -> Option<Duration> {
        self.next_run()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn schedule_in(&self, delay: Duration) {
        *self.next_run.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now() + delay);
    }

    pub fn clear(&self) {
        *self.next_run.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn set_callback(&self, callback: Option<CountdownCallback>) {
        *self.callback.lock().unwrap_or_else(|p| p.into_inner()) = callback;
    }

    fn notify(&self, remaining: Duration) {
        let callback = self.callback.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(cb) = callback {
            cb(remaining);
        }
    }
}

/// The running interval task. Dropping it stops the task.
#[derive(Debug)]
pub struct Scheduler {
    schedule: Arc<Schedule>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn on the current tokio runtime. `run` is awaited each time the
    /// countdown reaches zero; the next run is scheduled once it returns,
    /// whatever the outcome.
    pub fn start<F, Fut>(schedule: Arc<Schedule>, events: EventBus, interval: Duration, run: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        schedule.schedule_in(interval);
        let task_schedule = Arc::clone(&schedule);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(remaining) = task_schedule.countdown() else {
                    continue;
                };
                if remaining.is_zero() {
                    debug!("Scheduled sync due");
                    run().await;
                    task_schedule.schedule_in(interval);
                    continue;
                }
                task_schedule.notify(remaining);
                events.emit(SyncEvent::Countdown(remaining));
            }
        });
        Self { schedule, handle }
    }

    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    pub fn stop(self) {
        self.handle.abort();
        self.schedule.clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
