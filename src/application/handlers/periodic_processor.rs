use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::services::{
    lifecycle::MessageLifecycle,
    observers::{ErrorObservers, PipelineError},
};

enum ProcessorState {
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopping,
}

/// Runs the bulk PENDING -> SENT flip on a fixed interval.
///
/// Transitions are Idle -> Running on `start` and Running -> Stopping on
/// `stop`. The loop task itself moves Stopping -> Idle when it exits, so the
/// processor can be restarted even if a `stop` caller gave up waiting.
/// Any other request is a no-op.
pub struct PeriodicProcessor {
    lifecycle: Arc<dyn MessageLifecycle>,
    interval: Duration,
    observers: ErrorObservers,
    state: Arc<Mutex<ProcessorState>>,
}

impl PeriodicProcessor {
    pub fn new(
        lifecycle: Arc<dyn MessageLifecycle>,
        interval: Duration,
        observers: ErrorObservers,
    ) -> Self {
        Self {
            lifecycle,
            interval,
            observers,
            state: Arc::new(Mutex::new(ProcessorState::Idle)),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), ProcessorState::Running { .. })
    }

    /// Arms the timer. Returns `false` when it is already running or stopping.
    pub fn start(&self) -> bool {
        let mut state = self.lock_state();
        if !matches!(*state, ProcessorState::Idle) {
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            self.lifecycle.clone(),
            self.interval,
            self.observers.clone(),
            cancel.clone(),
            self.state.clone(),
        ));
        *state = ProcessorState::Running { cancel, task };

        tracing::info!(interval = ?self.interval, "periodic processor started");
        true
    }

    /// Stops the timer and waits for an in-flight tick to finish.
    /// Returns `false` when there was nothing to stop.
    pub async fn stop(&self) -> bool {
        let (cancel, task) = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, ProcessorState::Stopping) {
                ProcessorState::Running { cancel, task } => (cancel, task),
                other => {
                    *state = other;
                    return false;
                }
            }
        };

        cancel.cancel();
        if let Err(err) = task.await {
            tracing::error!(error = %err, "periodic processor task ended abnormally");
        }

        tracing::info!("periodic processor stopped");
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, ProcessorState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<ProcessorState>) -> MutexGuard<'_, ProcessorState> {
    // the state is always left consistent, so a poisoned lock is still usable
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns the processor to Idle when the loop task exits or unwinds.
struct IdleOnExit(Arc<Mutex<ProcessorState>>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        *lock(&self.0) = ProcessorState::Idle;
    }
}

async fn run_loop(
    lifecycle: Arc<dyn MessageLifecycle>,
    period: Duration,
    observers: ErrorObservers,
    cancel: CancellationToken,
    state: Arc<Mutex<ProcessorState>>,
) {
    // created on first poll, since `start` still holds the lock while spawning
    let _idle_on_exit = IdleOnExit(state);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = lifecycle.process().await {
                    observers.notify(PipelineError::Processor(err));
                }
            }
        }
    }
}
