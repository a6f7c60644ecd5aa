use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::SchedulerError;

/// Work run by a [`PeriodicTask`] on its own thread. The body owns whatever
/// state it needs between ticks.
pub trait TaskBody: Send + 'static {
    /// Runs once on the task thread before the first tick. An error aborts
    /// the start.
    fn setup(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Returns `false` to stop the task.
    fn tick(&mut self) -> bool;

    /// Runs once on the task thread after the last tick.
    fn cleanup(&mut self) {}
}

/// Closure-backed body for tasks that only need a tick.
pub struct FnTask<F>(F);

impl<F> FnTask<F>
where
    F: FnMut() -> bool + Send + 'static,
{
    pub fn new(tick: F) -> Self {
        Self(tick)
    }
}

impl<F> TaskBody for FnTask<F>
where
    F: FnMut() -> bool + Send + 'static,
{
    fn tick(&mut self) -> bool {
        (self.0)()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Created,
    Running,
    Stopped,
    Destroyed,
}

#[derive(Default)]
struct Shared {
    stop: Mutex<bool>,
    wake: Condvar,
    alive: AtomicBool,
    ticks: AtomicU64,
}

impl Shared {
    fn request_stop(&self) {
        *self.stop.lock() = true;
        self.wake.notify_all();
    }

    fn stop_requested(&self) -> bool {
        *self.stop.lock()
    }

    /// Sleeps until `deadline` or a stop request, whichever comes first.
    fn wait_for_stop(&self, deadline: Instant) -> bool {
        let mut stop = self.stop.lock();
        while !*stop {
            if self.wake.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        *stop
    }
}

pub struct PeriodicTask {
    name: String,
    interval: Duration,
    body: Option<Box<dyn TaskBody>>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    state: TaskState,
}

impl PeriodicTask {
    pub fn new(
        interval: Duration,
        body: impl TaskBody,
    ) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::CreationFailure(
                "tick interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            name: String::from("task"),
            interval,
            body: Some(Box::new(body)),
            shared: Arc::new(Shared::default()),
            thread: None,
            state: TaskState::Created,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// A running task whose thread has finished on its own reports
    /// `Stopped`.
    pub fn state(&self) -> TaskState {
        if self.state == TaskState::Running
            && !self.shared.alive.load(Ordering::SeqCst)
        {
            return TaskState::Stopped;
        }
        self.state
    }

    /// Spawns the task thread and blocks until `setup` has run there.
    pub fn start(&mut self, name: &str) -> Result<(), SchedulerError> {
        let start_failure = |reason: String| SchedulerError::StartFailure {
            name: name.to_string(),
            reason,
        };

        if self.state != TaskState::Created {
            return Err(start_failure(format!(
                "task is {:?}, not Created",
                self.state
            )));
        }
        let Some(body) = self.body.take() else {
            return Err(start_failure("task has no body".to_string()));
        };

        self.name = name.to_string();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let shared = self.shared.clone();
        let interval = self.interval;
        let thread_name = self.name.clone();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                run_task(&thread_name, body, interval, &shared, ready_tx)
            })
            .map_err(|err| {
                self.state = TaskState::Stopped;
                start_failure(err.to_string())
            })?;

        let setup = ready_rx.recv().unwrap_or_else(|_| {
            Err("task thread exited during setup".to_string())
        });

        if let Err(reason) = setup {
            if handle.join().is_err() {
                warn!("task '{}' thread panicked during setup", name);
            }
            self.state = TaskState::Stopped;
            error!("task '{}' failed to start: {}", name, reason);
            return Err(start_failure(reason));
        }

        self.thread = Some(handle);
        self.state = TaskState::Running;
        info!(
            "task '{}' started ({}ms interval)",
            name,
            self.interval.as_millis()
        );
        Ok(())
    }

    /// Requests a stop and joins the thread. Calling this after the task
    /// stopped itself, or more than once, is fine.
    pub fn stop(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            TaskState::Created => {
                self.body = None;
                self.state = TaskState::Stopped;
                Ok(())
            }
            TaskState::Stopped | TaskState::Destroyed => Ok(()),
            TaskState::Running => {
                self.shared.request_stop();
                self.state = TaskState::Stopped;

                let Some(handle) = self.thread.take() else {
                    return Ok(());
                };
                handle.join().map_err(|payload| {
                    SchedulerError::StopFailure {
                        name: self.name.clone(),
                        reason: panic_message(payload.as_ref()),
                    }
                })?;

                info!("task '{}' stopped", self.name);
                Ok(())
            }
        }
    }

    /// Releases the task. Only valid once it no longer runs.
    pub fn destroy(&mut self) -> Result<(), SchedulerError> {
        match self.state() {
            TaskState::Running => {
                Err(SchedulerError::NotStopped(self.name.clone()))
            }
            TaskState::Destroyed => Ok(()),
            TaskState::Created | TaskState::Stopped => {
                // Self-stopped tasks still have a finished thread to reap.
                if let Some(handle) = self.thread.take() {
                    let _ = handle.join();
                }
                self.body = None;
                self.state = TaskState::Destroyed;
                debug!("task '{}' destroyed", self.name);
                Ok(())
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(err) = self.stop() {
                warn!("{}", err);
            }
        }
    }
}

fn run_task(
    name: &str,
    mut body: Box<dyn TaskBody>,
    interval: Duration,
    shared: &Shared,
    ready: mpsc::SyncSender<Result<(), String>>,
) {
    let setup = panic::catch_unwind(AssertUnwindSafe(|| body.setup()))
        .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));

    if let Err(reason) = setup {
        let _ = ready.send(Err(reason));
        return;
    }

    shared.alive.store(true, Ordering::SeqCst);
    let _ = ready.send(Ok(()));

    while !shared.stop_requested() {
        let started = Instant::now();

        match panic::catch_unwind(AssertUnwindSafe(|| body.tick())) {
            Ok(true) => {}
            Ok(false) => {
                info!("task '{}' stopped itself", name);
                break;
            }
            Err(payload) => {
                error!(
                    "task '{}' panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                );
                break;
            }
        }

        shared.ticks.fetch_add(1, Ordering::SeqCst);

        let deadline = started + interval;
        if shared.wait_for_stop(deadline) {
            break;
        }
    }

    if panic::catch_unwind(AssertUnwindSafe(|| body.cleanup())).is_err() {
        error!("task '{}' panicked during cleanup", name);
    }

    shared.alive.store(false, Ordering::SeqCst);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}

/// Owner of every running task. Dropping it stops whatever is left.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &mut self,
        name: &str,
        mut task: PeriodicTask,
    ) -> Result<(), SchedulerError> {
        task.start(name)?;
        self.tasks.push(task);
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.tasks
            .iter()
            .find(|task| task.name() == name)
            .map(PeriodicTask::state)
    }

    pub fn ticks(&self, name: &str) -> Option<u64> {
        self.tasks
            .iter()
            .find(|task| task.name() == name)
            .map(PeriodicTask::ticks)
    }

    pub fn running(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|task| task.state() == TaskState::Running)
            .map(PeriodicTask::name)
            .collect()
    }

    /// Stops every task, even after a failure. Reports the first error.
    pub fn stop_all(&mut self) -> Result<(), SchedulerError> {
        let mut first_error = None;

        for task in &mut self.tasks {
            if let Err(err) = task.stop() {
                error!("{}", err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
