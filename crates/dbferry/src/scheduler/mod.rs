//! Bounded worker-pool task scheduler with single-writer bookkeeping.
//!
//! Each scheduler owns a worker pool (a semaphore of `max_workers`
//! permits), a bounded completion queue of join handles, and one
//! bookkeeping poller. Workers only produce finished tasks; the poller
//! alone consumes handles and classifies results into the succeeded,
//! failed and cancelled lists, so those lists need no locking even though
//! many workers complete concurrently.
//!
//! The poller also drives retries: a failed task inside the retry budget
//! is resubmitted to the pool as the same task object with its attempt
//! counter bumped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{MigrationError, Result};
use crate::task::{Task, TaskContext, TaskStatus};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrently executing tasks.
    pub max_workers: usize,

    /// Capacity of the completion queue; `add_task` blocks when full.
    pub queue_size: usize,

    /// Per-attempt execution limit. `None` leaves task execution unbounded.
    pub task_timeout: Option<Duration>,

    /// Retry budget: a failed task is re-run while its attempt count has
    /// not exceeded this, giving `task_retry + 1` executions in total.
    pub task_retry: u32,

    /// Stop-on-first-permanent-failure policy flag. Currently advisory:
    /// the scheduler records and logs it but keeps draining the remaining
    /// tasks.
    pub quit_if_failed: bool,

    /// Bookkeeping poller tick.
    pub poll_interval: Duration,

    /// Completion polling interval used by [`Scheduler::finish`].
    pub finish_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            queue_size: 10,
            task_timeout: None,
            task_retry: 3,
            quit_if_failed: false,
            poll_interval: Duration::from_secs(1),
            finish_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Terminal task sets of one scheduler run.
#[derive(Debug, Default)]
pub struct SchedulerReport {
    pub succeeded: Vec<Task>,
    pub failed: Vec<Task>,
    pub cancelled: Vec<Task>,
}

impl SchedulerReport {
    /// True when every task completed successfully.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Fold another group's report into this one.
    pub fn merge(&mut self, other: SchedulerReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.cancelled.extend(other.cancelled);
    }
}

/// Snapshot of terminal counts, published by the poller.
#[derive(Debug, Clone, Copy, Default)]
struct TaskCounts {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl TaskCounts {
    fn terminal(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Bounded worker-pool scheduler for one partition of tasks.
pub struct Scheduler {
    config: SchedulerConfig,
    ctx: Arc<TaskContext>,
    semaphore: Arc<Semaphore>,
    handle_tx: mpsc::Sender<JoinHandle<Task>>,
    handle_rx: Option<mpsc::Receiver<JoinHandle<Task>>>,
    counts_rx: watch::Receiver<TaskCounts>,
    counts_tx: Option<watch::Sender<TaskCounts>>,
    stop_tx: watch::Sender<bool>,
    worker_stop_tx: watch::Sender<bool>,
    poller: Option<JoinHandle<Result<SchedulerReport>>>,
    tasks_num: usize,
    submitted: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Create a scheduler. No background work starts until [`run`](Self::run).
    pub fn new(config: SchedulerConfig, ctx: Arc<TaskContext>) -> Self {
        let (handle_tx, handle_rx) = mpsc::channel(config.queue_size.max(1));
        let (counts_tx, counts_rx) = watch::channel(TaskCounts::default());
        let (stop_tx, _) = watch::channel(false);
        let (worker_stop_tx, _) = watch::channel(false);

        info!("Scheduler is initialized with config: {:?}", config);

        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers.max(1))),
            config,
            ctx,
            handle_tx,
            handle_rx: Some(handle_rx),
            counts_rx,
            counts_tx: Some(counts_tx),
            stop_tx,
            worker_stop_tx,
            poller: None,
            tasks_num: 0,
            submitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the bookkeeping poller, expecting `tasks_num` tasks in total.
    pub fn run(&mut self, tasks_num: usize) {
        self.tasks_num = tasks_num;
        let (Some(rx), Some(counts_tx)) = (self.handle_rx.take(), self.counts_tx.take()) else {
            warn!("Scheduler is already running");
            return;
        };

        let bookkeeper = Bookkeeper {
            rx,
            ctx: self.ctx.clone(),
            semaphore: self.semaphore.clone(),
            task_timeout: self.config.task_timeout,
            task_retry: self.config.task_retry,
            quit_if_failed: self.config.quit_if_failed,
            worker_stop: self.worker_stop_tx.subscribe(),
            counts_tx,
            stop_rx: self.stop_tx.subscribe(),
            poll_interval: self.config.poll_interval,
            running: Vec::new(),
            report: SchedulerReport::default(),
        };
        self.poller = Some(tokio::spawn(bookkeeper.run()));
    }

    /// Submit a task to the worker pool and enqueue its completion handle.
    ///
    /// Blocks when the completion queue is at capacity, bounding memory
    /// use when tasks are added faster than workers retire them.
    pub async fn add_task(&self, mut task: Task) -> Result<()> {
        task.status = TaskStatus::Queued;
        let label = task.label();
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let handle = spawn_worker(
            self.ctx.clone(),
            self.semaphore.clone(),
            self.config.task_timeout,
            self.worker_stop_tx.subscribe(),
            task,
        );
        self.handle_tx
            .send(handle)
            .await
            .map_err(|_| MigrationError::scheduler("completion queue is closed"))?;
        info!("Task:{} is added to scheduler", label);
        Ok(())
    }

    /// Block until every expected task is terminal, then tear down.
    ///
    /// Returns only once `succeeded + failed == tasks_num`, for any
    /// interleaving of worker completion order, or as soon as the
    /// bookkeeping poller dies of an internal fault (which is then
    /// surfaced as the error).
    pub async fn finish(&mut self) -> Result<SchedulerReport> {
        loop {
            let counts = *self.counts_rx.borrow();
            info!(
                "succeed_task_count:{}, failed_task_count:{}, total_task_count:{}",
                counts.succeeded, counts.failed, self.tasks_num
            );
            if counts.succeeded + counts.failed == self.tasks_num {
                break;
            }
            match &self.poller {
                Some(poller) if !poller.is_finished() => {
                    info!(
                        "Waiting for {} tasks to finish",
                        self.tasks_num
                            .saturating_sub(counts.succeeded)
                            .saturating_sub(counts.failed)
                    );
                    tokio::time::sleep(self.config.finish_poll_interval).await;
                }
                _ => break,
            }
        }
        self.shutdown().await
    }

    /// Tear the scheduler down without waiting for the completion
    /// condition: tasks that have not started resolve CANCELLED, running
    /// tasks run to completion.
    pub async fn shutdown(&mut self) -> Result<SchedulerReport> {
        let _ = self.worker_stop_tx.send(true);
        self.semaphore.close();

        // Wait for every submitted task to reach a terminal list. Running
        // executions are never preempted.
        loop {
            let counts = *self.counts_rx.borrow();
            if counts.terminal() >= self.submitted.load(Ordering::SeqCst) {
                break;
            }
            match &self.poller {
                Some(poller) if !poller.is_finished() => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                _ => break,
            }
        }

        let _ = self.stop_tx.send(true);
        let report = match self.poller.take() {
            Some(poller) => poller
                .await
                .map_err(|e| MigrationError::scheduler(format!("bookkeeping task failed: {}", e)))??,
            None => SchedulerReport::default(),
        };

        for task in &report.succeeded {
            info!("Task:{} is succeed", task.label());
        }
        for task in &report.failed {
            error!("Task:{} is failed", task.label());
        }
        for task in &report.cancelled {
            warn!("Task:{} is cancelled", task.label());
        }
        Ok(report)
    }
}

/// Spawn one task execution onto the pool.
///
/// The worker waits for a pool permit before starting; a shutdown signal
/// (or a closed pool) arriving first resolves the task as CANCELLED
/// without running it.
fn spawn_worker(
    ctx: Arc<TaskContext>,
    semaphore: Arc<Semaphore>,
    task_timeout: Option<Duration>,
    mut stop: watch::Receiver<bool>,
    mut task: Task,
) -> JoinHandle<Task> {
    tokio::spawn(async move {
        let permit = tokio::select! {
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    task.status = TaskStatus::Cancelled;
                    return task;
                }
            },
            _ = stop.changed() => {
                task.status = TaskStatus::Cancelled;
                return task;
            }
        };
        let _permit = permit;
        task.run(&ctx, task_timeout).await;
        task
    })
}

/// Single-writer bookkeeping loop.
struct Bookkeeper {
    rx: mpsc::Receiver<JoinHandle<Task>>,
    ctx: Arc<TaskContext>,
    semaphore: Arc<Semaphore>,
    task_timeout: Option<Duration>,
    task_retry: u32,
    quit_if_failed: bool,
    worker_stop: watch::Receiver<bool>,
    counts_tx: watch::Sender<TaskCounts>,
    stop_rx: watch::Receiver<bool>,
    poll_interval: Duration,
    running: Vec<JoinHandle<Task>>,
    report: SchedulerReport,
}

impl Bookkeeper {
    async fn run(mut self) -> Result<SchedulerReport> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => break,
                _ = ticker.tick() => {
                    self.check_task_results().await?;
                    self.check_running_tasks().await?;
                    self.publish();
                }
            }
        }

        // Settle whatever already finished so shutdown callers get a
        // stable report.
        self.check_task_results().await?;
        self.check_running_tasks().await?;
        self.publish();
        Ok(self.report)
    }

    /// Drain the completion queue, classifying finished handles and
    /// tracking the rest as running.
    async fn check_task_results(&mut self) -> Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(handle) => {
                    if handle.is_finished() {
                        self.classify(handle).await?;
                    } else {
                        debug!("add running task");
                        self.running.push(handle);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(())
    }

    /// Promote running handles that have finished since the last tick.
    async fn check_running_tasks(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.running);
        for handle in pending {
            if handle.is_finished() {
                self.classify(handle).await?;
            } else {
                self.running.push(handle);
            }
        }
        Ok(())
    }

    /// Move a finished task into its terminal list, resubmitting
    /// retryable failures.
    ///
    /// A handle that resolves to an unexplained cancellation or a panic is
    /// an internal scheduler fault and aborts this scheduler.
    async fn classify(&mut self, handle: JoinHandle<Task>) -> Result<()> {
        let task = match handle.await {
            Ok(task) => task,
            Err(e) if e.is_cancelled() => {
                return Err(MigrationError::scheduler(
                    "task is cancelled with unknown reason",
                ));
            }
            Err(e) => {
                return Err(MigrationError::scheduler(format!(
                    "task execution panicked: {}",
                    e
                )));
            }
        };

        match task.status {
            TaskStatus::Completed => self.report.succeeded.push(task),
            TaskStatus::Failed => {
                if task.retry_times <= self.task_retry {
                    let mut task = task;
                    info!(
                        "Task:{} is failed, begin to retry the {} time, max_retry is {}",
                        task.label(),
                        task.retry_times + 1,
                        self.task_retry
                    );
                    task.retry_times += 1;
                    let handle = spawn_worker(
                        self.ctx.clone(),
                        self.semaphore.clone(),
                        self.task_timeout,
                        self.worker_stop.clone(),
                        task,
                    );
                    self.running.push(handle);
                } else {
                    error!(
                        "Task:{} is failed, max_retry is {}",
                        task.label(),
                        self.task_retry
                    );
                    if self.quit_if_failed {
                        warn!(
                            "quit_if_failed is set; task {} exhausted its retries but remaining tasks continue",
                            task.label()
                        );
                    }
                    self.report.failed.push(task);
                }
            }
            TaskStatus::Cancelled => self.report.cancelled.push(task),
            status => {
                return Err(MigrationError::scheduler(format!(
                    "task {} settled in unexpected state {}",
                    task.label(),
                    status
                )));
            }
        }
        Ok(())
    }

    fn publish(&self) {
        let counts = TaskCounts {
            succeeded: self.report.succeeded.len(),
            failed: self.report.failed.len(),
            cancelled: self.report.cancelled.len(),
        };
        let _ = self.counts_tx.send(counts);
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("tasks_num", &self.tasks_num)
            .field("running", &self.poller.is_some())
            .finish()
    }
}
