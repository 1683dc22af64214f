//! 작업 스케줄러 -- 우선순위 대기열과 고정 크기 실행기 풀을 관리합니다.
//!
//! [`TaskScheduler`]는 core의 [`Pipeline`] trait을 구현하여
//! `logwarden-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! TaskSubmitter --Submit--> control task --Task--> executor[0..N]
//!                               ^                      |
//!                               +--Completed/Exited----+
//!                               |
//!                               +--WorkerResult--> mpsc --> downstream
//! ```
//!
//! 모든 상태 변경은 단일 control 태스크에서 직렬화된 명령으로 처리됩니다.
//! 실행기는 용량 1 채널로 작업을 받고, 완료를 명령 채널로 알립니다.
//! 실행기마다 감시 태스크가 붙어 패닉을 감지하고 control 태스크에 알립니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

use logwarden_core::error::{LogwardenError, PipelineError};
use logwarden_core::metrics as m;
use logwarden_core::pipeline::{HealthStatus, Pipeline};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::queue::PriorityQueue;
use crate::stats::{SchedulerStats, ShutdownReport};
use crate::task::{Task, TaskHandler, TaskId, TaskRequest, WorkerResult};

/// 한 번의 깨어남에서 처리하는 최대 명령 수
const MAX_COMMANDS_PER_TURN: usize = 256;

/// control 태스크로 전달되는 명령
enum Command {
    /// 작업 제출 (순서 유지)
    Submit(Vec<Task>),
    /// 실행기가 작업을 마침
    Completed {
        executor_id: u64,
        result: WorkerResult,
    },
    /// 실행기 태스크가 종료됨
    ExecutorExited { executor_id: u64, panicked: bool },
    /// 종료 요청
    Shutdown {
        timeout: Duration,
        reply: oneshot::Sender<ShutdownReport>,
    },
}

/// 작업 제출 핸들
///
/// 복제하여 여러 생산자에게 나눠줄 수 있습니다. 제출은 블로킹하지 않으며,
/// 스케줄러 시작 전에 제출한 작업은 시작 시 한꺼번에 대기열에 들어갑니다.
#[derive(Clone)]
pub struct TaskSubmitter {
    cmd_tx: mpsc::UnboundedSender<Command>,
    accepting: Arc<AtomicBool>,
}

impl TaskSubmitter {
    /// 작업 하나를 제출하고 ID를 반환합니다.
    pub fn submit(&self, request: TaskRequest) -> Result<TaskId, SchedulerError> {
        self.ensure_accepting()?;
        let task = Task::from_request(request);
        let id = task.id;
        self.send(vec![task])?;
        Ok(id)
    }

    /// 여러 작업을 순서대로 제출하고 입력 순서의 ID 목록을 반환합니다.
    pub fn submit_batch(
        &self,
        requests: impl IntoIterator<Item = TaskRequest>,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        self.ensure_accepting()?;
        let tasks: Vec<Task> = requests.into_iter().map(Task::from_request).collect();
        let ids = tasks.iter().map(|t| t.id).collect();
        if !tasks.is_empty() {
            self.send(tasks)?;
        }
        Ok(ids)
    }

    /// 새 작업을 받는 중인지 확인합니다.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn ensure_accepting(&self) -> Result<(), SchedulerError> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(SchedulerError::ShuttingDown)
        }
    }

    fn send(&self, tasks: Vec<Task>) -> Result<(), SchedulerError> {
        for task in &tasks {
            metrics::counter!(
                m::SCHEDULER_TASKS_SUBMITTED_TOTAL,
                m::LABEL_PRIORITY => task.priority.as_str()
            )
            .increment(1);
        }
        self.cmd_tx
            .send(Command::Submit(tasks))
            .map_err(|_| SchedulerError::ShuttingDown)
    }
}

/// 스케줄러 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 우선순위 작업 스케줄러
///
/// # 사용 예시
/// ```ignore
/// use logwarden_scheduler::{TaskSchedulerBuilder, TaskRequest, TaskPriority};
///
/// let (mut scheduler, result_rx) = TaskSchedulerBuilder::new()
///     .config(config)
///     .handler(handler)
///     .build()?;
///
/// scheduler.start().await?;
/// let id = scheduler.submit(TaskRequest::new("classify", TaskPriority::High, payload))?;
/// ```
pub struct TaskScheduler<H: TaskHandler> {
    config: SchedulerConfig,
    state: SchedulerState,
    handler: Arc<H>,
    submitter: TaskSubmitter,
    /// control 태스크가 시작될 때 넘겨받음
    cmd_rx: Option<mpsc::UnboundedReceiver<Command>>,
    result_tx: mpsc::Sender<WorkerResult>,
    stats_tx: Option<watch::Sender<SchedulerStats>>,
    stats_rx: watch::Receiver<SchedulerStats>,
    control: Option<JoinHandle<()>>,
    last_report: Option<ShutdownReport>,
}

impl<H: TaskHandler> TaskScheduler<H> {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            SchedulerState::Initialized => "initialized",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        }
    }

    /// 스케줄러 설정
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 복제 가능한 제출 핸들을 반환합니다.
    pub fn submitter(&self) -> TaskSubmitter {
        self.submitter.clone()
    }

    /// 작업 하나를 제출합니다. [`TaskSubmitter::submit`] 참고.
    pub fn submit(&self, request: TaskRequest) -> Result<TaskId, SchedulerError> {
        self.submitter.submit(request)
    }

    /// 여러 작업을 제출합니다. [`TaskSubmitter::submit_batch`] 참고.
    pub fn submit_batch(
        &self,
        requests: impl IntoIterator<Item = TaskRequest>,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        self.submitter.submit_batch(requests)
    }

    /// 최신 통계 스냅샷을 반환합니다.
    pub fn stats(&self) -> SchedulerStats {
        self.stats_rx.borrow().clone()
    }

    /// 통계 변경을 구독하는 수신기를 반환합니다.
    pub fn watch_stats(&self) -> watch::Receiver<SchedulerStats> {
        self.stats_rx.clone()
    }

    /// 마지막 종료 보고서
    pub fn last_shutdown_report(&self) -> Option<ShutdownReport> {
        self.last_report
    }

    /// 설정된 제한 시간으로 종료합니다.
    pub async fn shutdown(&mut self) -> Result<ShutdownReport, SchedulerError> {
        let timeout = self.config.shutdown_timeout;
        self.shutdown_with_timeout(timeout).await
    }

    /// 종료합니다.
    ///
    /// 새 작업 접수를 즉시 멈추고 대기 중인 작업은 버립니다. 실행 중인 작업은
    /// `timeout`까지 기다린 뒤 남은 실행기를 강제 종료합니다.
    pub async fn shutdown_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<ShutdownReport, SchedulerError> {
        if self.state != SchedulerState::Running {
            return Err(SchedulerError::NotStarted);
        }
        self.submitter.accepting.store(false, Ordering::Release);
        self.state = SchedulerState::Stopped;

        tracing::info!(
            timeout_ms = timeout.as_millis() as u64,
            "stopping task scheduler"
        );

        let (reply_tx, reply_rx) = oneshot::channel();
        self.submitter
            .cmd_tx
            .send(Command::Shutdown {
                timeout,
                reply: reply_tx,
            })
            .map_err(|_| SchedulerError::Channel("control task is not running".to_owned()))?;
        let report = reply_rx
            .await
            .map_err(|_| SchedulerError::Channel("control task dropped shutdown reply".to_owned()))?;

        if let Some(control) = self.control.take()
            && let Err(e) = control.await
        {
            tracing::warn!(error = %e, "scheduler control task ended abnormally");
        }

        tracing::info!(
            completed_during_drain = report.completed_during_drain,
            aborted = report.aborted,
            dropped_queued = report.dropped_queued,
            "task scheduler stopped"
        );
        self.last_report = Some(report);
        Ok(report)
    }
}

impl<H: TaskHandler> Pipeline for TaskScheduler<H> {
    async fn start(&mut self) -> Result<(), LogwardenError> {
        match self.state {
            SchedulerState::Running => return Err(PipelineError::AlreadyRunning.into()),
            SchedulerState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "task scheduler cannot be restarted after shutdown".to_owned(),
                )
                .into());
            }
            SchedulerState::Initialized => {}
        }

        let (cmd_rx, stats_tx) = match (self.cmd_rx.take(), self.stats_tx.take()) {
            (Some(cmd_rx), Some(stats_tx)) => (cmd_rx, stats_tx),
            _ => {
                return Err(
                    PipelineError::InitFailed("scheduler channels already consumed".to_owned())
                        .into(),
                );
            }
        };

        tracing::info!(pool_size = self.config.pool_size, "starting task scheduler");

        let control = Control {
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
            queue: PriorityQueue::new(),
            executors: Vec::with_capacity(self.config.pool_size),
            next_executor_id: 0,
            cmd_tx: self.submitter.cmd_tx.clone(),
            result_tx: self.result_tx.clone(),
            stats: SchedulerStats::default(),
            stats_tx,
        };
        self.control = Some(tokio::spawn(control.run(cmd_rx)));
        self.state = SchedulerState::Running;

        tracing::info!("task scheduler started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogwardenError> {
        self.shutdown().await?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            SchedulerState::Running => {
                let stats = self.stats();
                if stats.total_executors < self.config.pool_size {
                    HealthStatus::Degraded(format!(
                        "executor pool below size: {}/{}",
                        stats.total_executors, self.config.pool_size
                    ))
                } else if stats.idle_executors == 0
                    && stats.queue_length > self.config.queue_high_watermark
                {
                    HealthStatus::Degraded(format!(
                        "all executors busy, queue length {}",
                        stats.queue_length
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            SchedulerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            SchedulerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl<H: TaskHandler> Drop for TaskScheduler<H> {
    fn drop(&mut self) {
        // control 태스크가 사라지면 실행기 채널이 닫혀 실행기도 종료됨
        if let Some(control) = self.control.take() {
            control.abort();
        }
    }
}

/// 실행기 슬롯 (control 태스크 소유)
struct ExecutorSlot {
    id: u64,
    task_tx: mpsc::Sender<Task>,
    current: Option<TaskId>,
    abort: AbortHandle,
}

/// control 태스크 상태
struct Control<H: TaskHandler> {
    config: SchedulerConfig,
    handler: Arc<H>,
    queue: PriorityQueue,
    executors: Vec<ExecutorSlot>,
    next_executor_id: u64,
    cmd_tx: mpsc::UnboundedSender<Command>,
    result_tx: mpsc::Sender<WorkerResult>,
    stats: SchedulerStats,
    stats_tx: watch::Sender<SchedulerStats>,
}

impl<H: TaskHandler> Control<H> {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        for _ in 0..self.config.pool_size {
            self.spawn_executor();
        }
        self.publish();

        while let Some(first) = cmd_rx.recv().await {
            let mut next = Some(first);
            let mut handled = 0;
            while let Some(cmd) = next.take() {
                match cmd {
                    Command::Submit(tasks) => self.enqueue(tasks),
                    Command::Completed {
                        executor_id,
                        result,
                    } => {
                        self.record_completion(executor_id, &result);
                        if self.result_tx.send(result).await.is_err() {
                            tracing::debug!("result receiver dropped, discarding result");
                        }
                    }
                    Command::ExecutorExited {
                        executor_id,
                        panicked,
                    } => self.on_executor_exit(executor_id, panicked, true),
                    Command::Shutdown { timeout, reply } => {
                        let report = self.drain(&mut cmd_rx, timeout).await;
                        let _ = reply.send(report);
                        return;
                    }
                }
                handled += 1;
                if handled < MAX_COMMANDS_PER_TURN {
                    next = cmd_rx.try_recv().ok();
                }
            }
            self.dispatch();
            self.publish();
        }
    }

    fn enqueue(&mut self, tasks: Vec<Task>) {
        for task in tasks {
            tracing::trace!(task_id = %task.id, priority = %task.priority, "task queued");
            self.queue.push(task);
        }
    }

    /// 유휴 실행기에 가장 높은 우선순위 작업을 배정합니다.
    fn dispatch(&mut self) {
        for slot in &mut self.executors {
            if slot.current.is_some() {
                continue;
            }
            let Some(task) = self.queue.pop() else {
                break;
            };
            let task_id = task.id;
            match slot.task_tx.try_send(task) {
                Ok(()) => {
                    tracing::trace!(executor_id = slot.id, task_id = %task_id, "task dispatched");
                    slot.current = Some(task_id);
                }
                Err(
                    mpsc::error::TrySendError::Full(task)
                    | mpsc::error::TrySendError::Closed(task),
                ) => self.queue.push_front(task),
            }
        }
    }

    fn record_completion(&mut self, executor_id: u64, result: &WorkerResult) {
        if let Some(slot) = self.executors.iter_mut().find(|s| s.id == executor_id) {
            slot.current = None;
        }
        self.stats
            .record_completion(result.processing_time_ms, result.success);

        metrics::counter!(m::SCHEDULER_TASKS_PROCESSED_TOTAL).increment(1);
        if !result.success {
            metrics::counter!(m::SCHEDULER_TASKS_FAILED_TOTAL).increment(1);
        }
        metrics::histogram!(m::SCHEDULER_TASK_DURATION_SECONDS)
            .record(result.processing_time_ms as f64 / 1000.0);
    }

    /// 종료된 실행기를 풀에서 제거하고, 필요하면 대체 실행기를 띄웁니다.
    fn on_executor_exit(&mut self, executor_id: u64, panicked: bool, respawn: bool) {
        let Some(index) = self.executors.iter().position(|s| s.id == executor_id) else {
            return;
        };
        let slot = self.executors.remove(index);

        self.stats.errors += 1;
        metrics::counter!(m::SCHEDULER_EXECUTOR_CRASHES_TOTAL).increment(1);
        if panicked {
            tracing::error!(executor_id, "executor crashed");
        } else {
            tracing::warn!(executor_id, "executor exited unexpectedly");
        }

        if let Some(task_id) = slot.current {
            self.stats.tasks_lost += 1;
            metrics::counter!(m::SCHEDULER_TASKS_LOST_TOTAL).increment(1);
            tracing::error!(executor_id, task_id = %task_id, "in-flight task lost");
        }

        if respawn {
            self.spawn_executor();
        }
    }

    fn spawn_executor(&mut self) {
        let executor_id = self.next_executor_id;
        self.next_executor_id += 1;

        let (task_tx, task_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_executor(
            executor_id,
            Arc::clone(&self.handler),
            task_rx,
            self.cmd_tx.clone(),
        ));
        let abort = handle.abort_handle();

        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let panicked = match handle.await {
                Ok(()) => false,
                Err(e) if e.is_cancelled() => return,
                Err(e) => e.is_panic(),
            };
            let _ = cmd_tx.send(Command::ExecutorExited {
                executor_id,
                panicked,
            });
        });

        tracing::debug!(executor_id, "executor spawned");
        self.executors.push(ExecutorSlot {
            id: executor_id,
            task_tx,
            current: None,
            abort,
        });
    }

    fn busy_count(&self) -> usize {
        self.executors
            .iter()
            .filter(|s| s.current.is_some())
            .count()
    }

    fn publish(&mut self) {
        let active = self.busy_count();
        self.stats.total_executors = self.executors.len();
        self.stats.active_executors = active;
        self.stats.idle_executors = self.executors.len() - active;
        self.stats.queue_length = self.queue.len();

        metrics::gauge!(m::SCHEDULER_QUEUE_LENGTH).set(self.stats.queue_length as f64);
        metrics::gauge!(m::SCHEDULER_ACTIVE_EXECUTORS).set(active as f64);

        self.stats_tx.send_replace(self.stats.clone());
    }

    async fn drain(
        &mut self,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
        timeout: Duration,
    ) -> ShutdownReport {
        let mut report = ShutdownReport {
            dropped_queued: self.queue.clear(),
            ..ShutdownReport::default()
        };
        let mut extra_replies = Vec::new();
        let deadline = Instant::now() + timeout;

        tracing::info!(
            in_flight = self.busy_count(),
            dropped_queued = report.dropped_queued,
            "draining in-flight tasks"
        );
        self.publish();

        while self.busy_count() > 0 {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Completed { executor_id, result }) => {
                        self.record_completion(executor_id, &result);
                        report.completed_during_drain += 1;
                        if tokio::time::timeout_at(deadline, self.result_tx.send(result))
                            .await
                            .is_err()
                        {
                            tracing::warn!("result delivery timed out during shutdown");
                        }
                    }
                    Some(Command::ExecutorExited { executor_id, panicked }) => {
                        self.on_executor_exit(executor_id, panicked, false);
                    }
                    Some(Command::Submit(tasks)) => report.dropped_queued += tasks.len(),
                    Some(Command::Shutdown { reply, .. }) => extra_replies.push(reply),
                    None => break,
                },
                () = tokio::time::sleep_until(deadline) => break,
            }
        }

        report.aborted = self.busy_count();
        if report.aborted > 0 {
            tracing::warn!(
                aborted = report.aborted,
                "shutdown timeout elapsed, aborting executors"
            );
        }
        for slot in self.executors.drain(..) {
            slot.abort.abort();
        }
        self.publish();

        for reply in extra_replies {
            let _ = reply.send(report);
        }
        report
    }
}

async fn run_executor<H: TaskHandler>(
    executor_id: u64,
    handler: Arc<H>,
    mut task_rx: mpsc::Receiver<Task>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) {
    while let Some(task) = task_rx.recv().await {
        let started = Instant::now();
        let outcome = handler.handle(&task).await;
        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(data) => WorkerResult {
                task_id: task.id,
                success: true,
                data: Some(data),
                error: None,
                processing_time_ms,
            },
            Err(e) => {
                tracing::debug!(executor_id, task_id = %task.id, error = %e, "task handler failed");
                WorkerResult {
                    task_id: task.id,
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    processing_time_ms,
                }
            }
        };

        if cmd_tx
            .send(Command::Completed {
                executor_id,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}

/// 작업 스케줄러 빌더
pub struct TaskSchedulerBuilder<H> {
    config: SchedulerConfig,
    handler: Option<Arc<H>>,
    result_tx: Option<mpsc::Sender<WorkerResult>>,
}

impl<H: TaskHandler> TaskSchedulerBuilder<H> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            handler: None,
            result_tx: None,
        }
    }

    /// 스케줄러 설정을 지정합니다.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// 작업 핸들러를 지정합니다.
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// 이미 공유 중인 핸들러를 지정합니다.
    pub fn shared_handler(mut self, handler: Arc<H>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// 외부 결과 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다.
    pub fn result_sender(mut self, tx: mpsc::Sender<WorkerResult>) -> Self {
        self.result_tx = Some(tx);
        self
    }

    /// 스케줄러를 빌드합니다.
    ///
    /// # Returns
    /// - `TaskScheduler`: 스케줄러 인스턴스
    /// - `Option<mpsc::Receiver<WorkerResult>>`: 결과 수신 채널
    ///   (외부 result_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(TaskScheduler<H>, Option<mpsc::Receiver<WorkerResult>>), SchedulerError> {
        self.config.validate()?;
        let handler = self.handler.ok_or_else(|| SchedulerError::Config {
            field: "handler".to_owned(),
            reason: "task handler is required".to_owned(),
        })?;

        let (result_tx, result_rx) = match self.result_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.config.result_channel_capacity);
                (tx, Some(rx))
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(SchedulerStats::default());

        let scheduler = TaskScheduler {
            config: self.config,
            state: SchedulerState::Initialized,
            handler,
            submitter: TaskSubmitter {
                cmd_tx,
                accepting: Arc::new(AtomicBool::new(true)),
            },
            cmd_rx: Some(cmd_rx),
            result_tx,
            stats_tx: Some(stats_tx),
            stats_rx,
            control: None,
            last_report: None,
        };

        Ok((scheduler, result_rx))
    }
}

impl<H: TaskHandler> Default for TaskSchedulerBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}
