//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logwarden_`
//! - 컴포넌트명: `scheduler_`, `classifier_`, `alerting_`, `cache_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! metrics::counter!(logwarden_core::metrics::SCHEDULER_TASKS_SUBMITTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 우선순위 레이블 키 (high, normal, low)
pub const LABEL_PRIORITY: &str = "priority";

/// 분석 출처 레이블 키 (heuristic, ai, hybrid)
pub const LABEL_SOURCE: &str = "source";

/// 심각도 레이블 키 (low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 알림 액션 종류 레이블 키 (console, webhook, chat_hook, email)
pub const LABEL_ACTION: &str = "action";

/// 캐시 연산 레이블 키 (get, set, delete, ...)
pub const LABEL_OPERATION: &str = "operation";

// ─── Scheduler 메트릭 ──────────────────────────────────────────────

/// Scheduler: 제출된 작업 수 (counter, label: priority)
pub const SCHEDULER_TASKS_SUBMITTED_TOTAL: &str = "logwarden_scheduler_tasks_submitted_total";

/// Scheduler: 완료된 작업 수 (counter)
pub const SCHEDULER_TASKS_PROCESSED_TOTAL: &str = "logwarden_scheduler_tasks_processed_total";

/// Scheduler: 핸들러가 실패를 보고한 작업 수 (counter)
pub const SCHEDULER_TASKS_FAILED_TOTAL: &str = "logwarden_scheduler_tasks_failed_total";

/// Scheduler: 실행기 크래시로 유실된 작업 수 (counter)
pub const SCHEDULER_TASKS_LOST_TOTAL: &str = "logwarden_scheduler_tasks_lost_total";

/// Scheduler: 실행기 크래시 수 (counter)
pub const SCHEDULER_EXECUTOR_CRASHES_TOTAL: &str = "logwarden_scheduler_executor_crashes_total";

/// Scheduler: 대기열 길이 (gauge)
pub const SCHEDULER_QUEUE_LENGTH: &str = "logwarden_scheduler_queue_length";

/// Scheduler: 작업 중인 실행기 수 (gauge)
pub const SCHEDULER_ACTIVE_EXECUTORS: &str = "logwarden_scheduler_active_executors";

/// Scheduler: 작업 처리 시간 (histogram, 초)
pub const SCHEDULER_TASK_DURATION_SECONDS: &str = "logwarden_scheduler_task_duration_seconds";

// ─── Classifier 메트릭 ─────────────────────────────────────────────

/// Classifier: 분석 수 (counter, label: source)
pub const CLASSIFIER_ANALYSES_TOTAL: &str = "logwarden_classifier_analyses_total";

/// Classifier: 캐시 적중 수 (counter)
pub const CLASSIFIER_CACHE_HITS_TOTAL: &str = "logwarden_classifier_cache_hits_total";

/// Classifier: 캐시 미스 수 (counter)
pub const CLASSIFIER_CACHE_MISSES_TOTAL: &str = "logwarden_classifier_cache_misses_total";

/// Classifier: 외부 분석 제공자 실패 수 (counter)
pub const CLASSIFIER_PROVIDER_FAILURES_TOTAL: &str =
    "logwarden_classifier_provider_failures_total";

/// Classifier: 분류 결과 저장 실패 수 (counter)
pub const CLASSIFIER_PERSIST_FAILURES_TOTAL: &str = "logwarden_classifier_persist_failures_total";

/// Classifier: 분석 소요 시간 (histogram, 초)
pub const CLASSIFIER_ANALYSIS_DURATION_SECONDS: &str =
    "logwarden_classifier_analysis_duration_seconds";

// ─── Alerting 메트릭 ───────────────────────────────────────────────

/// Alerting: 발생한 알림 수 (counter, label: severity)
pub const ALERTING_ALERTS_FIRED_TOTAL: &str = "logwarden_alerting_alerts_fired_total";

/// Alerting: 해소된 알림 수 (counter)
pub const ALERTING_ALERTS_RESOLVED_TOTAL: &str = "logwarden_alerting_alerts_resolved_total";

/// Alerting: cooldown으로 억제된 평가 수 (counter)
pub const ALERTING_SUPPRESSED_TOTAL: &str = "logwarden_alerting_suppressed_total";

/// Alerting: 실패한 액션 수 (counter, label: action)
pub const ALERTING_ACTION_FAILURES_TOTAL: &str = "logwarden_alerting_action_failures_total";

/// Alerting: 활성 알림 수 (gauge)
pub const ALERTING_ACTIVE_ALERTS: &str = "logwarden_alerting_active_alerts";

// ─── Cache 메트릭 ──────────────────────────────────────────────────

/// Cache: 백엔드 연산 실패 수 (counter, label: operation)
pub const CACHE_ERRORS_TOTAL: &str = "logwarden_cache_errors_total";

/// Cache: 재연결 시도 수 (counter)
pub const CACHE_RECONNECT_ATTEMPTS_TOTAL: &str = "logwarden_cache_reconnect_attempts_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logwarden_daemon_build_info";

// ─── 히스토그램 버킷 정의 ───────────────────────────────────────────

/// 작업/분석 처리 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 30s 범위, 외부 분석 호출 포함
pub const PROCESSING_DURATION_BUCKETS: [f64; 10] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

// ─── 설명 등록 함수 ────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `logwarden-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Scheduler
    describe_counter!(
        SCHEDULER_TASKS_SUBMITTED_TOTAL,
        "Total number of tasks submitted to the scheduler"
    );
    describe_counter!(
        SCHEDULER_TASKS_PROCESSED_TOTAL,
        "Total number of tasks that produced a result"
    );
    describe_counter!(
        SCHEDULER_TASKS_FAILED_TOTAL,
        "Total number of tasks whose handler reported a failure"
    );
    describe_counter!(
        SCHEDULER_TASKS_LOST_TOTAL,
        "Total number of in-flight tasks lost to executor crashes"
    );
    describe_counter!(
        SCHEDULER_EXECUTOR_CRASHES_TOTAL,
        "Total number of executor crashes"
    );
    describe_gauge!(SCHEDULER_QUEUE_LENGTH, "Number of tasks waiting for dispatch");
    describe_gauge!(
        SCHEDULER_ACTIVE_EXECUTORS,
        "Number of executors currently running a task"
    );
    describe_histogram!(
        SCHEDULER_TASK_DURATION_SECONDS,
        "Task processing time in seconds"
    );

    // Classifier
    describe_counter!(
        CLASSIFIER_ANALYSES_TOTAL,
        "Total number of computed analyses by result source"
    );
    describe_counter!(
        CLASSIFIER_CACHE_HITS_TOTAL,
        "Total number of analyses served from cache"
    );
    describe_counter!(
        CLASSIFIER_CACHE_MISSES_TOTAL,
        "Total number of analyses not found in cache"
    );
    describe_counter!(
        CLASSIFIER_PROVIDER_FAILURES_TOTAL,
        "Total number of failed or timed out analysis provider calls"
    );
    describe_counter!(
        CLASSIFIER_PERSIST_FAILURES_TOTAL,
        "Total number of failed classification write-backs"
    );
    describe_histogram!(
        CLASSIFIER_ANALYSIS_DURATION_SECONDS,
        "Time to compute a single analysis in seconds"
    );

    // Alerting
    describe_counter!(ALERTING_ALERTS_FIRED_TOTAL, "Total number of alerts fired");
    describe_counter!(
        ALERTING_ALERTS_RESOLVED_TOTAL,
        "Total number of alerts resolved"
    );
    describe_counter!(
        ALERTING_SUPPRESSED_TOTAL,
        "Total number of evaluations suppressed by cooldown"
    );
    describe_counter!(
        ALERTING_ACTION_FAILURES_TOTAL,
        "Total number of failed alert actions"
    );
    describe_gauge!(ALERTING_ACTIVE_ALERTS, "Number of currently firing alerts");

    // Cache
    describe_counter!(CACHE_ERRORS_TOTAL, "Total number of cache backend errors");
    describe_counter!(
        CACHE_RECONNECT_ATTEMPTS_TOTAL,
        "Total number of cache backend reconnect attempts"
    );

    // Daemon
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
