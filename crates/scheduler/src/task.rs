//! 작업 타입 -- 제출 요청, 대기 중인 작업, 실행 결과, 핸들러 trait

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 작업 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// 새 ID를 생성합니다.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 작업 우선순위
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// 가장 먼저 처리
    High,
    /// 기본값
    #[default]
    Normal,
    /// 다른 버킷이 비었을 때만 처리
    Low,
}

impl TaskPriority {
    /// 소문자 이름. 메트릭 레이블 값으로 사용됩니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 작업 제출 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// 작업 종류 (핸들러가 분기에 사용)
    pub task_type: String,
    /// 우선순위
    #[serde(default)]
    pub priority: TaskPriority,
    /// 작업 데이터
    pub payload: serde_json::Value,
}

impl TaskRequest {
    /// 새 요청을 생성합니다.
    pub fn new(
        task_type: impl Into<String>,
        priority: TaskPriority,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            priority,
            payload,
        }
    }
}

/// 스케줄러가 소유하는 작업
///
/// 제출 시 생성되어 결과가 전달되면 소멸합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// 작업 ID
    pub id: TaskId,
    /// 작업 종류
    pub task_type: String,
    /// 우선순위
    pub priority: TaskPriority,
    /// 작업 데이터
    pub payload: serde_json::Value,
    /// 대기열 삽입 시각
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    /// 요청에서 새 ID와 삽입 시각을 부여하여 작업을 생성합니다.
    pub fn from_request(request: TaskRequest) -> Self {
        Self {
            id: TaskId::new(),
            task_type: request.task_type,
            priority: request.priority,
            payload: request.payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// 작업 실행 결과
///
/// 작업당 최대 한 번 전달됩니다. 실행기 크래시로 유실된 작업은 결과가 없습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    /// 작업 ID
    pub task_id: TaskId,
    /// 성공 여부
    pub success: bool,
    /// 핸들러 반환값 (성공 시)
    pub data: Option<serde_json::Value>,
    /// 실패 사유 (실패 시)
    pub error: Option<String>,
    /// 처리 시간 (밀리초)
    pub processing_time_ms: u64,
}

/// 핸들러 실패 타입
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// 작업 핸들러
///
/// 실행기마다 같은 핸들러 인스턴스를 공유합니다.
/// `Err`를 반환하면 `success = false` 결과가 전달되고 실행기는 계속 동작합니다.
/// 패닉은 실행기 크래시로 처리됩니다.
pub trait TaskHandler: Send + Sync + 'static {
    /// 작업을 처리합니다.
    fn handle(
        &self,
        task: &Task,
    ) -> impl Future<Output = Result<serde_json::Value, HandlerError>> + Send;
}
