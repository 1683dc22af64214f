#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`task`]: 작업 요청/결과 타입과 [`TaskHandler`] trait
//! - [`queue`]: 3단계 우선순위 FIFO 대기열
//! - [`scheduler`]: control 태스크, 실행기 풀, 빌더 (Pipeline trait 구현)
//! - [`stats`]: 통계 스냅샷과 종료 보고서
//! - [`config`]: 스케줄러 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod task;

// --- 주요 타입 re-export ---

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use queue::PriorityQueue;
pub use scheduler::{TaskScheduler, TaskSchedulerBuilder, TaskSubmitter};
pub use stats::{SchedulerStats, ShutdownReport};
pub use task::{HandlerError, Task, TaskHandler, TaskId, TaskPriority, TaskRequest, WorkerResult};
