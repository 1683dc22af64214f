#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 알림 규칙, 조건, 액션 타입과 부분 갱신
//! - [`loader`]: YAML 규칙 디렉토리 로더
//! - [`window`]: 규칙별 관측 윈도우
//! - [`evaluator`]: I/O 없는 알림 상태 전이
//! - [`engine`]: 주기적 평가 루프와 규칙 관리 API
//! - [`source`]: 메트릭 소스 trait과 메모리 레지스트리
//! - [`transport`]: 알림 전송 trait, 기본 구현, 액션 디스패처
//! - [`alert`]: 알림과 알림 이벤트
//! - [`config`]: 엔진 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod rule;
pub mod source;
pub mod transport;
pub mod window;

// --- 주요 타입 re-export ---

pub use alert::{Alert, AlertNotification, AlertStatus};
pub use config::{AlertingConfig, SmtpSettings};
pub use engine::{AlertEngine, AlertEngineBuilder, TickSummary};
pub use error::AlertingError;
pub use loader::AlertRuleLoader;
pub use rule::{
    ActionSpec, Aggregation, AlertAction, AlertCondition, AlertRule, AlertRuleUpdate, Operator,
};
pub use source::{MetricRegistry, MetricSource};
pub use transport::{ActionDispatcher, DefaultTransport, NotificationTransport};
