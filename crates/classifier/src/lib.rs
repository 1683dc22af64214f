#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 휴리스틱 규칙 타입, YAML 로더, 정규식 매처, 규칙 엔진
//! - [`result`]: 분류 결과, 신뢰도, 결과 혼합
//! - [`provider`]: 외부 분석 provider trait과 HTTP 구현
//! - [`store`]: 로그 문서 저장소 trait과 HTTP 구현
//! - [`pipeline`]: 캐시/휴리스틱/provider를 조합하는 분류 파이프라인
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod result;
pub mod rule;
pub mod store;

// --- 주요 타입 re-export ---

pub use config::{ClassifierConfig, ClassifierMode, ProviderSettings, StoreSettings};
pub use error::ClassifierError;
pub use pipeline::{ClassificationPipeline, ClassificationPipelineBuilder, cache_key};
pub use provider::{AnalysisProvider, AnalysisRequest, HttpAnalysisProvider};
pub use result::{
    AnalysisContext, AnalysisResult, AnalysisSource, Confidence, ProviderAnalysis,
    TAG_AI_FALLBACK, TAG_HIGH_CONFIDENCE, UNCLASSIFIED,
};
pub use rule::{HeuristicEngine, HeuristicRule, RuleLoader};
pub use store::{ClassificationUpdate, HttpLogStore, LogStore};
