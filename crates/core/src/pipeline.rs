//! 파이프라인 trait -- 장기 실행 컴포넌트의 생명주기 정의
//!
//! 스케줄러와 알림 엔진처럼 백그라운드 태스크를 소유하는 컴포넌트는
//! [`Pipeline`]을 구현하여 daemon에서 동일한 방식으로 시작/정지/상태 점검됩니다.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::LogwardenError;

/// `Send` 가능한 boxed future
///
/// dyn 호환 trait(분석 제공자, 문서 저장소, 알림 전송)의 반환 타입으로 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 성능 저하 상태인지 확인합니다.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 생명주기 trait
///
/// `start`는 백그라운드 태스크를 스폰하고 즉시 반환하며,
/// `stop`은 태스크가 정리될 때까지 대기합니다.
pub trait Pipeline: Send {
    /// 컴포넌트를 시작합니다. 이미 실행 중이면 `PipelineError::AlreadyRunning`.
    fn start(&mut self) -> impl Future<Output = Result<(), LogwardenError>> + Send;

    /// 컴포넌트를 정지합니다. 실행 중이 아니면 `PipelineError::NotRunning`.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogwardenError>> + Send;

    /// 현재 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn 호환 생명주기 trait
///
/// [`Pipeline`]은 RPITIT를 사용하므로 trait object로 쓸 수 없습니다.
/// daemon은 `Box<dyn DynPipeline>`으로 서로 다른 컴포넌트를 한 목록에서 관리합니다.
/// `Pipeline + Sync`를 구현한 모든 타입에 자동 구현됩니다.
pub trait DynPipeline: Send + Sync {
    /// [`Pipeline::start`] 참고.
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogwardenError>>;

    /// [`Pipeline::stop`] 참고.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogwardenError>>;

    /// [`Pipeline::health_check`] 참고.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline + Sync> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogwardenError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogwardenError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
