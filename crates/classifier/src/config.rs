//! 분류 파이프라인 설정
//!
//! core의 [`ClassifierSection`]에서 런타임 설정을 파생합니다.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use logwarden_core::config::{ClassifierSection, ProviderConfig, StoreConfig};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// 분류 동작 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// 휴리스틱 규칙만 사용
    Heuristic,
    /// 항상 provider 호출 (실패 시 휴리스틱으로 폴백)
    Ai,
    /// 휴리스틱 우선, 신뢰도가 낮을 때만 provider 호출
    #[default]
    Hybrid,
}

impl ClassifierMode {
    /// 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Ai => "ai",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierMode {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "ai" => Ok(Self::Ai),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ClassifierError::Config {
                field: "mode".to_owned(),
                reason: format!("unknown classifier mode '{other}'"),
            }),
        }
    }
}

/// HTTP 분석 provider 설정
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// 분석 엔드포인트 URL
    pub endpoint: String,
    /// bearer 토큰 (비어 있으면 헤더 생략)
    pub api_key: String,
    /// 요청 제한 시간
    pub timeout: Duration,
}

impl ProviderSettings {
    fn from_core(provider: &ProviderConfig) -> Option<Self> {
        provider.enabled.then(|| Self {
            endpoint: provider.endpoint.clone(),
            api_key: provider.api_key.clone(),
            timeout: Duration::from_secs(provider.timeout_secs),
        })
    }
}

/// HTTP 문서 저장소 설정
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// 저장소 기본 URL
    pub base_url: String,
    /// 요청 제한 시간
    pub timeout: Duration,
}

impl StoreSettings {
    fn from_core(store: &StoreConfig) -> Option<Self> {
        store.enabled.then(|| Self {
            base_url: store.base_url.clone(),
            timeout: Duration::from_secs(store.timeout_secs),
        })
    }
}

/// 분류 파이프라인 런타임 설정
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// 동작 모드
    pub mode: ClassifierMode,
    /// 추가 휴리스틱 규칙 디렉토리
    pub rule_dir: Option<PathBuf>,
    /// 내장 기본 규칙 사용 여부
    pub builtin_rules: bool,
    /// 분석 결과 캐시 TTL
    pub cache_ttl: Duration,
    /// 캐시 키에 사용하는 메시지 접두 글자 수
    pub cache_key_prefix_chars: usize,
    /// provider 설정 (비활성이면 None)
    pub provider: Option<ProviderSettings>,
    /// 문서 저장소 설정 (비활성이면 None)
    pub store: Option<StoreSettings>,
}

impl ClassifierConfig {
    /// core 설정 섹션에서 런타임 설정을 생성합니다.
    pub fn from_core(section: &ClassifierSection) -> Result<Self, ClassifierError> {
        let rule_dir = (!section.rule_dir.is_empty()).then(|| PathBuf::from(&section.rule_dir));
        Ok(Self {
            mode: section.mode.parse()?,
            rule_dir,
            builtin_rules: true,
            cache_ttl: Duration::from_secs(section.cache_ttl_secs),
            cache_key_prefix_chars: section.cache_key_prefix_chars,
            provider: ProviderSettings::from_core(&section.provider),
            store: StoreSettings::from_core(&section.store),
        })
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.cache_ttl.is_zero() {
            return Err(ClassifierError::Config {
                field: "cache_ttl_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.cache_key_prefix_chars == 0 {
            return Err(ClassifierError::Config {
                field: "cache_key_prefix_chars".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if let Some(provider) = &self.provider
            && provider.endpoint.is_empty()
        {
            return Err(ClassifierError::Config {
                field: "provider.endpoint".to_owned(),
                reason: "must not be empty when provider is enabled".to_owned(),
            });
        }
        if let Some(store) = &self.store
            && store.base_url.is_empty()
        {
            return Err(ClassifierError::Config {
                field: "store.base_url".to_owned(),
                reason: "must not be empty when store is enabled".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Hybrid,
            rule_dir: None,
            builtin_rules: true,
            cache_ttl: Duration::from_secs(3600),
            cache_key_prefix_chars: 100,
            provider: None,
            store: None,
        }
    }
}
