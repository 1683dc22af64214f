//! 설정 관리 -- logwarden.toml 파싱 및 런타임 설정
//!
//! [`LogwardenConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGWARDEN_SCHEDULER_POOL_SIZE=8` 형식)
//! 3. 설정 파일 (`logwarden.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logwarden_core::error::LogwardenError> {
//! use logwarden_core::config::LogwardenConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogwardenConfig::load("logwarden.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogwardenConfig::parse("[scheduler]\npool_size = 8")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogwardenError};

/// Logwarden 통합 설정
///
/// `logwarden.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 크레이트는 `from_core`로 자기 섹션만 읽어 런타임 설정을 만듭니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogwardenConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 작업 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// 분류 파이프라인 설정
    #[serde(default)]
    pub classifier: ClassifierSection,
    /// 캐시 저장소 설정
    #[serde(default)]
    pub cache: CacheSection,
    /// 알림 엔진 설정
    #[serde(default)]
    pub alerting: AlertingSection,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogwardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogwardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogwardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogwardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogwardenError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogwardenError> {
        toml::from_str(toml_str).map_err(|e| {
            LogwardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGWARDEN_{SECTION}_{FIELD}`
    /// 예: `LOGWARDEN_CACHE_BACKEND=redis`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGWARDEN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGWARDEN_GENERAL_LOG_FORMAT");

        // Scheduler
        override_usize(
            &mut self.scheduler.pool_size,
            "LOGWARDEN_SCHEDULER_POOL_SIZE",
        );
        override_u64(
            &mut self.scheduler.shutdown_timeout_secs,
            "LOGWARDEN_SCHEDULER_SHUTDOWN_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.scheduler.queue_high_watermark,
            "LOGWARDEN_SCHEDULER_QUEUE_HIGH_WATERMARK",
        );

        // Classifier
        override_string(&mut self.classifier.mode, "LOGWARDEN_CLASSIFIER_MODE");
        override_string(&mut self.classifier.rule_dir, "LOGWARDEN_CLASSIFIER_RULE_DIR");
        override_u64(
            &mut self.classifier.cache_ttl_secs,
            "LOGWARDEN_CLASSIFIER_CACHE_TTL_SECS",
        );
        override_bool(
            &mut self.classifier.provider.enabled,
            "LOGWARDEN_CLASSIFIER_PROVIDER_ENABLED",
        );
        override_string(
            &mut self.classifier.provider.endpoint,
            "LOGWARDEN_CLASSIFIER_PROVIDER_ENDPOINT",
        );
        override_string(
            &mut self.classifier.provider.api_key,
            "LOGWARDEN_CLASSIFIER_PROVIDER_API_KEY",
        );
        override_u64(
            &mut self.classifier.provider.timeout_secs,
            "LOGWARDEN_CLASSIFIER_PROVIDER_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.classifier.store.enabled,
            "LOGWARDEN_CLASSIFIER_STORE_ENABLED",
        );
        override_string(
            &mut self.classifier.store.base_url,
            "LOGWARDEN_CLASSIFIER_STORE_BASE_URL",
        );

        // Cache
        override_string(&mut self.cache.backend, "LOGWARDEN_CACHE_BACKEND");
        override_string(&mut self.cache.redis_url, "LOGWARDEN_CACHE_REDIS_URL");
        override_string(&mut self.cache.key_prefix, "LOGWARDEN_CACHE_KEY_PREFIX");
        override_usize(&mut self.cache.max_entries, "LOGWARDEN_CACHE_MAX_ENTRIES");

        // Alerting
        override_bool(&mut self.alerting.enabled, "LOGWARDEN_ALERTING_ENABLED");
        override_u64(
            &mut self.alerting.tick_interval_secs,
            "LOGWARDEN_ALERTING_TICK_INTERVAL_SECS",
        );
        override_string(&mut self.alerting.rule_dir, "LOGWARDEN_ALERTING_RULE_DIR");
        override_usize(
            &mut self.alerting.history_limit,
            "LOGWARDEN_ALERTING_HISTORY_LIMIT",
        );
        override_string(
            &mut self.alerting.smtp.host,
            "LOGWARDEN_ALERTING_SMTP_HOST",
        );
        override_string(
            &mut self.alerting.smtp.password,
            "LOGWARDEN_ALERTING_SMTP_PASSWORD",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGWARDEN_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "LOGWARDEN_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "LOGWARDEN_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogwardenError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.scheduler.pool_size == 0 {
            return Err(invalid("scheduler.pool_size", "must be greater than 0"));
        }

        let valid_modes = ["heuristic", "ai", "hybrid"];
        if !valid_modes.contains(&self.classifier.mode.as_str()) {
            return Err(invalid(
                "classifier.mode",
                format!("must be one of: {}", valid_modes.join(", ")),
            ));
        }

        if self.classifier.mode == "ai" && !self.classifier.provider.enabled {
            return Err(invalid(
                "classifier.mode",
                "mode 'ai' requires classifier.provider.enabled = true",
            ));
        }

        if self.classifier.provider.enabled && self.classifier.provider.endpoint.is_empty() {
            return Err(invalid(
                "classifier.provider.endpoint",
                "endpoint must not be empty when provider is enabled",
            ));
        }

        if self.classifier.store.enabled && self.classifier.store.base_url.is_empty() {
            return Err(invalid(
                "classifier.store.base_url",
                "base_url must not be empty when store is enabled",
            ));
        }

        let valid_backends = ["memory", "redis"];
        if !valid_backends.contains(&self.cache.backend.as_str()) {
            return Err(invalid(
                "cache.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }

        if self.cache.backend == "redis" && self.cache.redis_url.is_empty() {
            return Err(invalid(
                "cache.redis_url",
                "redis_url must not be empty when backend is redis",
            ));
        }

        if self.alerting.enabled && self.alerting.tick_interval_secs == 0 {
            return Err(invalid(
                "alerting.tick_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogwardenError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 작업 스케줄러 설정 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// 실행기 수
    pub pool_size: usize,
    /// 종료 시 실행 중인 작업을 기다리는 최대 시간 (초)
    pub shutdown_timeout_secs: u64,
    /// 결과 채널 용량
    pub result_channel_capacity: usize,
    /// 대기열이 이 길이를 넘고 모든 실행기가 바쁘면 Degraded로 보고
    pub queue_high_watermark: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            pool_size: 4,
            shutdown_timeout_secs: 30,
            result_channel_capacity: 1024,
            queue_high_watermark: 10_000,
        }
    }
}

/// 분류 파이프라인 설정 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    /// 분류 모드 (heuristic, ai, hybrid)
    pub mode: String,
    /// 휴리스틱 규칙 YAML 디렉토리 (비어 있으면 내장 규칙만 사용)
    pub rule_dir: String,
    /// 분석 결과 캐시 TTL (초)
    pub cache_ttl_secs: u64,
    /// 캐시 키에 사용하는 메시지 접두어 길이 (문자 수)
    pub cache_key_prefix_chars: usize,
    /// 외부 분석 제공자
    #[serde(default)]
    pub provider: ProviderConfig,
    /// 문서 저장소
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            mode: "hybrid".to_owned(),
            rule_dir: String::new(),
            cache_ttl_secs: 3600,
            cache_key_prefix_chars: 100,
            provider: ProviderConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// 외부 분석 제공자 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 분석 요청 URL
    pub endpoint: String,
    /// Bearer 토큰 (비어 있으면 헤더 생략)
    pub api_key: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// 문서 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 저장소 API 기본 URL
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            timeout_secs: 10,
        }
    }
}

/// 캐시 저장소 설정 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// 백엔드 (memory, redis)
    pub backend: String,
    /// Redis 연결 문자열
    pub redis_url: String,
    /// 모든 키 앞에 붙는 접두어
    pub key_prefix: String,
    /// TTL 미지정 시 기본 TTL (초, 0이면 만료 없음)
    pub default_ttl_secs: u64,
    /// 메모리 백엔드 최대 엔트리 수
    pub max_entries: usize,
    /// 재연결 초기 대기 시간 (밀리초)
    pub reconnect_base_delay_ms: u64,
    /// 재연결 최대 대기 시간 (밀리초)
    pub reconnect_max_delay_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            redis_url: "redis://localhost:6379".to_owned(),
            key_prefix: "logwarden:".to_owned(),
            default_ttl_secs: 3600,
            max_entries: 100_000,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

/// 알림 엔진 설정 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 평가 주기 (초)
    pub tick_interval_secs: u64,
    /// 알림 규칙 YAML 디렉토리 (비어 있으면 로드하지 않음)
    pub rule_dir: String,
    /// 보관할 알림 이력 최대 개수
    pub history_limit: usize,
    /// 개별 액션 실행 타임아웃 (초)
    pub action_timeout_secs: u64,
    /// 알림 이벤트 채널 용량
    pub notification_channel_capacity: usize,
    /// 이메일 액션용 SMTP 설정
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for AlertingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 30,
            rule_dir: String::new(),
            history_limit: 1000,
            action_timeout_secs: 10,
            notification_channel_capacity: 256,
            smtp: SmtpConfig::default(),
        }
    }
}

/// SMTP 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP 서버 호스트 (비어 있으면 이메일 액션 실패 처리)
    pub host: String,
    /// SMTP 포트
    pub port: u16,
    /// 인증 사용자명
    pub username: String,
    /// 인증 비밀번호
    pub password: String,
    /// 발신 주소
    pub from: String,
    /// STARTTLS 사용 여부
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "logwarden@localhost".to_owned(),
            starttls: true,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
