//! 알림 규칙 파일 로더
//!
//! 규칙 디렉토리의 `.yml`/`.yaml` 파일 하나에 규칙 하나를 둡니다.
//! 파싱/검증에 실패한 파일과 중복 ID는 경고 후 건너뜁니다.

use std::collections::HashSet;
use std::path::Path;

use crate::error::AlertingError;
use crate::rule::AlertRule;

const MAX_RULE_FILE_SIZE: u64 = 256 * 1024;
const MAX_RULES_COUNT: usize = 1_000;

/// 알림 규칙 로더
pub struct AlertRuleLoader;

impl AlertRuleLoader {
    /// 디렉토리의 모든 규칙 파일을 로드합니다. 결과는 ID 순으로 정렬됩니다.
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<AlertRule>, AlertingError> {
        let dir = dir.as_ref();
        let load_err = |reason: String| AlertingError::RuleLoad {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_err(format!("failed to read directory: {e}")))?;

        let mut rules = Vec::new();
        let mut seen = HashSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_err(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            if !path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml")
            {
                continue;
            }

            let rule = match Self::load_file(&path).await {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping alert rule file");
                    continue;
                }
            };
            if !seen.insert(rule.id.clone()) {
                tracing::warn!(rule_id = %rule.id, path = %path.display(), "duplicate alert rule id, skipping");
                continue;
            }
            rules.push(rule);

            if rules.len() > MAX_RULES_COUNT {
                return Err(load_err(format!("too many alert rules: max {MAX_RULES_COUNT}")));
            }
        }

        rules.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(dir = %dir.display(), count = rules.len(), "loaded alert rules");
        Ok(rules)
    }

    /// 단일 규칙 파일을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<AlertRule, AlertingError> {
        let path = path.as_ref();
        let load_err = |reason: String| AlertingError::RuleLoad {
            path: path.display().to_string(),
            reason,
        };

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read metadata: {e}")))?
            .len();
        if size > MAX_RULE_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {size} bytes (max: {MAX_RULE_FILE_SIZE})"
            )));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열에서 규칙을 파싱하고 검증합니다.
    pub fn parse_yaml(yaml: &str, source: &str) -> Result<AlertRule, AlertingError> {
        let rule: AlertRule = serde_yaml::from_str(yaml).map_err(|e| AlertingError::RuleLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;
        rule.validate()?;
        Ok(rule)
    }
}
