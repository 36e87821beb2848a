//! 설정 관리 — suriguard.toml 파싱 및 런타임 설정
//!
//! [`SuriguardConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SURIGUARD_DETECT_EVE_PATH=/var/log/suricata/eve.json` 형식)
//! 3. 설정 파일 (`suriguard.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), suriguard_core::error::SuriguardError> {
//! use suriguard_core::config::SuriguardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SuriguardConfig::load("suriguard.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SuriguardConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SuriguardError};

/// Suriguard 통합 설정
///
/// `suriguard.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuriguardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 탐지 파이프라인 설정
    #[serde(default)]
    pub detect: DetectSectionConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SuriguardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SuriguardError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SuriguardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SuriguardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SuriguardError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SuriguardError> {
        toml::from_str(toml_str).map_err(|e| {
            SuriguardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SURIGUARD_{SECTION}_{FIELD}`
    /// 예: `SURIGUARD_DETECT_EVE_PATH=/var/log/suricata/eve.json`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SURIGUARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SURIGUARD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "SURIGUARD_GENERAL_DATA_DIR");

        // Detect
        override_string(&mut self.detect.eve_path, "SURIGUARD_DETECT_EVE_PATH");
        override_string(&mut self.detect.model_path, "SURIGUARD_DETECT_MODEL_PATH");
        override_opt_string(
            &mut self.detect.feature_columns_path,
            "SURIGUARD_DETECT_FEATURE_COLUMNS_PATH",
        );
        override_string(&mut self.detect.output_path, "SURIGUARD_DETECT_OUTPUT_PATH");
        override_u64(
            &mut self.detect.poll_interval_ms,
            "SURIGUARD_DETECT_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.detect.flush_interval_secs,
            "SURIGUARD_DETECT_FLUSH_INTERVAL_SECS",
        );
        override_usize(
            &mut self.detect.store_capacity,
            "SURIGUARD_DETECT_STORE_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "SURIGUARD_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "SURIGUARD_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "SURIGUARD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// detect 섹션의 세부 검증(경로, 범위)은 detect 크레이트의
    /// `DetectConfig::validate`가 수행합니다.
    pub fn validate(&self) -> Result<(), SuriguardError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.detect.eve_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "detect.eve_path".to_owned(),
                reason: "watched eve path must not be empty".to_owned(),
            }
            .into());
        }

        if self.detect.model_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "detect.model_path".to_owned(),
                reason: "model artifact path must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/suriguard".to_owned(),
        }
    }
}

/// 탐지 파이프라인 설정 섹션
///
/// detect 크레이트는 `DetectConfig::from_core`로 이 섹션을 받아
/// 내부 확장 설정과 합칩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectSectionConfig {
    /// 감시할 eve JSON 로그 경로
    pub eve_path: String,
    /// 모델 아티팩트 경로 (JSON)
    pub model_path: String,
    /// 피처 컬럼 아티팩트 경로 (JSON 배열). 없으면 기본 4-컬럼 스키마 사용
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_columns_path: Option<String>,
    /// 이상 플로우 영속화 경로 (JSON 배열)
    pub output_path: String,
    /// 파일 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 영속화 플러시 간격 (초)
    pub flush_interval_secs: u64,
    /// 이상 저장소 최대 용량
    pub store_capacity: usize,
}

impl Default for DetectSectionConfig {
    fn default() -> Self {
        Self {
            eve_path: "/var/log/suricata/eve.json".to_owned(),
            model_path: "/var/lib/suriguard/model.json".to_owned(),
            feature_columns_path: None,
            output_path: "/var/lib/suriguard/anomalies.json".to_owned(),
            poll_interval_ms: 1000,
            flush_interval_secs: 5,
            store_capacity: 1000,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// HTTP 리스너 바인드 주소
    pub listen_addr: String,
    /// HTTP 리스너 포트
    pub port: u16,
    /// 스크레이프 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9471,
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

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = SuriguardConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.detect.eve_path, "/var/log/suricata/eve.json");
        assert_eq!(config.detect.poll_interval_ms, 1000);
        assert_eq!(config.detect.flush_interval_secs, 5);
        assert_eq!(config.detect.store_capacity, 1000);
        assert!(config.detect.feature_columns_path.is_none());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = SuriguardConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = SuriguardConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.detect.store_capacity, 1000);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[detect]
eve_path = "/tmp/eve.json"
"#;
        let config = SuriguardConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.detect.eve_path, "/tmp/eve.json");
        assert_eq!(config.detect.poll_interval_ms, 1000);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
data_dir = "/opt/suriguard/data"

[detect]
eve_path = "/var/log/suricata/eve.json"
model_path = "/opt/suriguard/model.json"
feature_columns_path = "/opt/suriguard/columns.json"
output_path = "/opt/suriguard/anomalies.json"
poll_interval_ms = 500
flush_interval_secs = 10
store_capacity = 5000

[metrics]
enabled = true
listen_addr = "0.0.0.0"
port = 9100
"#;
        let config = SuriguardConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(
            config.detect.feature_columns_path.as_deref(),
            Some("/opt/suriguard/columns.json")
        );
        assert_eq!(config.detect.poll_interval_ms, 500);
        assert_eq!(config.detect.store_capacity, 5000);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = SuriguardConfig::parse("invalid = [[[toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            SuriguardError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = SuriguardConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = SuriguardConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_empty_eve_path() {
        let mut config = SuriguardConfig::default();
        config.detect.eve_path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("eve_path"));
    }

    #[test]
    fn validate_rejects_empty_model_path() {
        let mut config = SuriguardConfig::default();
        config.detect.model_path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model_path"));
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_SURIGUARD_STR", "overridden") };
        override_string(&mut val, "TEST_SURIGUARD_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_SURIGUARD_STR") };
    }

    #[test]
    fn env_override_opt_string_empty_clears() {
        let mut val = Some("original".to_owned());
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_SURIGUARD_OPT", "") };
        override_opt_string(&mut val, "TEST_SURIGUARD_OPT");
        assert!(val.is_none());
        unsafe { std::env::remove_var("TEST_SURIGUARD_OPT") };
    }

    #[test]
    fn env_override_u64_invalid_keeps_original() {
        let mut val = 1000u64;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_SURIGUARD_U64_BAD", "not-a-number") };
        override_u64(&mut val, "TEST_SURIGUARD_U64_BAD");
        assert_eq!(val, 1000); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_SURIGUARD_U64_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_SURIGUARD_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = SuriguardConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = SuriguardConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.detect.eve_path, parsed.detect.eve_path);
        assert_eq!(config.metrics.port, parsed.metrics.port);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = SuriguardConfig::from_file("/nonexistent/path/suriguard.toml").await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            SuriguardError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
