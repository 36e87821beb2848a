//! 탐지 파이프라인 설정
//!
//! [`DetectConfig`]는 core의 [`DetectSectionConfig`](suriguard_core::config::DetectSectionConfig)를
//! 기반으로 파이프라인 전용 확장 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use suriguard_core::config::SuriguardConfig;
//! use suriguard_detect::config::DetectConfig;
//!
//! let core_config = SuriguardConfig::default();
//! let config = DetectConfig::from_core(&core_config.detect);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// 탐지 파이프라인 설정
///
/// core의 `[detect]` 섹션에서 파생되며, 파이프라인 내부에서
/// 사용하는 추가 설정을 포함합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    /// 감시할 eve JSON 로그 경로
    pub eve_path: String,
    /// 모델 아티팩트 경로 (JSON)
    pub model_path: String,
    /// 피처 컬럼 아티팩트 경로. 없으면 기본 4-컬럼 스키마 사용
    pub feature_columns_path: Option<String>,
    /// 이상 플로우 영속화 경로
    pub output_path: String,
    /// 파일 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 영속화 플러시 간격 (초)
    pub flush_interval_secs: u64,
    /// 이상 저장소 최대 용량
    pub store_capacity: usize,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 한 라인의 최대 길이 (바이트). 초과 라인은 건너뜀
    pub max_line_bytes: usize,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            eve_path: "/var/log/suricata/eve.json".to_owned(),
            model_path: "/var/lib/suriguard/model.json".to_owned(),
            feature_columns_path: None,
            output_path: "/var/lib/suriguard/anomalies.json".to_owned(),
            poll_interval_ms: 1000,
            flush_interval_secs: 5,
            store_capacity: 1000,
            max_line_bytes: 1024 * 1024, // 1MB
        }
    }
}

impl DetectConfig {
    /// core의 `[detect]` 섹션에서 파이프라인 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &suriguard_core::config::DetectSectionConfig) -> Self {
        Self {
            eve_path: core.eve_path.clone(),
            model_path: core.model_path.clone(),
            feature_columns_path: core.feature_columns_path.clone(),
            output_path: core.output_path.clone(),
            poll_interval_ms: core.poll_interval_ms,
            flush_interval_secs: core.flush_interval_secs,
            store_capacity: core.store_capacity,
            ..Self::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DetectError> {
        const MAX_POLL_INTERVAL_MS: u64 = 3_600_000; // 1 hour
        const MAX_FLUSH_INTERVAL_SECS: u64 = 3600; // 1 hour
        const MAX_STORE_CAPACITY: usize = 1_000_000;

        if self.eve_path.is_empty() {
            return Err(DetectError::Config {
                field: "eve_path".to_owned(),
                reason: "watched eve path must not be empty".to_owned(),
            });
        }

        if self.model_path.is_empty() {
            return Err(DetectError::Config {
                field: "model_path".to_owned(),
                reason: "model artifact path must not be empty".to_owned(),
            });
        }

        if self.output_path.is_empty() {
            return Err(DetectError::Config {
                field: "output_path".to_owned(),
                reason: "output path must not be empty".to_owned(),
            });
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(DetectError::Config {
                field: "poll_interval_ms".to_owned(),
                reason: format!("must be 1-{}", MAX_POLL_INTERVAL_MS),
            });
        }

        if self.flush_interval_secs == 0 || self.flush_interval_secs > MAX_FLUSH_INTERVAL_SECS {
            return Err(DetectError::Config {
                field: "flush_interval_secs".to_owned(),
                reason: format!("must be 1-{}", MAX_FLUSH_INTERVAL_SECS),
            });
        }

        if self.store_capacity == 0 || self.store_capacity > MAX_STORE_CAPACITY {
            return Err(DetectError::Config {
                field: "store_capacity".to_owned(),
                reason: format!("must be 1-{}", MAX_STORE_CAPACITY),
            });
        }

        if self.max_line_bytes == 0 {
            return Err(DetectError::Config {
                field: "max_line_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// 탐지 파이프라인 설정 빌더
#[derive(Default)]
pub struct DetectConfigBuilder {
    config: DetectConfig,
}

impl DetectConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 감시할 eve 로그 경로를 설정합니다.
    pub fn eve_path(mut self, path: impl Into<String>) -> Self {
        self.config.eve_path = path.into();
        self
    }

    /// 모델 아티팩트 경로를 설정합니다.
    pub fn model_path(mut self, path: impl Into<String>) -> Self {
        self.config.model_path = path.into();
        self
    }

    /// 피처 컬럼 아티팩트 경로를 설정합니다.
    pub fn feature_columns_path(mut self, path: impl Into<String>) -> Self {
        self.config.feature_columns_path = Some(path.into());
        self
    }

    /// 영속화 경로를 설정합니다.
    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.config.output_path = path.into();
        self
    }

    /// 폴링 주기(밀리초)를 설정합니다.
    pub fn poll_interval_ms(mut self, interval: u64) -> Self {
        self.config.poll_interval_ms = interval;
        self
    }

    /// 플러시 간격(초)을 설정합니다.
    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.config.flush_interval_secs = secs;
        self
    }

    /// 저장소 용량을 설정합니다.
    pub fn store_capacity(mut self, capacity: usize) -> Self {
        self.config.store_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `DetectConfig`를 생성합니다.
    pub fn build(self) -> Result<DetectConfig, DetectError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
