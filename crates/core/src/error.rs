//! 에러 타입 — 도메인별 에러 정의

/// Suriguard 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SuriguardError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 모델 로딩/스코어링 에러
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중인 파이프라인을 다시 시작하려 함
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 파이프라인을 정지하려 함
    #[error("pipeline is not running")]
    NotRunning,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 모델 로딩/스코어링 에러
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// 모델 아티팩트 로딩 실패 — 기동 시 치명적
    #[error("failed to load model from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// 피처 컬럼 스키마 불일치 — 기동 시 치명적
    ///
    /// 잘못된 컬럼 순서로 조용히 스코어링하는 것을 방지합니다.
    #[error("feature schema mismatch: model expects {expected} columns, configured {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// 스코어링 입력 에러 (벡터 차원 불일치 등)
    #[error("scoring failed: {reason}")]
    Score { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_display() {
        let err = ModelError::SchemaMismatch {
            expected: 4,
            actual: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("4"));
        assert!(msg.contains("8"));
    }

    #[test]
    fn model_error_converts_to_suriguard_error() {
        let err = ModelError::LoadFailed {
            path: "/var/lib/suriguard/model.json".to_owned(),
            reason: "no such file".to_owned(),
        };
        let top: SuriguardError = err.into();
        assert!(matches!(top, SuriguardError::Model(_)));
        assert!(top.to_string().contains("model.json"));
    }

    #[test]
    fn pipeline_error_display() {
        assert_eq!(
            PipelineError::AlreadyRunning.to_string(),
            "pipeline is already running"
        );
        assert_eq!(
            PipelineError::NotRunning.to_string(),
            "pipeline is not running"
        );
    }

    #[test]
    fn config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            field: "detect.poll_interval_ms".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        assert!(err.to_string().contains("poll_interval_ms"));
    }
}
