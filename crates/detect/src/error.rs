//! 탐지 파이프라인 에러 타입
//!
//! [`DetectError`]는 탐지 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<DetectError> for SuriguardError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use suriguard_core::error::{ModelError, PipelineError, SuriguardError};

/// 탐지 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// eve 라인 파싱 실패 — 해당 라인만 건너뛰고 계속 진행
    #[error("parse error: {reason}")]
    Parse {
        /// 실패 사유
        reason: String,
    },

    /// 모델 아티팩트 로딩 실패 — 기동 시 치명적
    #[error("model load error: {path}: {reason}")]
    ModelLoad {
        /// 아티팩트 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 피처 컬럼 스키마 불일치 — 기동 시 치명적
    #[error("feature schema mismatch: model expects {expected} columns, configured {actual}")]
    SchemaMismatch {
        /// 모델이 기대하는 컬럼 수
        expected: usize,
        /// 설정된 컬럼 수
        actual: usize,
    },

    /// 알 수 없는 피처 컬럼 이름 — 기동 시 치명적
    #[error("unknown feature column '{column}'")]
    UnknownColumn {
        /// 문제가 된 컬럼 이름
        column: String,
    },

    /// 영속화 플러시 실패 — 로깅 후 다음 주기에 재시도
    #[error("flush error: {path}: {reason}")]
    Flush {
        /// 출력 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러 (감시 파일 읽기 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DetectError> for SuriguardError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::ModelLoad { path, reason } => {
                SuriguardError::Model(ModelError::LoadFailed { path, reason })
            }
            DetectError::SchemaMismatch { expected, actual } => {
                SuriguardError::Model(ModelError::SchemaMismatch { expected, actual })
            }
            DetectError::Io(e) => SuriguardError::Io(e),
            other => SuriguardError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
