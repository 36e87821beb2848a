//! 피처 추출 — 플로우 레코드를 고정 순서 수치 벡터로 변환
//!
//! 추출은 순수 함수이며 실패하지 않습니다. 누락된 수치 필드는 0,
//! 알 수 없는 프로토콜은 sentinel 코드 0으로 처리됩니다.
//!
//! 스코어러에 전달되는 벡터는 모델 학습 시점에 기록된 컬럼 목록과
//! 순서·구성이 정확히 일치해야 합니다. 컬럼 목록에 없는 파생 피처는
//! 계산만 되고 벡터에서는 제외됩니다.

use suriguard_core::types::FlowRecord;

use crate::error::DetectError;

/// 피처 컬럼 이름 상수 — 학습/스코어링 양쪽이 공유하는 계약
pub const COL_TOTAL_PACKETS: &str = "total_packets";
/// 양방향 바이트 합계
pub const COL_TOTAL_BYTES: &str = "total_bytes";
/// 플로우 지속 시간 (초)
pub const COL_DURATION: &str = "duration";
/// 프로토콜 숫자 코드
pub const COL_PROTO: &str = "proto";
/// 초당 바이트
pub const COL_BYTES_PER_SEC: &str = "bytes_per_sec";
/// 초당 패킷
pub const COL_PKTS_PER_SEC: &str = "pkts_per_sec";
/// 패킷당 바이트
pub const COL_BYTES_PER_PACKET: &str = "bytes_per_packet";
/// 서버/클라이언트 트래픽 비율
pub const COL_CLIENT_SERVER_RATIO: &str = "client_server_ratio";

/// 계산 가능한 전체 컬럼 목록
pub const ALL_COLUMNS: &[&str] = &[
    COL_TOTAL_PACKETS,
    COL_TOTAL_BYTES,
    COL_DURATION,
    COL_PROTO,
    COL_BYTES_PER_SEC,
    COL_PKTS_PER_SEC,
    COL_BYTES_PER_PACKET,
    COL_CLIENT_SERVER_RATIO,
];

/// 컬럼 아티팩트가 없을 때 사용하는 기본 4-컬럼 스키마
pub fn default_columns() -> Vec<String> {
    vec![
        COL_TOTAL_PACKETS.to_owned(),
        COL_TOTAL_BYTES.to_owned(),
        COL_DURATION.to_owned(),
        COL_PROTO.to_owned(),
    ]
}

/// 플로우 하나에서 파생된 전체 피처 값
///
/// 벡터 투영 전의 중간 표현입니다. 이상 레코드 생성 시
/// packets/bytes/duration이 여기서 그대로 사용됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowFeatures {
    /// 양방향 패킷 합계
    pub total_packets: f64,
    /// 양방향 바이트 합계
    pub total_bytes: f64,
    /// 플로우 지속 시간 (초)
    pub duration: f64,
    /// 프로토콜 숫자 코드
    pub proto: f64,
    /// 초당 바이트 (duration이 0이면 0)
    pub bytes_per_sec: f64,
    /// 초당 패킷 (duration이 0이면 0)
    pub pkts_per_sec: f64,
    /// 패킷당 바이트 (패킷이 0이면 0)
    pub bytes_per_packet: f64,
    /// 서버 방향/클라이언트 방향 바이트 비율
    ///
    /// 클라이언트 방향 트래픽이 없으면 `f64::INFINITY`
    /// ("역방향 트래픽 없음"을 의미하며 에러가 아님)
    pub client_server_ratio: f64,
}

impl FlowFeatures {
    /// 이름으로 피처 값을 조회합니다.
    pub fn get(&self, column: &str) -> Option<f64> {
        match column {
            COL_TOTAL_PACKETS => Some(self.total_packets),
            COL_TOTAL_BYTES => Some(self.total_bytes),
            COL_DURATION => Some(self.duration),
            COL_PROTO => Some(self.proto),
            COL_BYTES_PER_SEC => Some(self.bytes_per_sec),
            COL_PKTS_PER_SEC => Some(self.pkts_per_sec),
            COL_BYTES_PER_PACKET => Some(self.bytes_per_packet),
            COL_CLIENT_SERVER_RATIO => Some(self.client_server_ratio),
            _ => None,
        }
    }
}

/// 피처 추출기
///
/// 설정된 컬럼 목록 순서대로 피처 벡터를 투영합니다.
/// 컬럼 목록은 스코어러가 선언한 스키마에서 옵니다.
pub struct FeatureExtractor {
    /// 벡터 투영 순서 (스코어러 스키마와 일치)
    columns: Vec<String>,
}

impl FeatureExtractor {
    /// 새 피처 추출기를 생성합니다.
    ///
    /// # Errors
    ///
    /// 계산할 수 없는 컬럼 이름이 포함되어 있으면
    /// `DetectError::UnknownColumn`을 반환합니다.
    /// 벡터 불일치는 런타임에 복구할 수 없는 설정 에러이므로
    /// 기동 시점에 거부합니다.
    pub fn new(columns: Vec<String>) -> Result<Self, DetectError> {
        for column in &columns {
            if !ALL_COLUMNS.contains(&column.as_str()) {
                return Err(DetectError::UnknownColumn {
                    column: column.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// 설정된 컬럼 목록을 반환합니다.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 플로우 레코드에서 전체 파생 피처를 계산합니다. 순수 함수.
    pub fn features(&self, record: &FlowRecord) -> FlowFeatures {
        let total_packets = record.total_packets() as f64;
        let total_bytes = record.total_bytes() as f64;
        let duration = record.duration_secs();

        let bytes_per_sec = if duration > 0.0 {
            total_bytes / duration
        } else {
            0.0
        };
        let pkts_per_sec = if duration > 0.0 {
            total_packets / duration
        } else {
            0.0
        };
        let bytes_per_packet = if total_packets > 0.0 {
            total_bytes / total_packets
        } else {
            0.0
        };
        let client_server_ratio = if record.bytes_toclient > 0 {
            record.bytes_toserver as f64 / record.bytes_toclient as f64
        } else {
            f64::INFINITY
        };

        FlowFeatures {
            total_packets,
            total_bytes,
            duration,
            proto: record.proto.feature_code(),
            bytes_per_sec,
            pkts_per_sec,
            bytes_per_packet,
            client_server_ratio,
        }
    }

    /// 파생 피처를 설정된 컬럼 순서의 벡터로 투영합니다.
    pub fn vector(&self, features: &FlowFeatures) -> Vec<f64> {
        self.columns
            .iter()
            // new()에서 컬럼을 검증했으므로 get은 항상 Some
            .map(|col| features.get(col).unwrap_or(0.0))
            .collect()
    }
}
