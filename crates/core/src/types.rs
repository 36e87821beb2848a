//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 센서가 기록한 플로우 레코드와 탐지 결과(Anomaly)를 정의합니다.
//! detect 크레이트와 daemon이 이 타입들을 통해 데이터를 교환합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 전송 프로토콜 — 센서 문자열을 고정 열거형으로 매핑합니다.
///
/// 피처 추출 시 [`Proto::feature_code`]가 반환하는 숫자 코드는
/// 모델 학습 시점과 동일해야 합니다 (TCP=6, UDP=17, ICMP=1, 그 외 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Proto {
    /// TCP
    #[serde(rename = "TCP")]
    Tcp,
    /// UDP
    #[serde(rename = "UDP")]
    Udp,
    /// ICMP
    #[serde(rename = "ICMP")]
    Icmp,
    /// 알 수 없는 프로토콜 (sentinel 코드 0)
    #[default]
    #[serde(rename = "other")]
    Other,
}

impl Proto {
    /// 센서가 기록한 프로토콜 문자열을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 알 수 없는 값은 [`Proto::Other`]가 됩니다.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "TCP" => Self::Tcp,
            "UDP" => Self::Udp,
            "ICMP" => Self::Icmp,
            _ => Self::Other,
        }
    }

    /// 피처 벡터에 들어가는 숫자 코드를 반환합니다.
    pub fn feature_code(self) -> f64 {
        match self {
            Self::Tcp => 6.0,
            Self::Udp => 17.0,
            Self::Icmp => 1.0,
            Self::Other => 0.0,
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Icmp => write!(f, "ICMP"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// 파싱된 플로우 레코드
///
/// 센서의 `"flow"` 이벤트 한 건을 나타냅니다.
/// 누락된 수치 필드는 0으로, 누락된 타임스탬프는 `None`으로 정규화됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    /// 전송 프로토콜
    pub proto: Proto,
    /// 서버 방향 패킷 수
    pub pkts_toserver: u64,
    /// 클라이언트 방향 패킷 수
    pub pkts_toclient: u64,
    /// 서버 방향 바이트 수
    pub bytes_toserver: u64,
    /// 클라이언트 방향 바이트 수
    pub bytes_toclient: u64,
    /// 플로우 시작 시각 (센서 클럭, 마이크로초)
    pub start_us: Option<u64>,
    /// 플로우 종료 시각 (센서 클럭, 마이크로초)
    pub end_us: Option<u64>,
    /// 출발지 주소
    pub src_ip: String,
    /// 목적지 주소
    pub dst_ip: String,
    /// 플로우 식별자 (불투명 문자열)
    pub flow_id: String,
    /// 센서 이벤트 타임스탬프 (RFC 3339 문자열 그대로 보존)
    pub timestamp: String,
}

impl FlowRecord {
    /// 플로우 지속 시간(초)을 반환합니다.
    ///
    /// start/end가 모두 존재할 때만 `(end - start) / 1e6`, 그 외에는 0.
    /// end가 0인 레코드(두 값 모두 0인 미기록 플로우 포함)와
    /// end < start인 비정상 레코드도 0으로 처리합니다
    /// (음수 지속 시간은 절대 반환하지 않습니다).
    pub fn duration_secs(&self) -> f64 {
        match (self.start_us, self.end_us) {
            (Some(start), Some(end)) if end > 0 && end >= start => {
                (end - start) as f64 / 1_000_000.0
            }
            _ => 0.0,
        }
    }

    /// 양방향 패킷 합계를 반환합니다.
    pub fn total_packets(&self) -> u64 {
        self.pkts_toserver + self.pkts_toclient
    }

    /// 양방향 바이트 합계를 반환합니다.
    pub fn total_bytes(&self) -> u64 {
        self.bytes_toserver + self.bytes_toclient
    }
}

impl fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} proto={} pkts={} bytes={}",
            self.src_ip,
            self.dst_ip,
            self.proto,
            self.total_packets(),
            self.total_bytes(),
        )
    }
}

/// 탐지된 이상 플로우
///
/// 스코어가 음수인 플로우에 대해서만 생성되며, 생성 후 변경되지 않습니다.
/// 직렬화 필드 이름은 영속화 파일(JSON 배열)의 소비자와 공유되는 계약입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// 센서 이벤트 타임스탬프
    pub timestamp: String,
    /// 플로우 식별자
    pub flow_id: String,
    /// 출발지 주소
    pub src_ip: String,
    /// 목적지 주소
    pub dst_ip: String,
    /// 전송 프로토콜
    pub proto: Proto,
    /// 양방향 패킷 합계
    pub packets: u64,
    /// 양방향 바이트 합계
    pub bytes: u64,
    /// 플로우 지속 시간 (초)
    pub duration: f64,
    /// 이상 스코어 (음수 = 이상)
    pub score: f64,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}] {} -> {} proto={} pkts={} bytes={}",
            self.score, self.src_ip, self.dst_ip, self.proto, self.packets, self.bytes,
        )
    }
}
