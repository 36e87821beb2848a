//! eve 이벤트 파서
//!
//! 센서가 기록한 newline-delimited JSON 이벤트 한 줄을
//! [`FlowRecord`]로 변환합니다. `event_type`이 `"flow"`가 아닌
//! 이벤트는 무시됩니다 (`Ok(None)`).
//!
//! # 입력 형식
//! ```json
//! {"timestamp":"...","event_type":"flow","src_ip":"...","dst_ip":"...",
//!  "flow":{"pkts_toserver":10,"pkts_toclient":8,"bytes_toserver":1200,
//!          "bytes_toclient":900,"start":1000000,"end":3500000,
//!          "proto":"TCP","id":123456}}
//! ```

use serde::Deserialize;

use suriguard_core::types::{FlowRecord, Proto};

use crate::error::DetectError;

/// eve 이벤트 최상위 구조 (소비하는 필드만)
#[derive(Debug, Deserialize)]
struct EveEvent {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    src_ip: Option<String>,
    #[serde(default)]
    dst_ip: Option<String>,
    #[serde(default)]
    flow: Option<EveFlow>,
}

/// eve flow 레코드 (누락 필드는 0/None으로 정규화)
#[derive(Debug, Deserialize)]
struct EveFlow {
    #[serde(default)]
    pkts_toserver: u64,
    #[serde(default)]
    pkts_toclient: u64,
    #[serde(default)]
    bytes_toserver: u64,
    #[serde(default)]
    bytes_toclient: u64,
    /// 플로우 시작 시각 (센서 클럭, 마이크로초)
    #[serde(default)]
    start: Option<u64>,
    /// 플로우 종료 시각 (센서 클럭, 마이크로초)
    #[serde(default)]
    end: Option<u64>,
    #[serde(default)]
    proto: Option<String>,
    /// 플로우 식별자 — 센서에 따라 숫자 또는 문자열
    #[serde(default)]
    id: Option<FlowId>,
}

/// 숫자/문자열 양쪽을 수용하는 플로우 식별자
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlowId {
    Number(u64),
    Text(String),
}

impl FlowId {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// eve 이벤트 파서
///
/// 상태가 없으며 여러 호출에서 재사용됩니다.
pub struct EveParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl EveParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_input_size: 1024 * 1024, // 1MB
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// eve 라인 하나를 파싱합니다.
    ///
    /// # Returns
    /// - `Ok(Some(FlowRecord))`: flow 이벤트
    /// - `Ok(None)`: flow가 아닌 이벤트 (무시 대상)
    /// - `Err(DetectError::Parse)`: 형식이 잘못된 라인
    pub fn parse(&self, raw: &[u8]) -> Result<Option<FlowRecord>, DetectError> {
        if raw.len() > self.max_input_size {
            return Err(DetectError::Parse {
                reason: format!(
                    "input too large: {} bytes (max: {})",
                    raw.len(),
                    self.max_input_size
                ),
            });
        }

        let event: EveEvent = serde_json::from_slice(raw).map_err(|e| DetectError::Parse {
            reason: e.to_string(),
        })?;

        if event.event_type.as_deref() != Some("flow") {
            return Ok(None);
        }

        let Some(flow) = event.flow else {
            return Err(DetectError::Parse {
                reason: "flow event without flow record".to_owned(),
            });
        };

        let timestamp = event
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

        Ok(Some(FlowRecord {
            proto: Proto::from_name(flow.proto.as_deref().unwrap_or("")),
            pkts_toserver: flow.pkts_toserver,
            pkts_toclient: flow.pkts_toclient,
            bytes_toserver: flow.bytes_toserver,
            bytes_toclient: flow.bytes_toclient,
            start_us: flow.start,
            end_us: flow.end,
            src_ip: event.src_ip.unwrap_or_default(),
            dst_ip: event.dst_ip.unwrap_or_default(),
            flow_id: flow.id.map(FlowId::into_string).unwrap_or_default(),
            timestamp,
        }))
    }
}

impl Default for EveParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW_LINE: &[u8] = br#"{"timestamp":"2024-01-15T12:00:00.000000+0000","event_type":"flow","src_ip":"192.168.1.10","dst_ip":"10.0.0.5","flow":{"pkts_toserver":100,"pkts_toclient":80,"bytes_toserver":50000,"bytes_toclient":20000,"start":1000000,"end":3500000,"proto":"TCP","id":987654}}"#;

    #[test]
    fn parses_flow_event() {
        let parser = EveParser::new();
        let record = parser.parse(FLOW_LINE).unwrap().unwrap();
        assert_eq!(record.proto, Proto::Tcp);
        assert_eq!(record.pkts_toserver, 100);
        assert_eq!(record.pkts_toclient, 80);
        assert_eq!(record.bytes_toserver, 50_000);
        assert_eq!(record.bytes_toclient, 20_000);
        assert_eq!(record.start_us, Some(1_000_000));
        assert_eq!(record.end_us, Some(3_500_000));
        assert_eq!(record.src_ip, "192.168.1.10");
        assert_eq!(record.dst_ip, "10.0.0.5");
        assert_eq!(record.flow_id, "987654");
        assert_eq!(record.timestamp, "2024-01-15T12:00:00.000000+0000");
    }

    #[test]
    fn ignores_non_flow_events() {
        let parser = EveParser::new();
        let raw = br#"{"event_type":"alert","alert":{"signature":"test"}}"#;
        assert!(parser.parse(raw).unwrap().is_none());
    }

    #[test]
    fn ignores_events_without_event_type() {
        let parser = EveParser::new();
        let raw = br#"{"timestamp":"2024-01-15T12:00:00Z"}"#;
        assert!(parser.parse(raw).unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let parser = EveParser::new();
        let result = parser.parse(b"not json at all");
        assert!(matches!(result, Err(DetectError::Parse { .. })));
    }

    #[test]
    fn flow_event_without_flow_record_is_parse_error() {
        let parser = EveParser::new();
        let raw = br#"{"event_type":"flow"}"#;
        assert!(matches!(parser.parse(raw), Err(DetectError::Parse { .. })));
    }

    #[test]
    fn missing_numeric_fields_default_to_zero() {
        let parser = EveParser::new();
        let raw = br#"{"event_type":"flow","flow":{"proto":"UDP"}}"#;
        let record = parser.parse(raw).unwrap().unwrap();
        assert_eq!(record.pkts_toserver, 0);
        assert_eq!(record.bytes_toclient, 0);
        assert_eq!(record.start_us, None);
        assert_eq!(record.duration_secs(), 0.0);
        assert_eq!(record.proto, Proto::Udp);
    }

    #[test]
    fn unknown_proto_maps_to_other() {
        let parser = EveParser::new();
        let raw = br#"{"event_type":"flow","flow":{"proto":"SCTP"}}"#;
        let record = parser.parse(raw).unwrap().unwrap();
        assert_eq!(record.proto, Proto::Other);
    }

    #[test]
    fn string_flow_id_is_accepted() {
        let parser = EveParser::new();
        let raw = br#"{"event_type":"flow","flow":{"proto":"TCP","id":"abc-123"}}"#;
        let record = parser.parse(raw).unwrap().unwrap();
        assert_eq!(record.flow_id, "abc-123");
    }

    #[test]
    fn missing_timestamp_falls_back_to_now() {
        let parser = EveParser::new();
        let raw = br#"{"event_type":"flow","flow":{"proto":"TCP"}}"#;
        let record = parser.parse(raw).unwrap().unwrap();
        assert!(!record.timestamp.is_empty());
    }

    #[test]
    fn oversized_input_is_parse_error() {
        let parser = EveParser::new().with_max_input_size(16);
        assert!(matches!(
            parser.parse(FLOW_LINE),
            Err(DetectError::Parse { .. })
        ));
    }
}
