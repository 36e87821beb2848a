//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `suriguard_`
//! - 모듈명: `detect_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (시간), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (TCP, UDP, ICMP, other)
pub const LABEL_PROTOCOL: &str = "protocol";

// ─── Detect 파이프라인 메트릭 ───────────────────────────────────────

/// Detect: 수집된 전체 라인 수 (counter)
pub const DETECT_LINES_COLLECTED_TOTAL: &str = "suriguard_detect_lines_collected_total";

/// Detect: 스코어링까지 완료된 플로우 이벤트 수 (counter)
pub const DETECT_FLOWS_PROCESSED_TOTAL: &str = "suriguard_detect_flows_processed_total";

/// Detect: 파싱 에러 수 (counter)
pub const DETECT_PARSE_ERRORS_TOTAL: &str = "suriguard_detect_parse_errors_total";

/// Detect: 탐지된 이상 플로우 수 (counter, label: protocol)
pub const DETECT_ANOMALIES_TOTAL: &str = "suriguard_detect_anomalies_total";

/// Detect: 저장소 내 이상 플로우 수 (gauge)
pub const DETECT_STORE_SIZE: &str = "suriguard_detect_store_size";

/// Detect: 용량 초과로 제거된 엔트리 수 (counter)
pub const DETECT_STORE_EVICTED_TOTAL: &str = "suriguard_detect_store_evicted_total";

/// Detect: 성공한 영속화 플러시 수 (counter)
pub const DETECT_FLUSHES_TOTAL: &str = "suriguard_detect_flushes_total";

/// Detect: 실패한 영속화 플러시 수 (counter)
pub const DETECT_FLUSH_FAILURES_TOTAL: &str = "suriguard_detect_flush_failures_total";

/// Detect: 감시 파일 truncation/rotation으로 인한 오프셋 리셋 수 (counter)
pub const DETECT_TAIL_RESETS_TOTAL: &str = "suriguard_detect_tail_resets_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "suriguard_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "suriguard_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `suriguard-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        DETECT_LINES_COLLECTED_TOTAL,
        "Total number of raw lines collected from the watched eve log"
    );
    describe_counter!(
        DETECT_FLOWS_PROCESSED_TOTAL,
        "Total number of flow events that completed feature extraction and scoring"
    );
    describe_counter!(
        DETECT_PARSE_ERRORS_TOTAL,
        "Total number of lines that failed to parse as eve events"
    );
    describe_counter!(
        DETECT_ANOMALIES_TOTAL,
        "Total number of flows scored as anomalous (negative score)"
    );
    describe_gauge!(
        DETECT_STORE_SIZE,
        "Current number of anomalies held in the in-memory store"
    );
    describe_counter!(
        DETECT_STORE_EVICTED_TOTAL,
        "Total number of anomalies evicted from the store due to capacity"
    );
    describe_counter!(
        DETECT_FLUSHES_TOTAL,
        "Total number of successful anomaly persistence flushes"
    );
    describe_counter!(
        DETECT_FLUSH_FAILURES_TOTAL,
        "Total number of failed anomaly persistence flushes"
    );
    describe_counter!(
        DETECT_TAIL_RESETS_TOTAL,
        "Total number of tail offset resets caused by truncation or rotation"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Suriguard daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
