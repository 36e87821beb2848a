//! 이상 저장소 — 유계 링 버퍼 + 디바운스된 원자적 영속화
//!
//! [`AnomalyStore`]는 탐지된 이상 플로우를 삽입 순서대로 보관합니다.
//! 용량 초과 시 가장 오래된 엔트리를 제거합니다 (ring-buffer semantics).
//!
//! # 동시성 계약
//! - 쓰기(삽입/플러시 기록)는 파이프라인 producer 태스크 하나만 수행
//! - 읽기([`snapshot`](AnomalyStore::snapshot))는 여러 컨텍스트에서 동시 호출 가능
//! - 임계 구역은 짧은 copy-out 하나뿐이며, 락을 쥔 채 await하지 않음
//!
//! # 영속화
//! 전체 내용을 JSON 배열로 직렬화하여 임시 파일에 쓴 뒤 rename으로
//! 교체합니다. 같은 경로를 읽는 소비자는 절대 부분 기록 상태를
//! 관측하지 않습니다.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use suriguard_core::metrics as m;
use suriguard_core::types::Anomaly;

use crate::error::DetectError;

/// 락으로 보호되는 내부 상태
#[derive(Debug)]
struct StoreInner {
    /// 삽입 순서 버퍼
    entries: VecDeque<Anomaly>,
    /// 용량 초과로 제거된 엔트리 수
    evicted: u64,
    /// 총 삽입 엔트리 수
    total_inserted: u64,
    /// 마지막 성공 플러시 시각 (생성 시각으로 초기화)
    last_flush: Instant,
    /// 마지막 플러시 이후 내용 변경 여부
    dirty: bool,
    /// 성공한 플러시 수
    flush_count: u64,
    /// 실패한 플러시 수
    flush_failures: u64,
}

/// 유계 이상 저장소
pub struct AnomalyStore {
    inner: RwLock<StoreInner>,
    /// 최대 용량
    capacity: usize,
    /// 영속화 경로
    output_path: PathBuf,
    /// 플러시 디바운스 간격
    flush_interval: Duration,
}

impl AnomalyStore {
    /// 새 저장소를 생성합니다.
    ///
    /// 플러시 간격은 생성 시각부터 측정됩니다.
    pub fn new(capacity: usize, output_path: impl Into<PathBuf>, flush_interval_secs: u64) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                entries: VecDeque::with_capacity(capacity.min(10_000)),
                evicted: 0,
                total_inserted: 0,
                last_flush: Instant::now(),
                dirty: false,
                flush_count: 0,
                flush_failures: 0,
            }),
            capacity,
            output_path: output_path.into(),
            flush_interval: Duration::from_secs(flush_interval_secs),
        }
    }

    /// 이상 플로우를 추가합니다.
    ///
    /// 용량이 초과되면 가장 오래된 엔트리를 제거하고 `true`를 반환합니다.
    pub fn insert(&self, anomaly: Anomaly) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.total_inserted += 1;
        inner.dirty = true;

        let mut evicted = false;
        if inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
            inner.evicted += 1;
            evicted = true;
            metrics::counter!(m::DETECT_STORE_EVICTED_TOTAL).increment(1);
        }
        inner.entries.push_back(anomaly);
        metrics::gauge!(m::DETECT_STORE_SIZE).set(inner.entries.len() as f64);
        evicted
    }

    /// 최신 `limit`개 엔트리를 삽입 순서대로 복사해 반환합니다.
    ///
    /// 여러 읽기 컨텍스트에서 동시에 호출해도 안전하며,
    /// producer를 copy-out 이상으로 블록하지 않습니다.
    pub fn snapshot(&self, limit: usize) -> Vec<Anomaly> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let skip = inner.entries.len().saturating_sub(limit);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    /// 현재 엔트리 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    /// 저장소가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 최대 용량을 반환합니다.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 총 삽입 엔트리 수를 반환합니다.
    pub fn total_inserted(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .total_inserted
    }

    /// 용량 초과로 제거된 엔트리 수를 반환합니다.
    pub fn evicted_count(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).evicted
    }

    /// 성공한 플러시 수를 반환합니다.
    pub fn flush_count(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .flush_count
    }

    /// 실패한 플러시 수를 반환합니다.
    pub fn flush_failure_count(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .flush_failures
    }

    /// 저장소 사용률을 0.0~1.0 범위로 반환합니다.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.len() as f64 / self.capacity as f64
    }

    /// 디바운스 조건을 확인하고 필요하면 플러시합니다.
    ///
    /// 마지막 성공 플러시 이후 플러시 간격이 지났고 내용이 변경된
    /// 경우에만 기록합니다. 플러시했으면 `true`를 반환합니다.
    pub async fn maybe_flush(&self) -> Result<bool, DetectError> {
        self.maybe_flush_at(Instant::now()).await
    }

    /// 주입된 현재 시각 기준으로 디바운스 플러시를 수행합니다.
    pub async fn maybe_flush_at(&self, now: Instant) -> Result<bool, DetectError> {
        let snapshot = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if !inner.dirty || now.duration_since(inner.last_flush) < self.flush_interval {
                return Ok(false);
            }
            inner.entries.iter().cloned().collect::<Vec<_>>()
        };

        match self.write_snapshot(&snapshot).await {
            Ok(()) => {
                let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
                inner.last_flush = now;
                inner.dirty = false;
                inner.flush_count += 1;
                metrics::counter!(m::DETECT_FLUSHES_TOTAL).increment(1);
                Ok(true)
            }
            Err(e) => {
                // 인메모리 상태는 그대로 유지: 다음 주기에 당시 내용으로 재시도
                let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
                inner.flush_failures += 1;
                metrics::counter!(m::DETECT_FLUSH_FAILURES_TOTAL).increment(1);
                Err(e)
            }
        }
    }

    /// 디바운스를 무시하고 즉시 플러시합니다 (종료 시 사용).
    ///
    /// 변경된 내용이 없으면 기록하지 않습니다.
    pub async fn flush_now(&self) -> Result<bool, DetectError> {
        let snapshot = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if !inner.dirty {
                return Ok(false);
            }
            inner.entries.iter().cloned().collect::<Vec<_>>()
        };

        self.write_snapshot(&snapshot).await?;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.last_flush = Instant::now();
        inner.dirty = false;
        inner.flush_count += 1;
        metrics::counter!(m::DETECT_FLUSHES_TOTAL).increment(1);
        Ok(true)
    }

    /// 스냅샷을 임시 파일에 쓴 뒤 rename으로 교체합니다.
    async fn write_snapshot(&self, entries: &[Anomaly]) -> Result<(), DetectError> {
        let json = serde_json::to_vec(entries).map_err(|e| DetectError::Flush {
            path: self.output_path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DetectError::Flush {
                    path: self.output_path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let tmp_path = {
            let mut os = self.output_path.as_os_str().to_owned();
            os.push(".tmp");
            PathBuf::from(os)
        };

        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| DetectError::Flush {
                path: tmp_path.display().to_string(),
                reason: e.to_string(),
            })?;
        tokio::fs::rename(&tmp_path, &self.output_path)
            .await
            .map_err(|e| DetectError::Flush {
                path: self.output_path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            path = %self.output_path.display(),
            count = entries.len(),
            "anomalies flushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suriguard_core::types::Proto;

    fn make_anomaly(id: u64) -> Anomaly {
        Anomaly {
            timestamp: "2024-01-15T12:00:00Z".to_owned(),
            flow_id: id.to_string(),
            src_ip: "192.168.1.10".to_owned(),
            dst_ip: "10.0.0.5".to_owned(),
            proto: Proto::Tcp,
            packets: 180,
            bytes: 70_000,
            duration: 2.0,
            score: -0.12,
        }
    }

    fn temp_store(capacity: usize, flush_interval_secs: u64) -> (tempfile::TempDir, AnomalyStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anomalies.json");
        let store = AnomalyStore::new(capacity, path, flush_interval_secs);
        (dir, store)
    }

    #[test]
    fn insert_and_snapshot_preserve_order() {
        let (_dir, store) = temp_store(100, 5);
        for i in 0..5 {
            store.insert(make_anomaly(i));
        }
        let snapshot = store.snapshot(100);
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].flow_id, "0");
        assert_eq!(snapshot[4].flow_id, "4");
    }

    #[test]
    fn snapshot_limit_returns_most_recent() {
        let (_dir, store) = temp_store(100, 5);
        for i in 0..10 {
            store.insert(make_anomaly(i));
        }
        let snapshot = store.snapshot(3);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].flow_id, "7");
        assert_eq!(snapshot[2].flow_id, "9");
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let (_dir, store) = temp_store(1000, 5);
        for i in 0..1100 {
            store.insert(make_anomaly(i));
        }
        assert_eq!(store.len(), 1000);
        assert_eq!(store.evicted_count(), 100);
        assert_eq!(store.total_inserted(), 1100);

        let snapshot = store.snapshot(usize::MAX);
        assert_eq!(snapshot.len(), 1000);
        // 최신 1000개만 남고, 가장 오래된 100개가 제거됨
        assert_eq!(snapshot[0].flow_id, "100");
        assert_eq!(snapshot[999].flow_id, "1099");
    }

    #[test]
    fn eviction_reported_by_insert() {
        let (_dir, store) = temp_store(2, 5);
        assert!(!store.insert(make_anomaly(1)));
        assert!(!store.insert(make_anomaly(2)));
        assert!(store.insert(make_anomaly(3)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn utilization_calculation() {
        let (_dir, store) = temp_store(100, 5);
        assert_eq!(store.utilization(), 0.0);
        for i in 0..50 {
            store.insert(make_anomaly(i));
        }
        let util = store.utilization();
        assert!(util > 0.49 && util < 0.51);
    }

    #[tokio::test]
    async fn flush_debounce_single_write_reflects_both_inserts() {
        let (_dir, store) = temp_store(100, 5);
        let t0 = Instant::now();

        store.insert(make_anomaly(1));
        // 1초 뒤 두 번째 삽입: 아직 플러시 간격 미경과
        store.insert(make_anomaly(2));
        assert!(!store.maybe_flush_at(t0 + Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.flush_count(), 0);

        // 간격 경과 후 첫 플러시: 두 엔트리 모두 반영된 단일 기록
        assert!(store.maybe_flush_at(t0 + Duration::from_secs(6)).await.unwrap());
        assert_eq!(store.flush_count(), 1);

        let written = std::fs::read(store.output_path.as_path()).unwrap();
        let parsed: Vec<Anomaly> = serde_json::from_slice(&written).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].flow_id, "1");
        assert_eq!(parsed[1].flow_id, "2");
    }

    #[tokio::test]
    async fn flush_skipped_when_clean() {
        let (_dir, store) = temp_store(100, 5);
        let t0 = Instant::now();

        // 변경된 내용이 없으면 간격이 지나도 기록하지 않음
        assert!(!store.maybe_flush_at(t0 + Duration::from_secs(60)).await.unwrap());

        store.insert(make_anomaly(1));
        assert!(store.maybe_flush_at(t0 + Duration::from_secs(60)).await.unwrap());
        // 같은 내용으로 다시 호출해도 재기록 없음
        assert!(!store.maybe_flush_at(t0 + Duration::from_secs(120)).await.unwrap());
        assert_eq!(store.flush_count(), 1);
    }

    #[tokio::test]
    async fn flush_now_ignores_debounce() {
        let (_dir, store) = temp_store(100, 3600);
        store.insert(make_anomaly(7));
        assert!(store.flush_now().await.unwrap());

        let written = std::fs::read(store.output_path.as_path()).unwrap();
        let parsed: Vec<Anomaly> = serde_json::from_slice(&written).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].flow_id, "7");
    }

    #[tokio::test]
    async fn flushed_file_is_valid_json_array() {
        let (_dir, store) = temp_store(100, 1);
        for i in 0..3 {
            store.insert(make_anomaly(i));
        }
        store.flush_now().await.unwrap();

        let written = std::fs::read_to_string(store.output_path.as_path()).unwrap();
        assert!(written.starts_with('['));
        let parsed: Vec<Anomaly> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].score, -0.12);
    }

    #[tokio::test]
    async fn flush_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("anomalies.json");
        let store = AnomalyStore::new(10, &path, 1);
        store.insert(make_anomaly(1));
        store.flush_now().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn flush_failure_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        // 출력 "경로"가 디렉토리이면 rename이 실패한다
        let path = dir.path().join("target");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let store = AnomalyStore::new(10, &path, 1);
        store.insert(make_anomaly(1));
        let result = store.flush_now().await;
        assert!(result.is_err());
        // 실패해도 인메모리 엔트리는 유지
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_readers_do_not_block_snapshot() {
        use std::sync::Arc;

        let (_dir, store) = temp_store(1000, 5);
        let store = Arc::new(store);
        for i in 0..100 {
            store.insert(make_anomaly(i));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let snapshot = store.snapshot(50);
                        assert!(snapshot.len() <= 50);
                    }
                })
            })
            .collect();

        // 읽기와 동시에 삽입
        for i in 100..200 {
            store.insert(make_anomaly(i));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 200);
    }
}
