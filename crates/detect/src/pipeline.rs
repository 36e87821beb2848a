//! 파이프라인 오케스트레이션 -- 테일링/파싱/스코어링/저장의 전체 흐름을 관리합니다.
//!
//! [`DetectPipeline`]은 core의 [`Pipeline`](suriguard_core::pipeline::Pipeline)
//! trait을 구현하여 `suriguard-daemon`에서 생명주기(start/stop/health_check)로
//! 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileTailer -> EveParser -> FeatureExtractor -> Scorer -> AnomalyStore -> flush
//! ```
//!
//! 쓰기는 producer 태스크 하나에서만 일어나고, 외부 소비자(API 등)는
//! [`DetectPipeline::store`]로 얻은 핸들로 동시에 스냅샷을 읽습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use suriguard_core::error::{PipelineError, SuriguardError};
use suriguard_core::metrics as m;
use suriguard_core::pipeline::{HealthStatus, Pipeline, Scorer};
use suriguard_core::types::Anomaly;

use crate::config::DetectConfig;
use crate::error::DetectError;
use crate::features::FeatureExtractor;
use crate::parser::EveParser;
use crate::store::AnomalyStore;
use crate::tailer::FileTailer;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 처리 카운터 (producer 태스크가 증가, 외부에서 읽기)
#[derive(Debug, Default)]
struct PipelineStats {
    /// 수집된 전체 라인 수
    lines_collected: AtomicU64,
    /// 스코어링까지 완료된 플로우 이벤트 수
    flows_processed: AtomicU64,
    /// 파싱 실패 라인 수
    parse_errors: AtomicU64,
    /// 스코어링 실패 이벤트 수
    score_errors: AtomicU64,
    /// 탐지된 이상 플로우 수
    anomalies: AtomicU64,
}

/// 탐지 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use suriguard_detect::{DetectPipelineBuilder, IsolationForestScorer};
///
/// let scorer = IsolationForestScorer::load(&model_path, columns_path).await?;
/// let mut pipeline = DetectPipelineBuilder::new()
///     .config(config)
///     .scorer(Arc::new(scorer))
///     .build()?;
///
/// pipeline.start().await?;
/// let snapshot = pipeline.store().snapshot(50);
/// ```
pub struct DetectPipeline {
    /// 파이프라인 설정
    config: DetectConfig,
    /// 현재 상태
    state: PipelineState,
    /// 스코어러 (로드된 모델)
    scorer: Arc<dyn Scorer>,
    /// 피처 추출기 (스코어러 스키마에 맞춰 구성)
    extractor: Arc<FeatureExtractor>,
    /// 이상 저장소 (외부 읽기 공유)
    store: Arc<AnomalyStore>,
    /// 처리 카운터
    stats: Arc<PipelineStats>,
    /// 종료 시그널
    shutdown: CancellationToken,
    /// 백그라운드 태스크 핸들
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl DetectPipeline {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 이상 저장소 핸들을 반환합니다.
    ///
    /// 반환된 핸들의 [`snapshot`](AnomalyStore::snapshot)은 파이프라인
    /// 실행과 동시에 여러 컨텍스트에서 호출해도 안전합니다.
    pub fn store(&self) -> Arc<AnomalyStore> {
        Arc::clone(&self.store)
    }

    /// 스코어링까지 완료된 플로우 이벤트 수를 반환합니다.
    pub fn processed_count(&self) -> u64 {
        self.stats.flows_processed.load(Ordering::Relaxed)
    }

    /// 파싱 실패 라인 수를 반환합니다.
    pub fn parse_error_count(&self) -> u64 {
        self.stats.parse_errors.load(Ordering::Relaxed)
    }

    /// 스코어링 실패 이벤트 수를 반환합니다.
    pub fn score_error_count(&self) -> u64 {
        self.stats.score_errors.load(Ordering::Relaxed)
    }

    /// 탐지된 이상 플로우 수를 반환합니다.
    pub fn anomaly_count(&self) -> u64 {
        self.stats.anomalies.load(Ordering::Relaxed)
    }

    /// 수집된 전체 라인 수를 반환합니다.
    pub fn lines_collected(&self) -> u64 {
        self.stats.lines_collected.load(Ordering::Relaxed)
    }

    /// 사용 중인 스코어러 이름을 반환합니다.
    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }
}

impl Pipeline for DetectPipeline {
    async fn start(&mut self) -> Result<(), SuriguardError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(
            eve_path = %self.config.eve_path,
            scorer = self.scorer.name(),
            columns = ?self.scorer.feature_columns(),
            "starting detection pipeline"
        );

        // 재시작 지원: 이전 stop에서 취소된 토큰을 교체
        self.shutdown = CancellationToken::new();

        let tailer = FileTailer::new(&self.config.eve_path)
            .with_max_line_bytes(self.config.max_line_bytes);
        let parser = EveParser::new().with_max_input_size(self.config.max_line_bytes);

        let task = tokio::spawn(run_loop(
            tailer,
            parser,
            Arc::clone(&self.extractor),
            Arc::clone(&self.scorer),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            self.shutdown.clone(),
            Duration::from_millis(self.config.poll_interval_ms),
        ));
        self.tasks.push(task);

        self.state = PipelineState::Running;
        tracing::info!("detection pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SuriguardError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping detection pipeline");

        // 처리 중인 주기가 끝나고 마지막 플러시가 완료될 때까지 대기
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "detection task terminated abnormally");
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!(
            lines = self.lines_collected(),
            flows = self.processed_count(),
            anomalies = self.anomaly_count(),
            parse_errors = self.parse_error_count(),
            "detection pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let utilization = self.store.utilization();
                if utilization > 0.9 {
                    HealthStatus::Degraded(format!(
                        "anomaly store utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// producer 태스크 본체 — 타이머 wake-up마다 한 주기를 처리합니다.
#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut tailer: FileTailer,
    parser: EveParser,
    extractor: Arc<FeatureExtractor>,
    scorer: Arc<dyn Scorer>,
    store: Arc<AnomalyStore>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
    poll_interval: Duration,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                // 종료 전 마지막 플러시 시도
                if let Err(e) = store.flush_now().await {
                    tracing::warn!(error = %e, "final anomaly flush failed");
                }
                tracing::debug!("detection loop shutting down");
                break;
            }
            _ = interval.tick() => {
                match tailer.poll().await {
                    Ok(lines) => {
                        if !lines.is_empty() {
                            stats
                                .lines_collected
                                .fetch_add(lines.len() as u64, Ordering::Relaxed);
                            metrics::counter!(m::DETECT_LINES_COLLECTED_TOTAL)
                                .increment(lines.len() as u64);
                        }
                        for line in &lines {
                            process_line(line, &parser, &extractor, scorer.as_ref(), &store, &stats);
                        }
                    }
                    Err(e) => {
                        // 이번 주기는 "새 데이터 없음"으로 취급하고 다음 주기에 재시도
                        tracing::warn!(
                            path = %tailer.path().display(),
                            error = %e,
                            "failed to read watched file"
                        );
                    }
                }

                if let Err(e) = store.maybe_flush().await {
                    tracing::warn!(error = %e, "anomaly flush failed, will retry next cycle");
                }
            }
        }
    }
}

/// 라인 하나를 처리합니다. 모든 실패는 해당 라인에 격리됩니다.
fn process_line(
    line: &bytes::Bytes,
    parser: &EveParser,
    extractor: &FeatureExtractor,
    scorer: &dyn Scorer,
    store: &AnomalyStore,
    stats: &PipelineStats,
) {
    let record = match parser.parse(line) {
        Ok(Some(record)) => record,
        Ok(None) => return, // flow가 아닌 이벤트
        Err(e) => {
            stats.parse_errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::DETECT_PARSE_ERRORS_TOTAL).increment(1);
            tracing::debug!(error = %e, "skipping malformed line");
            return;
        }
    };

    let features = extractor.features(&record);
    let vector = extractor.vector(&features);

    let score = match scorer.score(&vector) {
        Ok(score) => score,
        Err(e) => {
            stats.score_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, flow_id = %record.flow_id, "scoring failed");
            return;
        }
    };

    stats.flows_processed.fetch_add(1, Ordering::Relaxed);
    metrics::counter!(m::DETECT_FLOWS_PROCESSED_TOTAL).increment(1);

    if score < 0.0 {
        let anomaly = Anomaly {
            timestamp: record.timestamp.clone(),
            flow_id: record.flow_id.clone(),
            src_ip: record.src_ip.clone(),
            dst_ip: record.dst_ip.clone(),
            proto: record.proto,
            packets: record.total_packets(),
            bytes: record.total_bytes(),
            duration: features.duration,
            score,
        };
        tracing::info!(
            score,
            src_ip = %anomaly.src_ip,
            dst_ip = %anomaly.dst_ip,
            proto = %anomaly.proto,
            "anomalous flow detected"
        );
        store.insert(anomaly);
        stats.anomalies.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            m::DETECT_ANOMALIES_TOTAL,
            m::LABEL_PROTOCOL => record.proto.to_string()
        )
        .increment(1);
    }
}

/// 탐지 파이프라인 빌더
///
/// 스코어러가 선언한 피처 스키마로 추출기를 구성하고,
/// 기동 시점에 스키마 유효성을 검증합니다.
pub struct DetectPipelineBuilder {
    config: DetectConfig,
    scorer: Option<Arc<dyn Scorer>>,
}

impl DetectPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: DetectConfig::default(),
            scorer: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: DetectConfig) -> Self {
        self.config = config;
        self
    }

    /// 스코어러를 지정합니다 (필수).
    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// # Errors
    ///
    /// - 설정 검증 실패
    /// - 스코어러 미지정
    /// - 스코어러가 선언한 컬럼 중 추출 불가능한 이름이 있는 경우
    pub fn build(self) -> Result<DetectPipeline, DetectError> {
        self.config.validate()?;

        let Some(scorer) = self.scorer else {
            return Err(DetectError::Config {
                field: "scorer".to_owned(),
                reason: "a scorer must be provided".to_owned(),
            });
        };

        // 스코어러 스키마 기준으로 추출기를 구성 → 벡터 순서 불일치가
        // 구조적으로 불가능해진다. 알 수 없는 컬럼은 여기서 거부.
        let extractor = FeatureExtractor::new(scorer.feature_columns().to_vec())?;

        let store = Arc::new(AnomalyStore::new(
            self.config.store_capacity,
            &self.config.output_path,
            self.config.flush_interval_secs,
        ));

        Ok(DetectPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            scorer,
            extractor: Arc::new(extractor),
            store,
            stats: Arc::new(PipelineStats::default()),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl Default for DetectPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
