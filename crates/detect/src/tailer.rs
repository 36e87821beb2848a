//! 파일 테일러 — eve 로그 증분 읽기
//!
//! 감시 파일에 추가된 완결 라인만 바이트 오프셋 기준으로 읽어 전달합니다.
//! `tail -f`와 유사한 동작을 비동기 방식으로 구현합니다.
//!
//! # 로테이션/축소 감지
//! - inode 변경 감지 (logrotate 등, Unix 전용)
//! - 파일 크기 축소 감지 (truncation)
//! - 두 경우 모두 오프셋을 0으로 리셋하고 새 내용을 처음부터 다시 읽음
//!
//! # 트리거 계약
//! [`FileTailer::poll`]은 호출 주기에 대해 아무 가정도 하지 않습니다.
//! 파이프라인은 타이머로 호출하지만, 파일 변경 알림 기반 호출자가
//! 자체 스케줄로 호출해도 동일하게 동작합니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use suriguard_core::metrics as m;

use crate::error::DetectError;

/// 감시 파일 하나의 추적 상태
///
/// [`FileTailer`]만 이 상태를 변경합니다.
/// 불변식: `offset`은 마지막으로 관측한 파일 크기를 넘지 않습니다.
#[derive(Debug)]
pub struct TailState {
    /// 감시 파일 경로
    path: PathBuf,
    /// 마지막으로 소비한 바이트 오프셋 (완결 라인 끝)
    offset: u64,
    /// 마지막으로 관측한 파일 크기
    last_size: u64,
    /// 현재 파일의 inode (Unix 전용 identity marker)
    #[cfg(unix)]
    inode: Option<u64>,
    /// 첫 poll 수행 여부
    initialized: bool,
}

/// 파일 테일러
///
/// 지정된 파일의 새 완결 라인을 오프셋 기반으로 읽어 반환합니다.
/// 라인 끝 `\n`이 없는 꼬리 부분은 오프셋을 전진시키지 않는 방식으로
/// 보류되어 다음 poll에서 다시 시도됩니다.
pub struct FileTailer {
    /// 추적 상태
    state: TailState,
    /// 한 라인의 최대 길이 (바이트). 초과 라인은 건너뜀
    max_line_bytes: usize,
    /// truncation/rotation으로 인한 오프셋 리셋 횟수
    reset_count: u64,
    /// 길이 초과로 건너뛴 라인 수
    oversized_count: u64,
}

impl FileTailer {
    /// 오프셋 0에서 시작하는 테일러를 생성합니다.
    ///
    /// 프로세스 재시작 시 파일을 처음부터 다시 읽습니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_offset(path, 0)
    }

    /// 외부에서 영속화한 오프셋으로 시작하는 테일러를 생성합니다.
    ///
    /// 호출자가 재시작 간 오프셋을 보존하는 경우 사용합니다.
    /// 시드된 오프셋이 현재 파일 크기보다 크면 첫 poll에서
    /// truncation으로 간주되어 0으로 리셋됩니다.
    pub fn with_offset(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            state: TailState {
                path: path.into(),
                offset,
                last_size: 0,
                #[cfg(unix)]
                inode: None,
                initialized: false,
            },
            max_line_bytes: 1024 * 1024,
            reset_count: 0,
            oversized_count: 0,
        }
    }

    /// 한 라인의 최대 길이를 설정합니다.
    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    /// 감시 파일 경로를 반환합니다.
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// 현재 오프셋을 반환합니다.
    pub fn offset(&self) -> u64 {
        self.state.offset
    }

    /// 오프셋 리셋 횟수를 반환합니다.
    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    /// 길이 초과로 건너뛴 라인 수를 반환합니다.
    pub fn oversized_count(&self) -> u64 {
        self.oversized_count
    }

    /// 한 번의 wake-up 주기를 수행합니다.
    ///
    /// 오프셋 이후에 추가된 완결 라인들을 파일 순서대로 반환합니다.
    /// 새 데이터가 없으면 빈 Vec을 반환합니다.
    ///
    /// # Errors
    ///
    /// 파일 메타데이터 조회나 읽기가 실패하면 `DetectError::Io`를
    /// 반환합니다. 호출자는 이를 "이번 주기에는 새 데이터 없음"으로
    /// 취급하고 다음 주기에 재시도해야 합니다 (오프셋은 변경되지 않음).
    pub async fn poll(&mut self) -> Result<Vec<Bytes>, DetectError> {
        if !self.state.initialized {
            self.ensure_file_exists().await?;
            self.state.initialized = true;
        }

        let meta = tokio::fs::metadata(&self.state.path).await?;
        let size = meta.len();

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let inode = meta.ino();
            if let Some(prev) = self.state.inode
                && prev != inode
            {
                tracing::warn!(
                    path = %self.state.path.display(),
                    "watched file rotated (inode changed), resetting offset"
                );
                self.reset_offset();
            }
            self.state.inode = Some(inode);
        }

        if size < self.state.offset {
            tracing::warn!(
                path = %self.state.path.display(),
                size,
                offset = self.state.offset,
                "watched file truncated, resetting offset"
            );
            self.reset_offset();
        }

        if size == self.state.offset {
            self.state.last_size = size;
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.state.path).await?;
        file.seek(SeekFrom::Start(self.state.offset)).await?;

        let to_read = size - self.state.offset;
        let mut buf = Vec::with_capacity(usize::try_from(to_read).unwrap_or(0));
        file.take(to_read).read_to_end(&mut buf).await?;

        // 마지막 `\n` 이후의 미완결 라인은 보류: 오프셋을 전진시키지 않으면
        // 다음 poll에서 같은 바이트가 다시 읽힌다.
        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            self.state.last_size = size;
            return Ok(Vec::new());
        };
        let consumed = last_newline + 1;

        let mut lines = Vec::new();
        for raw in buf[..consumed].split(|&b| b == b'\n') {
            let line = match raw.last() {
                Some(b'\r') => &raw[..raw.len() - 1],
                _ => raw,
            };
            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_line_bytes {
                self.oversized_count += 1;
                tracing::warn!(
                    path = %self.state.path.display(),
                    length = line.len(),
                    max = self.max_line_bytes,
                    "skipping oversized line"
                );
                continue;
            }
            lines.push(Bytes::copy_from_slice(line));
        }

        self.state.offset += consumed as u64;
        self.state.last_size = size;
        Ok(lines)
    }

    /// 오프셋을 0으로 리셋합니다 (truncation/rotation 처리).
    fn reset_offset(&mut self) {
        self.state.offset = 0;
        self.reset_count += 1;
        metrics::counter!(m::DETECT_TAIL_RESETS_TOTAL).increment(1);
    }

    /// 감시 파일이 없으면 빈 파일로 생성합니다.
    async fn ensure_file_exists(&self) -> Result<(), DetectError> {
        if tokio::fs::try_exists(&self.state.path).await? {
            return Ok(());
        }

        tracing::warn!(
            path = %self.state.path.display(),
            "watched file does not exist, creating empty file"
        );

        if let Some(parent) = self.state.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // create(true)는 이미 존재하는 파일을 truncate하지 않는다
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state.path)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_log() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        (dir, path)
    }

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn creates_missing_file_on_first_poll() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);

        let lines = tailer.poll().await.unwrap();
        assert!(lines.is_empty());
        assert!(path.exists());
        assert_eq!(tailer.offset(), 0);
    }

    #[tokio::test]
    async fn reads_appended_lines_across_polls() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);
        tailer.poll().await.unwrap();

        append(&path, "one\ntwo\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("one"), Bytes::from("two")]);

        append(&path, "three\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("three")]);

        // 새 데이터 없음
        let lines = tailer.poll().await.unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn holds_back_partial_line_until_terminated() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);
        tailer.poll().await.unwrap();

        append(&path, "complete\npart");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("complete")]);
        let offset_after = tailer.offset();

        // 미완결 꼬리는 오프셋을 전진시키지 않음
        assert_eq!(offset_after, "complete\n".len() as u64);

        append(&path, "ial\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("partial")]);
    }

    #[tokio::test]
    async fn detects_truncation_and_reprocesses() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);
        tailer.poll().await.unwrap();

        append(&path, "first\nsecond\n");
        tailer.poll().await.unwrap();
        assert!(tailer.offset() > 0);

        // 더 짧은 내용으로 truncate (std::fs::write는 같은 파일을 자름)
        std::fs::write(&path, "new\n").unwrap();
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("new")]);
        assert_eq!(tailer.reset_count(), 1);
    }

    #[tokio::test]
    async fn detects_rotation_by_replacement() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);
        tailer.poll().await.unwrap();

        append(&path, "old-one\nold-two\n");
        tailer.poll().await.unwrap();

        // 새 파일로 교체 (rename은 새 inode를 만든다)
        let staged = path.with_extension("new");
        std::fs::write(&staged, "rotated\n").unwrap();
        std::fs::rename(&staged, &path).unwrap();

        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("rotated")]);
        assert!(tailer.reset_count() >= 1);
    }

    #[tokio::test]
    async fn skips_oversized_lines() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path).with_max_line_bytes(8);
        tailer.poll().await.unwrap();

        append(&path, "short\nway-too-long-line\nok\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("short"), Bytes::from("ok")]);
        assert_eq!(tailer.oversized_count(), 1);
    }

    #[tokio::test]
    async fn seeded_offset_skips_existing_content() {
        let (_dir, path) = temp_log();
        append(&path, "already-seen\n");

        let mut tailer = FileTailer::with_offset(&path, "already-seen\n".len() as u64);
        let lines = tailer.poll().await.unwrap();
        assert!(lines.is_empty());

        append(&path, "fresh\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("fresh")]);
    }

    #[tokio::test]
    async fn crlf_lines_are_trimmed() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);
        tailer.poll().await.unwrap();

        append(&path, "windows\r\nunix\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("windows"), Bytes::from("unix")]);
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let (_dir, path) = temp_log();
        let mut tailer = FileTailer::new(&path);
        tailer.poll().await.unwrap();

        append(&path, "a\n\n\nb\n");
        let lines = tailer.poll().await.unwrap();
        assert_eq!(lines, vec![Bytes::from("a"), Bytes::from("b")]);
    }
}
