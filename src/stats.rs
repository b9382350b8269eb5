//! 세션 및 전송 통계

use std::time::{Duration, Instant};

use crate::message::RejectReason;

/// 서버 세션 통계
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// 처리한 요청 수
    pub requests: u64,

    /// Listing 응답 수
    pub listings: u64,

    /// 수락된 Fetch 수
    pub fetches_accepted: u64,

    /// 거부된 Fetch 수 (사유별)
    pub rejected: RejectCounts,

    /// 스트리밍한 조각 바이트 합계
    pub bytes_streamed: u64,

    /// 세션 시작 시각
    started_at: Instant,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            requests: 0,
            listings: 0,
            fetches_accepted: 0,
            rejected: RejectCounts::default(),
            bytes_streamed: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_listing(&mut self) {
        self.requests += 1;
        self.listings += 1;
    }

    pub fn record_reject(&mut self, reason: RejectReason) {
        self.requests += 1;
        match reason {
            RejectReason::BadFilename => self.rejected.bad_filename += 1,
            RejectReason::BadOffset => self.rejected.bad_offset += 1,
            RejectReason::ZeroLength => self.rejected.zero_length += 1,
        }
    }

    /// 거부된 Fetch 합계
    pub fn fetches_rejected(&self) -> u64 {
        self.rejected.total()
    }

    pub fn record_fragment(&mut self, bytes: u64) {
        self.requests += 1;
        self.fetches_accepted += 1;
        self.bytes_streamed += bytes;
    }

    /// 세션 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 평균 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        throughput(self.bytes_streamed, self.elapsed())
    }
}

/// 거부 사유별 횟수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectCounts {
    pub bad_filename: u64,
    pub bad_offset: u64,
    pub zero_length: u64,
}

impl RejectCounts {
    pub fn total(&self) -> u64 {
        self.bad_filename + self.bad_offset + self.zero_length
    }
}

/// 단일 조각 전송 통계
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    /// 전송 예정 바이트
    pub expected: u64,

    /// 실제 전송 바이트
    pub transferred: u64,

    started_at: Instant,
}

impl TransferStats {
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            transferred: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_chunk(&mut self, size: usize) {
        self.transferred += size as u64;
    }

    pub fn is_complete(&self) -> bool {
        self.transferred >= self.expected
    }

    /// 진행률 (0.0 ~ 1.0)
    pub fn progress(&self) -> f64 {
        if self.expected == 0 {
            return 1.0;
        }
        self.transferred as f64 / self.expected as f64
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        throughput(self.transferred, self.elapsed())
    }
}

/// bytes/sec, 경과 시간이 0이면 0
pub(crate) fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    bytes as f64 / elapsed.as_secs_f64()
}
