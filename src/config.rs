//! 프로토콜 설정

use std::path::PathBuf;

use tokio::sync::Semaphore;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, LISTING_MAX};

/// 연결 처리 스케줄링 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduling {
    /// 한 연결을 끝까지 처리한 뒤 다음 연결을 수락
    #[default]
    Sequential,

    /// 연결마다 독립 태스크 (공유 가변 상태 없음)
    Concurrent,
}

/// netstore 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 스트리밍 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 파일 목록 페이로드 최대 크기 (바이트)
    pub listing_limit: usize,

    /// 연결 스케줄링 정책
    pub scheduling: Scheduling,

    /// 동시 세션 최대 수 (Concurrent 전용)
    pub max_sessions: usize,

    /// 클라이언트 다운로드 저장 디렉토리
    pub staging_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            listing_limit: LISTING_MAX,
            scheduling: Scheduling::Sequential,
            max_sessions: 128,
            staging_dir: PathBuf::from("tmp"),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 순차 처리 설정 (기본값과 동일)
    pub fn sequential() -> Self {
        Self::default()
    }

    /// 연결별 동시 처리 설정
    pub fn concurrent() -> Self {
        Self {
            scheduling: Scheduling::Concurrent,
            ..Self::default()
        }
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.listing_limit > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "listing_limit {} exceeds u32 range",
                self.listing_limit
            )));
        }
        if self.scheduling == Scheduling::Concurrent {
            if self.max_sessions == 0 {
                return Err(Error::InvalidConfig("max_sessions must be > 0".into()));
            }
            // 종료 시 acquire_many(u32)로 세션 전부를 기다린다
            let max = Semaphore::MAX_PERMITS.min(u32::MAX as usize);
            if self.max_sessions > max {
                return Err(Error::InvalidConfig(format!(
                    "max_sessions {} exceeds {}",
                    self.max_sessions, max
                )));
            }
        }
        Ok(())
    }
}
