//! # netstore
//!
//! TCP 기반 원격 파일 조각(fragment) 접근 프로토콜
//!
//! ## 핵심 특징
//! - **고정 바이너리 프레이밍**: 모든 정수 필드는 네트워크 바이트 순서
//! - **정확한 전송**: 부분 읽기/쓰기를 감추고 정확히 N 바이트를 보장
//! - **요청/응답 교대**: 파이프라이닝 없는 반이중 세션
//! - **범위 검증**: 실제 파일 크기 기준 offset/length 검증 및 clamp
//! - **스트리밍**: 고정 크기 버퍼로 조각을 나누어 전송

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod listing;
pub mod message;
pub mod prompt;
pub mod server;
pub mod stats;
pub mod transport;

pub use client::{Client, DownloadOutcome, FetchReply};
pub use config::{Config, Scheduling};
pub use error::{Error, Result};
pub use listing::{list_regular_files, Listing};
pub use message::{FetchRequest, RejectReason, Request, Response};
pub use server::{FetchDecision, Server, Session};
pub use stats::{RejectCounts, SessionStats, TransferStats};
pub use transport::ReadOutcome;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 6543;

/// 파일 목록 페이로드 최대 크기 (바이트)
pub const LISTING_MAX: usize = 1 << 24; // 16MB

/// 기본 스트리밍 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024; // 512KB

/// 파일 목록 구분자
pub const LISTING_SEPARATOR: u8 = b'|';

/// 경로 구분자 (파일 이름에 허용되지 않음)
pub const PATH_SEPARATOR: u8 = b'/';
