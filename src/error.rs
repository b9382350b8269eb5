//! 에러 타입 정의

use thiserror::Error;

use crate::message::RejectReason;

/// netstore 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("불완전한 데이터 수신: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("불완전한 데이터 송신: expected {expected} bytes, written {written}")]
    ShortWrite { expected: usize, written: usize },

    #[error("알 수 없는 요청 타입: {0}")]
    UnknownRequest(u16),

    #[error("예상하지 못한 응답 타입: {0}")]
    UnexpectedResponse(u16),

    #[error("알 수 없는 거부 사유: {0}")]
    UnknownRejectReason(u32),

    #[error("파일 목록 크기 초과: {size} bytes (max {max})")]
    ListingTooLarge { size: usize, max: usize },

    #[error("파일 이름이 너무 김: {0} bytes")]
    FilenameTooLong(usize),

    #[error("요청 거부됨: {0}")]
    Rejected(RejectReason),

    #[error("유효하지 않은 파일 이름: {0}")]
    InvalidFilename(String),

    #[error("유효하지 않은 범위: offset={offset}, end={end}")]
    InvalidRange { offset: u32, end: u32 },

    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    #[error("입력 종료")]
    InputClosed,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 상대가 메시지 도중 연결을 닫은 경우
    pub fn is_short_transfer(&self) -> bool {
        matches!(self, Error::ShortRead { .. } | Error::ShortWrite { .. })
    }

    /// 스트림 손상 또는 프로토콜 위반
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::UnknownRequest(_)
                | Error::UnexpectedResponse(_)
                | Error::UnknownRejectReason(_)
                | Error::ListingTooLarge { .. }
                | Error::FilenameTooLong(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
