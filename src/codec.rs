//! 고정 폭 정수 필드 프레이밍
//!
//! 모든 메시지는 네트워크 바이트 순서(big-endian)의 u16/u32 필드로 구성된다.
//! 인코딩/디코딩 자체는 실패하지 않으며, 에러는 하위 입출력 계층에서만 발생한다.

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::transport::{self, ReadOutcome};
use crate::Result;

/// u16 필드 크기
pub const U16_LEN: usize = 2;

/// u32 필드 크기
pub const U32_LEN: usize = 4;

/// u16 필드 추가
pub fn put_u16<B: BufMut>(buf: &mut B, value: u16) {
    buf.put_u16(value);
}

/// u32 필드 추가
pub fn put_u32<B: BufMut>(buf: &mut B, value: u32) {
    buf.put_u32(value);
}

/// u16 필드 디코딩
pub fn get_u16(bytes: [u8; U16_LEN]) -> u16 {
    (&bytes[..]).get_u16()
}

/// u32 필드 디코딩
pub fn get_u32(bytes: [u8; U32_LEN]) -> u32 {
    (&bytes[..]).get_u32()
}

pub async fn read_u16<R>(reader: &mut R) -> Result<u16>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; U16_LEN];
    transport::read_exact(reader, &mut bytes).await?;
    Ok(get_u16(bytes))
}

/// 요청 경계에서의 정상 종료면 `None`
pub async fn read_u16_optional<R>(reader: &mut R) -> Result<Option<u16>>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; U16_LEN];
    match transport::read_exact_optional(reader, &mut bytes).await? {
        ReadOutcome::Filled => Ok(Some(get_u16(bytes))),
        ReadOutcome::EndOfStream => Ok(None),
    }
}

pub async fn read_u32<R>(reader: &mut R) -> Result<u32>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; U32_LEN];
    transport::read_exact(reader, &mut bytes).await?;
    Ok(get_u32(bytes))
}

pub async fn write_u16<W>(writer: &mut W, value: u16) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    transport::write_exact(writer, &value.to_be_bytes()).await
}

pub async fn write_u32<W>(writer: &mut W, value: u32) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    transport::write_exact(writer, &value.to_be_bytes()).await
}
