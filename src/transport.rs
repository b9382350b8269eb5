//! 신뢰성 있는 스트림 입출력
//!
//! 모든 상위 계층은 이 함수들만 통해 네트워크에 접근한다.
//! - 인터럽트(`Interrupted`)는 투명하게 재시도
//! - 요청한 바이트 수를 정확히 전송하거나 실패
//! - 바이트 하나라도 빠지면 세션 전체가 어긋남

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// `read_exact_optional` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 버퍼를 모두 채움
    Filled,

    /// 한 바이트도 받기 전에 상대가 연결을 닫음
    EndOfStream,
}

/// EOF 또는 버퍼가 찰 때까지 읽고 실제로 읽은 바이트 수 반환
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// 정확히 `buf.len()` 바이트 읽기
///
/// 상대가 중간에 연결을 닫으면 `ShortRead`.
pub async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let got = read_full(reader, buf).await?;
    if got < buf.len() {
        return Err(Error::ShortRead {
            expected: buf.len(),
            got,
        });
    }
    Ok(())
}

/// `read_exact`와 같지만 0 바이트 상태에서의 정상 종료를 구분
///
/// 요청 루프의 깔끔한 종료 감지에만 사용한다. 일부만 받고 끊기면 여전히 `ShortRead`.
pub async fn read_exact_optional<R>(reader: &mut R, buf: &mut [u8]) -> Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    let got = read_full(reader, buf).await?;
    if got == 0 && !buf.is_empty() {
        return Ok(ReadOutcome::EndOfStream);
    }
    if got < buf.len() {
        return Err(Error::ShortRead {
            expected: buf.len(),
            got,
        });
    }
    Ok(ReadOutcome::Filled)
}

/// 정확히 `buf.len()` 바이트 쓰기
pub async fn write_exact<W>(writer: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]).await {
            Ok(0) => {
                return Err(Error::ShortWrite {
                    expected: buf.len(),
                    written,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}
