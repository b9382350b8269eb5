//! 프로토콜 메시지 정의
//!
//! 요청 2종 (List, Fetch) + 응답 3종 (Listing, Reject, Accept).
//! 태그 필드가 뒤따르는 고정 필드 개수를 결정한다.
//!
//! | 메시지 | 레이아웃 |
//! |---|---|
//! | List 요청 | u16 tag=1 |
//! | Fetch 요청 | u16 tag=2, u32 offset, u32 length, u16 fnamelen, u8[fnamelen] |
//! | Listing 응답 | u16 tag=1, u32 payloadlen, u8[payloadlen] |
//! | Reject 응답 | u16 tag=2, u32 reason |
//! | Accept 응답 | u16 tag=3, u32 fragmentlen (이후 데이터 스트리밍) |

use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{self, U16_LEN, U32_LEN};
use crate::transport;
use crate::{Error, Result, LISTING_MAX};

/// 요청 태그
pub mod request_tag {
    pub const LIST: u16 = 1;
    pub const FETCH: u16 = 2;
}

/// 응답 태그
pub mod response_tag {
    pub const LISTING: u16 = 1;
    pub const REJECT: u16 = 2;
    pub const ACCEPT: u16 = 3;
}

/// Fetch 거부 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RejectReason {
    /// 경로 구분자 포함, 열기 실패, 일반 파일 아님
    BadFilename = 1,

    /// offset이 파일 끝 이상
    BadOffset = 2,

    /// 요청 길이 0
    ZeroLength = 3,
}

impl RejectReason {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for RejectReason {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        match code {
            1 => Ok(RejectReason::BadFilename),
            2 => Ok(RejectReason::BadOffset),
            3 => Ok(RejectReason::ZeroLength),
            other => Err(Error::UnknownRejectReason(other)),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::BadFilename => "bad filename",
            RejectReason::BadOffset => "bad offset",
            RejectReason::ZeroLength => "zero length",
        };
        f.write_str(text)
    }
}

/// 파일 조각 요청
///
/// 파일 이름은 종료 문자 없는 원시 바이트이며 최대 65535 바이트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// 시작 위치 (바이트)
    pub offset: u32,

    /// 요청 길이 (바이트)
    pub length: u32,

    /// 원격 파일 이름
    pub filename: Bytes,
}

impl FetchRequest {
    pub fn new(filename: impl Into<Bytes>, offset: u32, length: u32) -> Result<Self> {
        let filename = filename.into();
        if filename.len() > u16::MAX as usize {
            return Err(Error::FilenameTooLong(filename.len()));
        }
        Ok(Self {
            offset,
            length,
            filename,
        })
    }

    /// 와이어 상의 파일 이름 길이
    pub fn filename_len(&self) -> Result<u16> {
        u16::try_from(self.filename.len()).map_err(|_| Error::FilenameTooLong(self.filename.len()))
    }

    /// 로그용 파일 이름
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.filename).into_owned()
    }
}

/// 클라이언트 → 서버 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Fetch(FetchRequest),
}

impl Request {
    pub fn tag(&self) -> u16 {
        match self {
            Request::List => request_tag::LIST,
            Request::Fetch(_) => request_tag::FETCH,
        }
    }

    /// 바이트로 직렬화
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        codec::put_u16(buf, self.tag());
        if let Request::Fetch(fetch) = self {
            let filename_len = fetch.filename_len()?;
            buf.reserve(2 * U32_LEN + U16_LEN + fetch.filename.len());
            codec::put_u32(buf, fetch.offset);
            codec::put_u32(buf, fetch.length);
            codec::put_u16(buf, filename_len);
            buf.extend_from_slice(&fetch.filename);
        }
        Ok(())
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        transport::write_exact(writer, &buf).await
    }

    /// 요청 하나 읽기
    ///
    /// 요청 경계에서 연결이 정상 종료되면 `None`. 알 수 없는 태그는 스트림 손상으로 간주.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Request>>
    where
        R: AsyncRead + Unpin,
    {
        let tag = match codec::read_u16_optional(reader).await? {
            Some(tag) => tag,
            None => return Ok(None),
        };

        match tag {
            request_tag::LIST => Ok(Some(Request::List)),
            request_tag::FETCH => {
                let offset = codec::read_u32(reader).await?;
                let length = codec::read_u32(reader).await?;
                let filename_len = codec::read_u16(reader).await? as usize;

                let mut filename = vec![0u8; filename_len];
                transport::read_exact(reader, &mut filename).await?;

                Ok(Some(Request::Fetch(FetchRequest {
                    offset,
                    length,
                    filename: Bytes::from(filename),
                })))
            }
            other => Err(Error::UnknownRequest(other)),
        }
    }
}

/// 서버 → 클라이언트 응답
///
/// `Accept`는 조각 길이만 약속하며, 데이터는 응답 직후 별도로 스트리밍된다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Listing(Bytes),
    Reject(RejectReason),
    Accept { fragment_len: u32 },
}

impl Response {
    pub fn tag(&self) -> u16 {
        match self {
            Response::Listing(_) => response_tag::LISTING,
            Response::Reject(_) => response_tag::REJECT,
            Response::Accept { .. } => response_tag::ACCEPT,
        }
    }

    /// 바이트로 직렬화
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        codec::put_u16(buf, self.tag());
        match self {
            Response::Listing(payload) => {
                let len = u32::try_from(payload.len()).map_err(|_| Error::ListingTooLarge {
                    size: payload.len(),
                    max: LISTING_MAX,
                })?;
                buf.reserve(U32_LEN + payload.len());
                codec::put_u32(buf, len);
                buf.extend_from_slice(payload);
            }
            Response::Reject(reason) => codec::put_u32(buf, reason.code()),
            Response::Accept { fragment_len } => codec::put_u32(buf, *fragment_len),
        }
        Ok(())
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        transport::write_exact(writer, &buf).await
    }

    /// 응답 하나 읽기
    ///
    /// `listing_limit`보다 큰 Listing 페이로드는 할당 전에 거부한다.
    pub async fn read_from<R>(reader: &mut R, listing_limit: usize) -> Result<Response>
    where
        R: AsyncRead + Unpin,
    {
        let tag = codec::read_u16(reader).await?;
        match tag {
            response_tag::LISTING => {
                let len = codec::read_u32(reader).await? as usize;
                if len > listing_limit {
                    return Err(Error::ListingTooLarge {
                        size: len,
                        max: listing_limit,
                    });
                }
                let mut payload = vec![0u8; len];
                transport::read_exact(reader, &mut payload).await?;
                Ok(Response::Listing(Bytes::from(payload)))
            }
            response_tag::REJECT => {
                let code = codec::read_u32(reader).await?;
                Ok(Response::Reject(RejectReason::try_from(code)?))
            }
            response_tag::ACCEPT => {
                let fragment_len = codec::read_u32(reader).await?;
                Ok(Response::Accept { fragment_len })
            }
            other => Err(Error::UnexpectedResponse(other)),
        }
    }
}
