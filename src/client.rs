//! 클라이언트 (수신측)
//!
//! - List 요청 한 번, Fetch 요청 한 번의 고정 2단계 진행
//! - 수락된 조각은 staging 디렉토리의 같은 이름 파일에 offset 위치부터 기록
//! - 기록 범위 밖의 기존 바이트는 그대로 유지

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::listing::{self, Listing};
use crate::message::{FetchRequest, RejectReason, Request, Response};
use crate::stats::{self, TransferStats};
use crate::transport;
use crate::{Config, Error, Result, PATH_SEPARATOR};

/// Fetch 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReply {
    /// 서버가 `fragment_len` 바이트를 이어서 보냄
    Accepted { fragment_len: u32 },

    Rejected(RejectReason),
}

/// 다운로드 결과
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// 기록한 로컬 파일 경로
    pub path: PathBuf,

    /// 기록 시작 위치
    pub offset: u32,

    /// 기록한 바이트 수 (서버가 알린 조각 길이)
    pub bytes_written: u64,

    pub elapsed: Duration,
}

impl DownloadOutcome {
    /// 수신 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        stats::throughput(self.bytes_written, self.elapsed)
    }
}

/// netstore 클라이언트
pub struct Client<S> {
    stream: S,
    config: Config,
}

impl Client<TcpStream> {
    /// 서버에 연결
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: Config) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to {}", stream.peer_addr()?);
        Ok(Self::new(stream, config))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: Config) -> Self {
        Self { stream, config }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn send(&mut self, request: &Request) -> Result<()> {
        request.write_to(&mut self.stream).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// 파일 목록 요청
    ///
    /// Listing 이외의 응답은 프로토콜 위반.
    pub async fn list(&mut self) -> Result<Listing> {
        self.send(&Request::List).await?;

        match Response::read_from(&mut self.stream, self.config.listing_limit).await? {
            Response::Listing(payload) => {
                debug!("Listing received: {} bytes", payload.len());
                Ok(Listing::from_payload(payload))
            }
            other => Err(Error::UnexpectedResponse(other.tag())),
        }
    }

    /// 조각 요청
    ///
    /// `Accepted`를 받으면 호출자는 반드시 `receive_fragment`로 데이터를 모두 읽어야 한다.
    pub async fn fetch(&mut self, request: &FetchRequest) -> Result<FetchReply> {
        self.send(&Request::Fetch(request.clone())).await?;

        match Response::read_from(&mut self.stream, self.config.listing_limit).await? {
            Response::Accept { fragment_len } => Ok(FetchReply::Accepted { fragment_len }),
            Response::Reject(reason) => Ok(FetchReply::Rejected(reason)),
            other => Err(Error::UnexpectedResponse(other.tag())),
        }
    }

    /// 알려진 길이만큼 조각 데이터를 `dest`로 복사
    pub async fn receive_fragment<W>(&mut self, fragment_len: u32, dest: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut transfer = TransferStats::new(u64::from(fragment_len));
        let mut left = fragment_len as usize;
        let mut buffer = vec![0u8; self.config.chunk_size.max(1).min(left)];

        while left > 0 {
            let chunk = left.min(buffer.len());
            let buf = &mut buffer[..chunk];
            transport::read_exact(&mut self.stream, buf).await?;
            transport::write_exact(&mut *dest, buf).await?;
            transfer.record_chunk(chunk);
            left -= chunk;
        }
        dest.flush().await?;

        debug!(
            "Fragment received: {} bytes ({:.1}%)",
            transfer.transferred,
            transfer.progress() * 100.0
        );
        Ok(transfer.transferred)
    }

    /// `[offset, end)` 조각을 받아 staging 디렉토리에 기록
    ///
    /// 서버 거부는 `Error::Rejected`로 반환.
    pub async fn download(&mut self, filename: &[u8], offset: u32, end: u32) -> Result<DownloadOutcome> {
        if end < offset {
            return Err(Error::InvalidRange { offset, end });
        }
        validate_staging_name(filename)?;

        let request = FetchRequest::new(Bytes::copy_from_slice(filename), offset, end - offset)?;
        let fragment_len = match self.fetch(&request).await? {
            FetchReply::Accepted { fragment_len } => fragment_len,
            FetchReply::Rejected(reason) => return Err(Error::Rejected(reason)),
        };

        let started = Instant::now();
        let (path, mut file) = open_staging_file(&self.config.staging_dir, filename, offset).await?;
        let bytes_written = self.receive_fragment(fragment_len, &mut file).await?;

        let outcome = DownloadOutcome {
            path,
            offset,
            bytes_written,
            elapsed: started.elapsed(),
        };
        info!(
            "Downloaded {} bytes into {:?} at offset {} ({:.2}s, {:.2} MB/s)",
            outcome.bytes_written,
            outcome.path,
            outcome.offset,
            outcome.elapsed.as_secs_f64(),
            outcome.throughput() / 1_000_000.0
        );
        Ok(outcome)
    }
}

/// staging 경로에 쓸 수 있는 이름인지 확인
fn validate_staging_name(filename: &[u8]) -> Result<()> {
    let bad = filename.is_empty()
        || filename == b"."
        || filename == b".."
        || filename.contains(&PATH_SEPARATOR);
    if bad {
        return Err(Error::InvalidFilename(
            String::from_utf8_lossy(filename).into_owned(),
        ));
    }
    Ok(())
}

/// staging 파일 열기
///
/// 디렉토리가 없으면 만들고, 파일은 잘라내지 않고 `offset`으로 이동한다.
pub async fn open_staging_file(
    staging_dir: &Path,
    filename: &[u8],
    offset: u32,
) -> Result<(PathBuf, File)> {
    validate_staging_name(filename)?;
    tokio::fs::create_dir_all(staging_dir).await?;

    let path = listing::name_to_path(staging_dir, filename);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .await?;
    file.seek(SeekFrom::Start(u64::from(offset))).await?;

    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Session;
    use crate::transport::tests::Trickle;
    use tokio::io::duplex;

    fn served_dir(name: &str, content: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        dir
    }

    fn client_for(served: &Path, config: Config) -> Client<tokio::io::DuplexStream> {
        let (client, server) = duplex(4096);
        tokio::spawn(Session::new(server, served, config.clone()).run());
        Client::new(client, config)
    }

    #[tokio::test]
    async fn test_list_and_download() {
        let content: Vec<u8> = (0..50).collect();
        let served = served_dir("data.bin", &content);
        let staging = tempfile::tempdir().unwrap();
        let config = Config {
            chunk_size: 16,
            staging_dir: staging.path().join("tmp"),
            ..Config::default()
        };

        let mut client = client_for(served.path(), config);
        let entries = client.list().await.unwrap().entries();
        assert_eq!(entries, vec![Bytes::from_static(b"data.bin")]);

        let outcome = client.download(b"data.bin", 10, 110).await.unwrap();
        assert_eq!(outcome.bytes_written, 40);
        assert!(outcome.throughput() >= 0.0);

        let written = std::fs::read(&outcome.path).unwrap();
        assert_eq!(written.len(), 50);
        assert_eq!(&written[10..], &content[10..50]);
        assert!(written[..10].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_download_preserves_existing_bytes() {
        let content: Vec<u8> = (0..50).collect();
        let served = served_dir("data.bin", &content);
        let staging = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("data.bin"), vec![0xFFu8; 60]).unwrap();

        let config = Config {
            staging_dir: staging.path().to_path_buf(),
            ..Config::default()
        };
        let mut client = client_for(served.path(), config);
        client.download(b"data.bin", 20, 30).await.unwrap();

        let written = std::fs::read(staging.path().join("data.bin")).unwrap();
        assert_eq!(written.len(), 60);
        assert!(written[..20].iter().all(|&b| b == 0xFF));
        assert_eq!(&written[20..30], &content[20..30]);
        assert!(written[30..].iter().all(|&b| b == 0xFF));
    }

    #[tokio::test]
    async fn test_download_rejected() {
        let served = served_dir("data.bin", b"0123456789");
        let staging = tempfile::tempdir().unwrap();
        let config = Config {
            staging_dir: staging.path().join("tmp"),
            ..Config::default()
        };
        let mut client = client_for(served.path(), config);

        let err = client.download(b"data.bin", 10, 20).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(RejectReason::BadOffset)));

        let err = client.download(b"data.bin", 3, 3).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(RejectReason::ZeroLength)));

        let err = client.download(b"nope", 0, 1).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(RejectReason::BadFilename)));

        // 거부된 경우 staging 파일을 만들지 않음
        assert!(!staging.path().join("tmp").exists());
    }

    #[tokio::test]
    async fn test_fetch_slash_name_rejected_by_server() {
        let served = served_dir("data.bin", b"0123456789");
        let mut client = client_for(served.path(), Config::default());

        let request = FetchRequest::new(&b"../data.bin"[..], 0, 5).unwrap();
        let reply = client.fetch(&request).await.unwrap();
        assert_eq!(reply, FetchReply::Rejected(RejectReason::BadFilename));
    }

    #[tokio::test]
    async fn test_download_invalid_input() {
        let served = served_dir("data.bin", b"0123456789");
        let mut client = client_for(served.path(), Config::default());

        let err = client.download(b"data.bin", 5, 4).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRange { offset: 5, end: 4 }));

        let err = client.download(b"a/b", 0, 4).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFilename(_)));
    }

    #[tokio::test]
    async fn test_unexpected_list_response() {
        // List에 Accept로 응답하는 서버
        let stream = Trickle::new(vec![0, 3, 0, 0, 0, 1]);
        let mut client = Client::new(stream, Config::default());

        let err = client.list().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(3)));
        assert_eq!(client.into_inner().output, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_unexpected_fetch_response() {
        let stream = Trickle::new(vec![0, 1, 0, 0, 0, 0]);
        let mut client = Client::new(stream, Config::default());

        let request = FetchRequest::new(&b"x"[..], 0, 1).unwrap();
        let err = client.fetch(&request).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(1)));
    }

    #[tokio::test]
    async fn test_receive_fragment_truncated() {
        // 5 바이트를 알렸지만 3 바이트만 도착
        let stream = Trickle::new(vec![1, 2, 3]);
        let mut client = Client::new(stream, Config::default());

        let mut dest = Vec::new();
        let err = client.receive_fragment(5, &mut dest).await.unwrap_err();
        assert!(err.is_short_transfer());
    }

    #[tokio::test]
    async fn test_receive_fragment_trickle() {
        let payload: Vec<u8> = (0..100).collect();
        let stream = Trickle::new(payload.clone());
        let config = Config {
            chunk_size: 9,
            ..Config::default()
        };
        let mut client = Client::new(stream, config);

        let mut dest = Vec::new();
        let n = client.receive_fragment(100, &mut dest).await.unwrap();
        assert_eq!(n, 100);
        assert_eq!(dest, payload);
    }

    #[tokio::test]
    async fn test_receive_fragment_zero_chunk_size() {
        let stream = Trickle::new(vec![7, 8, 9]);
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        let mut client = Client::new(stream, config);

        let mut dest = Vec::new();
        let n = tokio::time::timeout(
            Duration::from_secs(5),
            client.receive_fragment(3, &mut dest),
        )
        .await
        .expect("receive did not finish")
        .unwrap();
        assert_eq!(n, 3);
        assert_eq!(dest, vec![7, 8, 9]);
    }

    #[test]
    fn test_download_throughput() {
        let outcome = DownloadOutcome {
            path: PathBuf::from("tmp/data.bin"),
            offset: 0,
            bytes_written: 4_000,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(outcome.throughput(), 2_000.0);
    }
}
