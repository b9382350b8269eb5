//! 서버 (송신측)
//!
//! - 연결마다 요청 → 검증 → 응답(+스트리밍) 루프
//! - 요청 경계에서 정상 종료되면 세션 종료, 그 외 실패는 해당 연결만 종료
//! - 연결 수락은 `Scheduling` 정책에 따라 순차 또는 동시 처리

use std::future::Future;
use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::listing::{self, Listing};
use crate::message::{FetchRequest, RejectReason, Request, Response};
use crate::stats::{SessionStats, TransferStats};
use crate::transport;
use crate::{Config, Result, Scheduling, PATH_SEPARATOR};

/// 수락된 조각: 열린 파일 + clamp된 범위
#[derive(Debug)]
pub struct Fragment {
    file: File,

    /// 시작 위치
    pub offset: u32,

    /// clamp된 길이: min(요청 길이, 파일 크기 - offset)
    pub len: u32,
}

/// Fetch 검증 결과
#[derive(Debug)]
pub enum FetchDecision {
    Accept(Fragment),
    Reject(RejectReason),
}

/// 일반 파일만 열기
///
/// 경로 구분자가 있으면 열지 않는다. 없음/권한 거부 등은 구분하지 않는다.
/// FIFO 같은 특수 파일은 open에서 멈출 수 있으므로 열기 전에 종류를 확인한다.
async fn open_regular(root: &Path, filename: &[u8]) -> Option<File> {
    if filename.is_empty() || filename.contains(&PATH_SEPARATOR) {
        return None;
    }

    let path = listing::name_to_path(root, filename);
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return None,
        Err(e) => {
            debug!("stat {:?} failed: {}", path, e);
            return None;
        }
    }

    let file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            debug!("open {:?} failed: {}", path, e);
            return None;
        }
    };

    // stat과 open 사이에 바뀌었을 수 있다
    match file.metadata().await {
        Ok(metadata) if metadata.is_file() => Some(file),
        Ok(_) => None,
        Err(e) => {
            debug!("stat {:?} failed: {}", path, e);
            None
        }
    }
}

/// Fetch 요청 검증
///
/// 순서: BadFilename → BadOffset → ZeroLength. 거부 사유는 항상 하나.
pub async fn decide_fetch(root: &Path, request: &FetchRequest) -> Result<FetchDecision> {
    let mut file = match open_regular(root, &request.filename).await {
        Some(f) => f,
        None => return Ok(FetchDecision::Reject(RejectReason::BadFilename)),
    };

    let file_size = file.seek(SeekFrom::End(0)).await?;
    let offset = u64::from(request.offset);
    if offset >= file_size {
        return Ok(FetchDecision::Reject(RejectReason::BadOffset));
    }

    if request.length == 0 {
        return Ok(FetchDecision::Reject(RejectReason::ZeroLength));
    }

    file.seek(SeekFrom::Start(offset)).await?;
    // 결과는 request.length 이하이므로 u32에 들어간다
    let len = u64::from(request.length).min(file_size - offset) as u32;

    Ok(FetchDecision::Accept(Fragment {
        file,
        offset: request.offset,
        len,
    }))
}

/// 연결 하나의 세션 상태 머신
pub struct Session<S> {
    stream: S,
    root: PathBuf,
    config: Config,

    /// 재사용 스트리밍 버퍼 (최대 chunk_size)
    buffer: Vec<u8>,

    stats: SessionStats,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            stream,
            root: root.into(),
            config,
            buffer: Vec::new(),
            stats: SessionStats::new(),
        }
    }

    /// 연결이 요청 경계에서 닫힐 때까지 요청 처리
    pub async fn run(mut self) -> Result<SessionStats> {
        while let Some(request) = Request::read_from(&mut self.stream).await? {
            match request {
                Request::List => self.send_listing().await?,
                Request::Fetch(fetch) => self.serve_fetch(&fetch).await?,
            }
            self.stream.flush().await?;
        }
        Ok(self.stats)
    }

    async fn send_listing(&mut self) -> Result<()> {
        let names = listing::list_regular_files(&self.root).await?;
        let listing = Listing::from_names(&names, self.config.listing_limit)?;
        debug!("Listing {} files ({} bytes)", names.len(), listing.len());

        Response::Listing(listing.into_payload())
            .write_to(&mut self.stream)
            .await?;
        self.stats.record_listing();
        Ok(())
    }

    async fn serve_fetch(&mut self, request: &FetchRequest) -> Result<()> {
        match decide_fetch(&self.root, request).await? {
            FetchDecision::Reject(reason) => {
                info!(
                    "Rejected fetch of {:?} (offset={}, length={}): {}",
                    request.display_name(),
                    request.offset,
                    request.length,
                    reason
                );
                Response::Reject(reason).write_to(&mut self.stream).await?;
                self.stats.record_reject(reason);
            }
            FetchDecision::Accept(mut fragment) => {
                info!(
                    "Serving {:?}: offset={}, length={} (requested {})",
                    request.display_name(),
                    fragment.offset,
                    fragment.len,
                    request.length
                );
                Response::Accept {
                    fragment_len: fragment.len,
                }
                .write_to(&mut self.stream)
                .await?;
                let sent = self.stream_fragment(&mut fragment).await?;
                self.stats.record_fragment(sent);
            }
        }
        Ok(())
    }

    /// 조각을 chunk_size 단위로 파일 → 소켓 전송
    async fn stream_fragment(&mut self, fragment: &mut Fragment) -> Result<u64> {
        let mut transfer = TransferStats::new(u64::from(fragment.len));
        let mut left = fragment.len as usize;

        // chunk_size 0은 검증 없이 만든 Config에서만 나온다
        let want = self.config.chunk_size.max(1).min(left);
        if self.buffer.len() < want {
            self.buffer.resize(want, 0);
        }

        while left > 0 {
            let chunk = left.min(self.buffer.len());
            let buf = &mut self.buffer[..chunk];
            transport::read_exact(&mut fragment.file, buf).await?;
            transport::write_exact(&mut self.stream, buf).await?;
            transfer.record_chunk(chunk);
            left -= chunk;
        }

        debug!(
            "Fragment sent: {} bytes in {:.2}ms",
            transfer.transferred,
            transfer.elapsed().as_secs_f64() * 1000.0
        );
        Ok(transfer.transferred)
    }
}

/// 연결 수락 루프
pub struct Server {
    root: PathBuf,
    config: Config,
}

impl Server {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 종료 없이 계속 연결 수락
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// `shutdown`이 완료되면 새 연결 수락을 중단
    ///
    /// Concurrent 모드에서는 진행 중인 세션이 모두 끝날 때까지 기다린다.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let scheduling = self.config.scheduling;
        let max_sessions = self.config.max_sessions;
        let server = Arc::new(self);
        let permits = match scheduling {
            Scheduling::Sequential => 0,
            Scheduling::Concurrent => max_sessions,
        };
        let sessions = Arc::new(Semaphore::new(permits));

        info!(
            "Serving {:?} on {} ({:?})",
            server.root,
            listener.local_addr()?,
            scheduling
        );

        tokio::pin!(shutdown);

        loop {
            // 세션 자리가 날 때까지 새 연결은 backlog에서 대기
            let permit = match scheduling {
                Scheduling::Sequential => None,
                Scheduling::Concurrent => tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    permit = sessions.clone().acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
            };

            // 종료 요청이 대기 연결보다 우선
            let (stream, peer) = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                },
            };

            match permit {
                None => server.handle_connection(stream, peer).await,
                Some(permit) => {
                    let server = server.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer).await;
                        drop(permit);
                    });
                }
            }
        }
        info!("Shutdown requested, no longer accepting connections");

        if scheduling == Scheduling::Concurrent {
            let all = u32::try_from(max_sessions).unwrap_or(u32::MAX);
            let _ = sessions.acquire_many(all).await;
        }

        Ok(())
    }

    /// 세션 하나 처리. 실패는 로그만 남기고 리스너에는 전파하지 않는다.
    pub async fn handle_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!("Client connected: {}", peer);
        let session = Session::new(stream, self.root.clone(), self.config.clone());

        match session.run().await {
            Ok(stats) => info!(
                "Client disconnected: {} (requests={}, listings={}, accepted={}, rejected={} [filename={}, offset={}, zero={}], bytes={}, {:.2}s, {:.2} MB/s)",
                peer,
                stats.requests,
                stats.listings,
                stats.fetches_accepted,
                stats.fetches_rejected(),
                stats.rejected.bad_filename,
                stats.rejected.bad_offset,
                stats.rejected.zero_length,
                stats.bytes_streamed,
                stats.elapsed().as_secs_f64(),
                stats.throughput() / 1_000_000.0
            ),
            Err(e) => warn!("Session with {} failed: {}", peer, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::Trickle;
    use crate::{Error, LISTING_MAX};
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncReadExt};

    fn served_dir(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn fetch(name: &str, offset: u32, length: u32) -> FetchRequest {
        FetchRequest::new(Bytes::copy_from_slice(name.as_bytes()), offset, length).unwrap()
    }

    async fn reject_reason(root: &Path, request: &FetchRequest) -> Option<RejectReason> {
        match decide_fetch(root, request).await.unwrap() {
            FetchDecision::Reject(reason) => Some(reason),
            FetchDecision::Accept(_) => None,
        }
    }

    #[tokio::test]
    async fn test_bad_filename() {
        let content: Vec<u8> = (0..50).collect();
        let dir = served_dir(&[("data.bin", &content[..])]);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("inner"), b"x").unwrap();

        for name in ["missing", "sub", "sub/inner", "/etc/passwd", "../data.bin", ""] {
            assert_eq!(
                reject_reason(dir.path(), &fetch(name, 0, 1)).await,
                Some(RejectReason::BadFilename),
                "name {:?}",
                name
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fifo_is_bad_filename() {
        let dir = served_dir(&[]);
        let status = std::process::Command::new("mkfifo")
            .arg(dir.path().join("pipe"))
            .status()
            .unwrap();
        assert!(status.success());

        // 쓰는 쪽이 없는 FIFO를 열면 멈춘다
        let reason = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            reject_reason(dir.path(), &fetch("pipe", 0, 1)),
        )
        .await
        .expect("fetch of a FIFO did not finish");
        assert_eq!(reason, Some(RejectReason::BadFilename));
    }

    #[tokio::test]
    async fn test_bad_offset() {
        let content: Vec<u8> = (0..50).collect();
        let dir = served_dir(&[("data.bin", &content[..]), ("empty", &b""[..])]);

        for offset in [50, 51, u32::MAX] {
            assert_eq!(
                reject_reason(dir.path(), &fetch("data.bin", offset, 10)).await,
                Some(RejectReason::BadOffset)
            );
        }
        assert_eq!(
            reject_reason(dir.path(), &fetch("empty", 0, 10)).await,
            Some(RejectReason::BadOffset)
        );
    }

    #[tokio::test]
    async fn test_zero_length() {
        let content: Vec<u8> = (0..50).collect();
        let dir = served_dir(&[("data.bin", &content[..])]);

        for offset in [0, 10, 49] {
            assert_eq!(
                reject_reason(dir.path(), &fetch("data.bin", offset, 0)).await,
                Some(RejectReason::ZeroLength)
            );
        }
    }

    #[tokio::test]
    async fn test_clamped_length() {
        let content: Vec<u8> = (0..50).collect();
        let dir = served_dir(&[("data.bin", &content[..])]);

        for (offset, length, expected) in [(10, 100, 40), (0, 50, 50), (49, 1, 1), (5, 3, 3)] {
            match decide_fetch(dir.path(), &fetch("data.bin", offset, length)).await.unwrap() {
                FetchDecision::Accept(fragment) => assert_eq!(fragment.len, expected),
                FetchDecision::Reject(reason) => panic!("unexpected reject: {}", reason),
            }
        }
    }

    #[tokio::test]
    async fn test_session_fetch_streams_fragment() {
        let content: Vec<u8> = (0..50).collect();
        let dir = served_dir(&[("data.bin", &content[..])]);

        let (mut client, server) = duplex(64);
        let config = Config {
            chunk_size: 7,
            ..Config::default()
        };
        let session = tokio::spawn(Session::new(server, dir.path(), config).run());

        Request::Fetch(fetch("data.bin", 10, 100))
            .write_to(&mut client)
            .await
            .unwrap();
        let response = Response::read_from(&mut client, LISTING_MAX).await.unwrap();
        assert_eq!(response, Response::Accept { fragment_len: 40 });

        let mut data = vec![0u8; 40];
        client.read_exact(&mut data).await.unwrap();
        assert_eq!(data, &content[10..50]);

        drop(client);
        let stats = session.await.unwrap().unwrap();
        assert_eq!(stats.fetches_accepted, 1);
        assert_eq!(stats.bytes_streamed, 40);
    }

    #[tokio::test]
    async fn test_session_zero_chunk_size_still_streams() {
        let dir = served_dir(&[("data.bin", &b"hello"[..])]);

        let (mut client, server) = duplex(64);
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        let session = tokio::spawn(Session::new(server, dir.path(), config).run());

        Request::Fetch(fetch("data.bin", 0, 5))
            .write_to(&mut client)
            .await
            .unwrap();
        let response = Response::read_from(&mut client, LISTING_MAX).await.unwrap();
        assert_eq!(response, Response::Accept { fragment_len: 5 });

        let mut data = vec![0u8; 5];
        tokio::time::timeout(std::time::Duration::from_secs(5), client.read_exact(&mut data))
            .await
            .expect("fragment did not arrive")
            .unwrap();
        assert_eq!(data, b"hello");

        drop(client);
        let stats = session.await.unwrap().unwrap();
        assert_eq!(stats.bytes_streamed, 5);
    }

    #[tokio::test]
    async fn test_session_listing_and_reject() {
        let dir = served_dir(&[("a.txt", &b"aaa"[..]), ("b.txt", &b"bbb"[..])]);

        let (mut client, server) = duplex(1024);
        let session = tokio::spawn(Session::new(server, dir.path(), Config::default()).run());

        Request::List.write_to(&mut client).await.unwrap();
        let response = Response::read_from(&mut client, LISTING_MAX).await.unwrap();
        assert_eq!(response, Response::Listing(Bytes::from_static(b"a.txt|b.txt")));

        Request::Fetch(fetch("a.txt", 0, 0))
            .write_to(&mut client)
            .await
            .unwrap();
        let response = Response::read_from(&mut client, LISTING_MAX).await.unwrap();
        assert_eq!(response, Response::Reject(RejectReason::ZeroLength));

        drop(client);
        let stats = session.await.unwrap().unwrap();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.fetches_rejected(), 1);
        assert_eq!(stats.rejected.zero_length, 1);
    }

    #[tokio::test]
    async fn test_session_clean_close() {
        let dir = served_dir(&[]);
        let stream = Trickle::new(Vec::new());

        let stats = Session::new(stream, dir.path(), Config::default())
            .run()
            .await
            .unwrap();
        assert_eq!(stats.requests, 0);
    }

    #[tokio::test]
    async fn test_session_close_mid_message() {
        let dir = served_dir(&[]);
        // Fetch 태그 + offset 2 바이트만 보내고 종료
        let stream = Trickle::new(vec![0, 2, 0, 0]);

        let err = Session::new(stream, dir.path(), Config::default())
            .run()
            .await
            .unwrap_err();
        assert!(err.is_short_transfer());
    }

    #[tokio::test]
    async fn test_session_unknown_request() {
        let dir = served_dir(&[]);
        let stream = Trickle::new(vec![0, 1, 0, 7]);

        let err = Session::new(stream, dir.path(), Config::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRequest(7)));
    }

    #[tokio::test]
    async fn test_session_listing_too_large() {
        let dir = served_dir(&[("aaaa", &b""[..]), ("bbbb", &b""[..])]);
        let config = Config {
            listing_limit: 5,
            ..Config::default()
        };
        let stream = Trickle::new(vec![0, 1]);

        let err = Session::new(stream, dir.path(), config).run().await.unwrap_err();
        assert!(matches!(err, Error::ListingTooLarge { .. }));
    }
}
