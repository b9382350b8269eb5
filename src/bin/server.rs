//! netstore 서버 - 디렉토리의 일반 파일을 조각 단위로 제공
//!
//! 사용법:
//!   netstore-server DIRECTORY [PORT]
//!
//! 예시:
//!   # 기본 포트(6543)로 ./shared 제공
//!   cargo run --release --bin netstore-server -- ./shared
//!
//!   # 연결별 동시 처리
//!   cargo run --release --bin netstore-server -- ./shared 7000 --concurrent

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use netstore::{Config, Scheduling, Server, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};

/// netstore 서버 옵션
#[derive(Debug, Parser)]
#[command(name = "netstore-server", version, about = "Serve file fragments of one directory")]
struct ServerOpts {
    /// 제공할 디렉토리
    directory: PathBuf,

    /// 수신 포트
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 스트리밍 청크 크기 (바이트)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// 연결마다 독립 태스크로 처리 (기본: 한 연결씩 순차 처리)
    #[arg(long)]
    concurrent: bool,

    /// 동시 세션 최대 수 (--concurrent 전용)
    #[arg(long, default_value_t = 128)]
    max_sessions: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let opts = ServerOpts::parse();

    if !opts.directory.is_dir() {
        return Err(format!("Not a directory: {}", opts.directory.display()).into());
    }
    let root = std::fs::canonicalize(&opts.directory)?;

    let config = Config {
        chunk_size: opts.chunk_size,
        scheduling: if opts.concurrent {
            Scheduling::Concurrent
        } else {
            Scheduling::Sequential
        },
        max_sessions: opts.max_sessions,
        ..Config::default()
    };

    info!("netstore server starting...");
    info!("Directory: {}", root.display());
    info!("Chunk size: {} bytes", config.chunk_size);

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, opts.port));
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    let server = Server::new(root, config)?;
    server
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
