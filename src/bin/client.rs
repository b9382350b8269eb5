//! netstore 클라이언트 - 파일 목록을 받고 선택한 파일의 조각을 다운로드
//!
//! 사용법:
//!   netstore-client SERVER [PORT]
//!
//! 예시:
//!   cargo run --release --bin netstore-client -- 127.0.0.1
//!   cargo run --release --bin netstore-client -- 192.168.1.100 7000 --staging-dir downloads

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use netstore::prompt::prompt_selection_blocking;
use netstore::{Client, Config, Error, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};

/// netstore 클라이언트 옵션
#[derive(Debug, Parser)]
#[command(name = "netstore-client", version, about = "Download a file fragment from a netstore server")]
struct ClientOpts {
    /// 서버 호스트
    server: String,

    /// 서버 포트
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 다운로드 저장 디렉토리
    #[arg(long, default_value = "tmp")]
    staging_dir: PathBuf,

    /// 스트리밍 청크 크기 (바이트)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

async fn run(opts: ClientOpts) -> netstore::Result<ExitCode> {
    let config = Config {
        chunk_size: opts.chunk_size,
        staging_dir: opts.staging_dir,
        ..Config::default()
    };
    config.validate()?;

    let mut client = Client::connect((opts.server.as_str(), opts.port), config).await?;

    let entries = client.list().await?.entries();
    if entries.is_empty() {
        eprintln!("No files currently available");
        return Ok(ExitCode::SUCCESS);
    }

    let selection =
        prompt_selection_blocking(BufReader::new(io::stdin()), io::stdout(), entries.clone()).await?;
    let filename = &entries[selection.index];

    match client.download(filename, selection.offset, selection.end).await {
        Ok(outcome) => {
            println!(
                "Saved {} bytes to {} at offset {}",
                outcome.bytes_written,
                outcome.path.display(),
                outcome.offset
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Rejected(reason)) => {
            eprintln!("Request rejected. reason: {}", reason);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    let opts = ClientOpts::parse();

    match run(opts).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
