//! 파일 목록
//!
//! - 페이로드: 파일 이름을 `|` 한 바이트로 이어 붙인 것 (앞뒤 구분자 없음)
//! - 디렉토리 열거: 서비스 디렉토리의 일반 파일만 포함

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::{Error, Result, LISTING_SEPARATOR};

/// `|`로 연결된 파일 목록 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    payload: Bytes,
}

impl Listing {
    /// 이름 목록으로 페이로드 생성
    ///
    /// 전체 크기가 `limit`를 넘으면 `ListingTooLarge`.
    pub fn from_names<I, N>(names: I, limit: usize) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<[u8]>,
    {
        let mut buf = BytesMut::new();
        for (index, name) in names.into_iter().enumerate() {
            let name = name.as_ref();
            let separator = usize::from(index > 0);
            let size = buf.len() + separator + name.len();
            if size > limit {
                return Err(Error::ListingTooLarge { size, max: limit });
            }
            if separator == 1 {
                buf.extend_from_slice(&[LISTING_SEPARATOR]);
            }
            buf.extend_from_slice(name);
        }
        Ok(Self {
            payload: buf.freeze(),
        })
    }

    /// 수신한 페이로드로 생성
    pub fn from_payload(payload: Bytes) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// 페이로드 바이트 길이
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// 파일 이름 목록
    ///
    /// 빈 페이로드는 항목 0개.
    pub fn entries(&self) -> Vec<Bytes> {
        if self.payload.is_empty() {
            return Vec::new();
        }

        let mut entries = Vec::new();
        let mut start = 0;
        for (i, &byte) in self.payload.iter().enumerate() {
            if byte == LISTING_SEPARATOR {
                entries.push(self.payload.slice(start..i));
                start = i + 1;
            }
        }
        entries.push(self.payload.slice(start..));
        entries
    }
}

/// 디렉토리의 일반 파일 이름 목록 (바이트 순 정렬)
///
/// 심볼릭 링크는 대상 기준으로 판단한다. stat 실패 항목은 건너뛴다.
pub async fn list_regular_files(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let name = name_to_bytes(&entry.file_name());
        if name.contains(&LISTING_SEPARATOR) {
            warn!(
                "File name {:?} contains the listing separator; clients will split it",
                String::from_utf8_lossy(&name)
            );
        }
        names.push(name);
    }

    names.sort();
    Ok(names)
}

/// 파일 이름 → 와이어 바이트
#[cfg(unix)]
pub fn name_to_bytes(name: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
pub fn name_to_bytes(name: &OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

/// 와이어 바이트 → 디렉토리 내 경로
#[cfg(unix)]
pub fn name_to_path(dir: &Path, name: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    dir.join(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
pub fn name_to_path(dir: &Path, name: &[u8]) -> PathBuf {
    dir.join(String::from_utf8_lossy(name).as_ref())
}
