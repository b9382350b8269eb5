//! 대화형 입력
//!
//! 잘못된 입력은 다시 묻고, 입력이 끝나면 `InputClosed`로 실패한다.
//! 프로토콜 상태에는 영향을 주지 않는다.

use std::io::{self, BufRead, Write};

use bytes::Bytes;

use crate::{Error, Result};

/// 한 줄 읽기. EOF면 `InputClosed`.
fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(Error::InputClosed);
    }
    Ok(line)
}

/// 한 줄에 부호 없는 정수 하나만 있는지 파싱
pub fn parse_unsigned(line: &str) -> Result<u32> {
    let trimmed = line.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| Error::InvalidInput(trimmed.to_string()))
}

/// 부호 없는 정수를 받을 때까지 반복해서 묻기
pub fn prompt_unsigned<R, W>(input: &mut R, output: &mut W, label: &str) -> Result<u32>
where
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "{}", label)?;
        output.flush()?;

        match parse_unsigned(&read_line(input)?) {
            Ok(value) => return Ok(value),
            Err(_) => writeln!(output, "Please input a single unsigned integer.")?,
        }
    }
}

/// 목록을 번호와 함께 출력하고 선택한 항목의 인덱스(0부터) 반환
pub fn choose_from_list<R, W>(input: &mut R, output: &mut W, names: &[Bytes]) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    if names.is_empty() {
        return Err(Error::InvalidInput("empty file list".into()));
    }

    for (i, name) in names.iter().enumerate() {
        writeln!(output, "{}. {}", i + 1, String::from_utf8_lossy(name))?;
    }

    loop {
        let choice = prompt_unsigned(input, output, "\nChoose file number:\n> ")? as usize;
        if (1..=names.len()).contains(&choice) {
            return Ok(choice - 1);
        }
        writeln!(output, "Please choose a number between 1 and {}.", names.len())?;
    }
}

/// 조각 시작/끝 위치 입력. 끝이 시작보다 작으면 끝을 다시 묻는다.
pub fn prompt_range<R, W>(input: &mut R, output: &mut W) -> Result<(u32, u32)>
where
    R: BufRead,
    W: Write,
{
    let offset = prompt_unsigned(input, output, "\nChoose the offset of the file fragment\n> ")?;
    loop {
        let end = prompt_unsigned(input, output, "\nChoose the end of the file fragment\n> ")?;
        if end >= offset {
            return Ok((offset, end));
        }
        writeln!(output, "The end must not be smaller than the offset ({}).", offset)?;
    }
}

/// 사용자가 고른 파일과 조각 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// `names` 안의 인덱스
    pub index: usize,
    pub offset: u32,
    pub end: u32,
}

/// 파일 선택 후 범위 입력
pub fn prompt_selection<R, W>(input: &mut R, output: &mut W, names: &[Bytes]) -> Result<Selection>
where
    R: BufRead,
    W: Write,
{
    let index = choose_from_list(input, output, names)?;
    let (offset, end) = prompt_range(input, output)?;
    Ok(Selection { index, offset, end })
}

/// `prompt_selection`을 blocking 스레드에서 실행
///
/// 터미널 입력을 기다리는 동안 런타임 워커를 막지 않는다.
pub async fn prompt_selection_blocking<R, W>(
    mut input: R,
    mut output: W,
    names: Vec<Bytes>,
) -> Result<Selection>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    tokio::task::spawn_blocking(move || prompt_selection(&mut input, &mut output, &names))
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?
}
