//! 컨테이너 stdout 스트림 분할
//!
//! 엔진은 결과 문서를 NUL(`\0`) 바이트로 구분하여 stdout에 씁니다.
//! Docker attach 스트림의 프레임 경계는 문서 경계와 무관하므로
//! [`OutputSplitter`]가 바이트를 누적하며 구분자 단위로 청크를 잘라냅니다.

use bytes::{Bytes, BytesMut};

/// 엔진 출력 문서 구분자
pub const OUTPUT_DELIMITER: u8 = b'\0';

/// 단일 청크 최대 크기 (16 MiB)
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 16 * 1024 * 1024;

/// 출력 콜백이 런타임에 돌려주는 제어 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// 다음 청크를 계속 처리
    Continue,
    /// 컨테이너 중지를 요청하고 이후 청크는 버림
    Stop,
}

impl StreamControl {
    /// 중지 요청인지 여부
    pub fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// 구분자 기반 스트림 분할기
///
/// `push`로 받은 바이트를 버퍼에 쌓고, `next_chunk`로 완성된 청크를 꺼냅니다.
/// 구분자 없이 `max_chunk_bytes`를 넘어선 데이터는 강제로 잘라 하나의 청크로
/// 내보냅니다. 파서가 해당 청크를 잘못된 출력으로 판정하게 됩니다.
#[derive(Debug)]
pub struct OutputSplitter {
    delimiter: u8,
    max_chunk_bytes: usize,
    buffer: BytesMut,
    /// 구분자가 없음을 이미 확인한 버퍼 앞부분 길이
    scanned: usize,
    inspected: u64,
}

impl OutputSplitter {
    /// 주어진 구분자로 분할기를 생성합니다.
    pub fn new(delimiter: u8) -> Self {
        Self::with_max_chunk_bytes(delimiter, DEFAULT_MAX_CHUNK_BYTES)
    }

    /// 청크 크기 제한을 지정하여 분할기를 생성합니다.
    pub fn with_max_chunk_bytes(delimiter: u8, max_chunk_bytes: usize) -> Self {
        Self {
            delimiter,
            max_chunk_bytes: max_chunk_bytes.max(1),
            buffer: BytesMut::new(),
            scanned: 0,
            inspected: 0,
        }
    }

    /// 스트림에서 받은 바이트를 버퍼에 추가합니다.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// 완성된 다음 청크를 꺼냅니다 (구분자 제외).
    ///
    /// 이전 호출에서 검사한 바이트는 다시 검사하지 않습니다.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        let unscanned = &self.buffer[self.scanned..];
        let found = unscanned.iter().position(|b| *b == self.delimiter);

        if let Some(offset) = found {
            self.inspected += (offset + 1) as u64;
            let pos = self.scanned + offset;
            let chunk = self.buffer.split_to(pos).freeze();
            // 구분자 자체를 버림
            let _ = self.buffer.split_to(1);
            self.scanned = 0;
            return Some(chunk);
        }

        self.inspected += unscanned.len() as u64;
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_chunk_bytes {
            let chunk = self.buffer.split_to(self.max_chunk_bytes).freeze();
            // 남은 바이트도 이미 검사됨
            self.scanned = self.buffer.len();
            return Some(chunk);
        }

        None
    }

    /// 스트림 종료 시 남은 바이트를 마지막 청크로 꺼냅니다.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }

    /// 버퍼에 남아 있는 바이트 수
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// 구분자 탐색으로 검사한 누적 바이트 수
    pub fn inspected_bytes(&self) -> u64 {
        self.inspected
    }
}

/// 크기 제한이 있는 stderr 수집 버퍼
#[derive(Debug)]
pub struct CappedBuffer {
    limit: usize,
    data: Vec<u8>,
    truncated: bool,
}

impl CappedBuffer {
    /// `limit` 바이트까지만 보관하는 버퍼를 생성합니다.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            data: Vec::new(),
            truncated: false,
        }
    }

    /// 데이터를 추가합니다. 제한을 넘는 부분은 버립니다.
    pub fn push(&mut self, bytes: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        if bytes.len() > room {
            self.truncated = true;
        }
        let take = bytes.len().min(room);
        self.data.extend_from_slice(&bytes[..take]);
    }

    /// 잘린 데이터가 있는지 여부
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// 수집한 내용을 UTF-8 문자열로 변환합니다 (손실 허용).
    pub fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.truncated {
            text.push_str("\n[stderr truncated]");
        }
        text
    }
}
