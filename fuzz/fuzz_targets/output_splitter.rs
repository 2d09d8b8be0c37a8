#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use belugas_engine::OutputSplitter;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 스트림 프레임 (도착 순서대로)
    frames: Vec<Vec<u8>>,
    /// 청크 크기 제한 (0은 1로 보정됨)
    max_chunk: u16,
}

fuzz_target!(|input: FuzzInput| {
    let max = usize::from(input.max_chunk).max(1);
    let mut splitter = OutputSplitter::with_max_chunk_bytes(b'\0', max);
    let total: usize = input.frames.iter().map(Vec::len).sum();
    let delimiters = input
        .frames
        .iter()
        .flatten()
        .filter(|b| **b == b'\0')
        .count();

    let mut emitted = 0usize;
    for frame in &input.frames {
        splitter.push(frame);
        while let Some(chunk) = splitter.next_chunk() {
            assert!(!chunk.contains(&b'\0'));
            emitted += chunk.len();
        }
    }
    if let Some(rest) = splitter.finish() {
        emitted += rest.len();
    }

    // 구분자를 제외한 모든 바이트가 정확히 한 번 전달된다
    assert_eq!(emitted + delimiters, total);
    assert_eq!(splitter.buffered_len(), 0);
});
