//! 결과 수신자 경계

use crate::output::EngineOutput;

/// 검증/필터를 통과한 엔진 출력을 받는 수신자
pub trait ResultSink: Send {
    /// 출력을 기록합니다. `false`를 반환하면 엔진 컨테이너 중지를 요청합니다.
    fn write(&mut self, output: &EngineOutput) -> bool;

    /// 엔진이 잘못된 출력을 냈음을 알립니다.
    fn failed(&mut self, message: &str);
}

/// 모든 출력을 메모리에 모으는 수신자
#[derive(Debug, Default)]
pub struct MemorySink {
    /// 기록된 출력
    pub outputs: Vec<EngineOutput>,
    /// 실패 메시지
    pub failures: Vec<String>,
    /// 이 개수만큼 기록한 뒤 `false` 반환
    pub limit: Option<usize>,
}

impl MemorySink {
    /// 제한 없는 수신자를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit`개를 기록한 뒤 중지를 요청하는 수신자를 생성합니다.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, output: &EngineOutput) -> bool {
        self.outputs.push(output.clone());
        self.limit.is_none_or(|limit| self.outputs.len() < limit)
    }

    fn failed(&mut self, message: &str) {
        self.failures.push(message.to_owned());
    }
}
