//! 컨테이너 생명주기 리스너
//!
//! 런타임 드라이버는 컨테이너 시작, 출력 청크, 종료, 시간 초과, 실패를
//! [`ContainerListener`]에 알립니다. 여러 관찰자는
//! [`CompositeContainerListener`]로 하나로 합쳐 전달합니다.
//!
//! - [`LoggingContainerListener`]: `tracing` 구조화 로그
//! - [`MetricsContainerListener`]: `metrics` 카운터/히스토그램
//! - [`RaisingContainerListener`]: 실패/시간 초과를 [`EngineError`]로 변환

use std::sync::{Arc, Mutex};
use std::time::Duration;

use belugas_core::metrics as m;

use crate::container::{ContainerData, ContainerRunResult};
use crate::error::EngineError;

/// 컨테이너 생명주기 이벤트 관찰자
///
/// 모든 메서드는 기본 구현이 비어 있으므로 필요한 이벤트만 구현합니다.
pub trait ContainerListener: Send + Sync {
    /// 컨테이너가 시작됨
    fn started(&self, _data: &ContainerData) {}

    /// stdout 청크를 받음 (구분자 제외)
    fn output(&self, _data: &ContainerData, _chunk: &[u8]) {}

    /// 컨테이너가 정상 종료됨 (소비자 중지 요청 포함)
    fn finished(&self, _data: &ContainerData, _result: &ContainerRunResult) {}

    /// 실행 시간 제한을 넘어 강제 종료됨
    fn timed_out(&self, _data: &ContainerData, _result: &ContainerRunResult) {}

    /// 비정상 종료 또는 시작 이후 런타임 에러
    fn failed(&self, _data: &ContainerData, _result: &ContainerRunResult) {}
}

/// 아무 일도 하지 않는 리스너
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContainerListener;

impl ContainerListener for NullContainerListener {}

/// 여러 리스너를 순서대로 호출하는 합성 리스너
#[derive(Default, Clone)]
pub struct CompositeContainerListener {
    listeners: Vec<Arc<dyn ContainerListener>>,
}

impl CompositeContainerListener {
    /// 리스너 목록으로 합성 리스너를 생성합니다.
    pub fn new(listeners: Vec<Arc<dyn ContainerListener>>) -> Self {
        Self { listeners }
    }

    /// 리스너를 추가합니다.
    pub fn push(&mut self, listener: Arc<dyn ContainerListener>) {
        self.listeners.push(listener);
    }

    /// 포함된 리스너 수
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl ContainerListener for CompositeContainerListener {
    fn started(&self, data: &ContainerData) {
        for listener in &self.listeners {
            listener.started(data);
        }
    }

    fn output(&self, data: &ContainerData, chunk: &[u8]) {
        for listener in &self.listeners {
            listener.output(data, chunk);
        }
    }

    fn finished(&self, data: &ContainerData, result: &ContainerRunResult) {
        for listener in &self.listeners {
            listener.finished(data, result);
        }
    }

    fn timed_out(&self, data: &ContainerData, result: &ContainerRunResult) {
        for listener in &self.listeners {
            listener.timed_out(data, result);
        }
    }

    fn failed(&self, data: &ContainerData, result: &ContainerRunResult) {
        for listener in &self.listeners {
            listener.failed(data, result);
        }
    }
}

/// `tracing` 로그를 남기는 리스너
pub struct LoggingContainerListener {
    engine: String,
}

impl LoggingContainerListener {
    /// qualified name으로 로깅 리스너를 생성합니다.
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
        }
    }
}

impl ContainerListener for LoggingContainerListener {
    fn started(&self, data: &ContainerData) {
        tracing::info!(
            engine = %self.engine,
            container = %data.name,
            image = %data.image,
            "engine container started"
        );
    }

    fn output(&self, data: &ContainerData, chunk: &[u8]) {
        tracing::debug!(
            engine = %self.engine,
            container = %data.name,
            output = %String::from_utf8_lossy(chunk),
            "engine output"
        );
    }

    fn finished(&self, data: &ContainerData, result: &ContainerRunResult) {
        tracing::info!(
            engine = %self.engine,
            container = %data.name,
            exit_status = ?result.exit_status,
            stopped = result.stopped,
            duration_ms = result.duration.as_millis() as u64,
            "engine container finished"
        );
        if !result.stderr.is_empty() {
            tracing::debug!(engine = %self.engine, stderr = %result.stderr, "engine stderr");
        }
    }

    fn timed_out(&self, data: &ContainerData, result: &ContainerRunResult) {
        tracing::warn!(
            engine = %self.engine,
            container = %data.name,
            duration_secs = result.duration.as_secs(),
            "engine container timed out and was killed"
        );
    }

    fn failed(&self, data: &ContainerData, result: &ContainerRunResult) {
        tracing::error!(
            engine = %self.engine,
            container = %data.name,
            exit_status = ?result.exit_status,
            error = ?result.error,
            stderr = %result.stderr,
            "engine container failed"
        );
    }
}

/// `metrics` 카운터/히스토그램을 기록하는 리스너
///
/// `engine` 라벨은 qualified name의 `:`를 `.`으로 바꾼 값입니다.
pub struct MetricsContainerListener {
    label: String,
}

impl MetricsContainerListener {
    /// qualified name으로 메트릭 리스너를 생성합니다.
    pub fn new(qualified_name: &str) -> Self {
        Self {
            label: m::engine_label(qualified_name),
        }
    }

    /// 메트릭에 사용되는 engine 라벨
    pub fn label(&self) -> &str {
        &self.label
    }

    fn record_finish(&self, result: &ContainerRunResult, outcome: &'static str) {
        metrics::counter!(
            m::ENGINE_RUNS_FINISHED_TOTAL,
            m::LABEL_ENGINE => self.label.clone(),
            m::LABEL_RESULT => outcome
        )
        .increment(1);
        metrics::histogram!(
            m::ENGINE_RUN_DURATION_SECONDS,
            m::LABEL_ENGINE => self.label.clone()
        )
        .record(result.duration.as_secs_f64());
    }
}

impl ContainerListener for MetricsContainerListener {
    fn started(&self, _data: &ContainerData) {
        metrics::counter!(m::ENGINE_RUNS_STARTED_TOTAL, m::LABEL_ENGINE => self.label.clone())
            .increment(1);
    }

    fn output(&self, _data: &ContainerData, _chunk: &[u8]) {
        metrics::counter!(m::ENGINE_OUTPUT_CHUNKS_TOTAL, m::LABEL_ENGINE => self.label.clone())
            .increment(1);
    }

    fn finished(&self, _data: &ContainerData, result: &ContainerRunResult) {
        self.record_finish(result, m::RESULT_SUCCESS);
    }

    fn timed_out(&self, _data: &ContainerData, result: &ContainerRunResult) {
        self.record_finish(result, m::RESULT_TIMEOUT);
    }

    fn failed(&self, _data: &ContainerData, result: &ContainerRunResult) {
        self.record_finish(result, m::RESULT_ERROR);
    }
}

/// 컨테이너 실패/시간 초과를 [`EngineError`]로 변환하여 보관하는 리스너
///
/// 리스너 콜백은 에러를 반환할 수 없으므로, 실행이 끝난 뒤
/// [`take_error`](Self::take_error)로 꺼내 호출자에게 전파합니다.
pub struct RaisingContainerListener {
    engine: String,
    timeout_budget: Option<Duration>,
    error: Mutex<Option<EngineError>>,
}

impl RaisingContainerListener {
    /// qualified name으로 리스너를 생성합니다.
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            timeout_budget: None,
            error: Mutex::new(None),
        }
    }

    /// 시간 초과 에러에 보고할 실행 시간 제한을 지정합니다.
    ///
    /// 지정하지 않으면 kill 시간까지 포함된 실제 경과 시간을 보고합니다.
    pub fn with_timeout_budget(mut self, budget: Duration) -> Self {
        self.timeout_budget = Some(budget);
        self
    }

    /// 기록된 에러를 꺼냅니다.
    pub fn take_error(&self) -> Option<EngineError> {
        match self.error.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn record(&self, err: EngineError) {
        let mut guard = match self.error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 첫 번째 에러만 유지
        if guard.is_none() {
            *guard = Some(err);
        }
    }
}

impl ContainerListener for RaisingContainerListener {
    fn timed_out(&self, _data: &ContainerData, result: &ContainerRunResult) {
        self.record(EngineError::Timeout {
            engine: self.engine.clone(),
            seconds: self.timeout_budget.unwrap_or(result.duration).as_secs(),
        });
    }

    fn failed(&self, _data: &ContainerData, result: &ContainerRunResult) {
        let status = match (&result.error, result.exit_status) {
            (Some(err), _) => format!("error {err}"),
            (None, Some(code)) => format!("status {code}"),
            (None, None) => "unknown status".to_owned(),
        };
        self.record(EngineError::Failure {
            engine: self.engine.clone(),
            reason: format!("failed with {status} and stderr {}", result.stderr),
        });
    }
}
