//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `belugas_`
//! - 영역: `engine_`, `run_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! 엔진별 레이블 값은 qualified name의 `:`를 `.`으로 바꾼 형태입니다
//! (예: `rubocop.stable`).

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 엔진 레이블 키 (예: `rubocop.stable`)
pub const LABEL_ENGINE: &str = "engine";

/// 결과 레이블 키 (success, error, timeout)
pub const LABEL_RESULT: &str = "result";

/// 결과 레이블 값
pub const RESULT_SUCCESS: &str = "success";
/// 결과 레이블 값
pub const RESULT_ERROR: &str = "error";
/// 결과 레이블 값
pub const RESULT_TIMEOUT: &str = "timeout";

// ─── Engine 메트릭 ────────────────────────────────────────────────

/// Engine: 시작된 엔진 컨테이너 수 (counter, label: engine)
pub const ENGINE_RUNS_STARTED_TOTAL: &str = "belugas_engine_runs_started_total";

/// Engine: 종료된 엔진 컨테이너 수 (counter, label: engine, result)
pub const ENGINE_RUNS_FINISHED_TOTAL: &str = "belugas_engine_runs_finished_total";

/// Engine: 엔진 실행 시간 (histogram, 초, label: engine)
pub const ENGINE_RUN_DURATION_SECONDS: &str = "belugas_engine_run_duration_seconds";

/// Engine: 수신한 출력 청크 수 (counter, label: engine)
pub const ENGINE_OUTPUT_CHUNKS_TOTAL: &str = "belugas_engine_output_chunks_total";

/// Engine: 검증에 실패한 출력 수 (counter, label: engine)
pub const ENGINE_INVALID_OUTPUTS_TOTAL: &str = "belugas_engine_invalid_outputs_total";

/// Engine: 필터로 제외된 출력 수 (counter, label: engine)
pub const ENGINE_FILTERED_OUTPUTS_TOTAL: &str = "belugas_engine_filtered_outputs_total";

// ─── Run 메트릭 ────────────────────────────────────────────────────

/// Run: 실행 규칙 미충족으로 건너뛴 엔진 수 (counter)
pub const RUN_ENGINES_SKIPPED_TOTAL: &str = "belugas_run_engines_skipped_total";

/// Run: 누적 탐지 기능 수 (gauge)
pub const RUN_FEATURES_DETECTED: &str = "belugas_run_features_detected";

/// 모든 메트릭에 설명을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다. recorder가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        ENGINE_RUNS_STARTED_TOTAL,
        "Number of engine containers started"
    );
    describe_counter!(
        ENGINE_RUNS_FINISHED_TOTAL,
        "Number of engine containers finished, by result"
    );
    describe_histogram!(
        ENGINE_RUN_DURATION_SECONDS,
        "Engine container wall-clock run time in seconds"
    );
    describe_counter!(
        ENGINE_OUTPUT_CHUNKS_TOTAL,
        "NUL-delimited output chunks received from engines"
    );
    describe_counter!(
        ENGINE_INVALID_OUTPUTS_TOTAL,
        "Engine outputs rejected by validation"
    );
    describe_counter!(
        ENGINE_FILTERED_OUTPUTS_TOTAL,
        "Engine outputs suppressed by the output filter"
    );
    describe_counter!(
        RUN_ENGINES_SKIPPED_TOTAL,
        "Engines skipped because their run rules were not met"
    );
    describe_gauge!(
        RUN_FEATURES_DETECTED,
        "Distinct features in the accumulated result set"
    );
}

/// `engine` 레이블 값을 만듭니다. (`rubocop:stable` → `rubocop.stable`)
pub fn engine_label(qualified_name: &str) -> String {
    qualified_name.replace(':', ".")
}
