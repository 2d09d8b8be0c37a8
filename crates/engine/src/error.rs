//! 엔진 실행 에러 타입
//!
//! - [`RuntimeError`]: 컨테이너 런타임 드라이버 수준의 에러 (컨테이너 시작 전)
//! - [`EngineError`]: 엔진 실행 단위가 호출자에게 돌려주는 에러
//!
//! `From<EngineError> for BelugasError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use belugas_core::error::{BelugasError, EngineRunError};

/// 컨테이너 런타임 에러
///
/// 컨테이너가 시작되기 전에 발생하는 에러입니다. 시작 이후의 실패(비정상 종료,
/// 시간 초과)는 에러가 아니라 리스너 이벤트로 보고됩니다.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// 실행할 이미지를 결정할 수 없거나 로컬에 없음
    #[error("image required for container '{container}': {reason}")]
    ImageRequired {
        /// 컨테이너 이름
        container: String,
        /// 사유
        reason: String,
    },

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),
}

/// 엔진 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 엔진 컨테이너가 비정상 종료됨
    #[error("engine {engine} failed: {reason}")]
    Failure {
        /// qualified name
        engine: String,
        /// 종료 상태와 stderr를 포함한 사유
        reason: String,
    },

    /// 엔진 컨테이너가 실행 시간 제한을 초과함
    #[error("engine {engine} ran for {seconds} seconds and was killed")]
    Timeout {
        /// qualified name
        engine: String,
        /// 실행된 시간 (초)
        seconds: u64,
    },

    /// 요청된 채널의 이미지를 찾을 수 없음 (사용 가능한 채널 목록 포함)
    #[error("{0}")]
    ImageRequired(String),

    /// 컨테이너 시작 전 런타임 에러
    #[error("container runtime error for {engine}: {source}")]
    Runtime {
        /// qualified name
        engine: String,
        /// 원인
        #[source]
        source: RuntimeError,
    },

    /// 임시 파일 생성/직렬화 실패
    #[error("artifact error: {path}: {reason}")]
    Artifact {
        /// 파일 경로
        path: String,
        /// 사유
        reason: String,
    },
}

impl From<EngineError> for BelugasError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Failure { engine, reason } => {
                BelugasError::Engine(EngineRunError::Failure { engine, reason })
            }
            EngineError::Timeout { engine, seconds } => {
                BelugasError::Engine(EngineRunError::Timeout { engine, seconds })
            }
            EngineError::ImageRequired(message) => {
                BelugasError::Engine(EngineRunError::ImageRequired(message))
            }
            EngineError::Runtime { .. } | EngineError::Artifact { .. } => {
                BelugasError::Engine(EngineRunError::Runtime(err.to_string()))
            }
        }
    }
}
