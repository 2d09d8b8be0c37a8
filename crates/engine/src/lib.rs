//! Belugas 엔진 실행 단위
//!
//! 정적 분석 엔진 하나를 격리 컨테이너에서 실행하고, 스트리밍 출력을
//! 검증/필터링하여 결과 수신자에 전달합니다.
//!
//! # 모듈 구성
//!
//! - [`engine`]: 엔진 설명자, 런타임 옵션, 실행 단위 ([`Engine`])
//! - [`docker`]: 컨테이너 런타임 트레이트와 bollard 구현
//! - [`container`]: 실행 파라미터와 실행 결과
//! - [`stream`]: NUL 구분 청크 분할
//! - [`listener`]: 컨테이너 생명주기 리스너
//! - [`output`]: 출력 파싱과 필터
//! - [`artifact`]: 마운트용 임시 파일
//! - [`sink`]: 결과 수신자 경계
//! - [`error`]: 에러 타입

pub mod artifact;
pub mod container;
pub mod docker;
pub mod engine;
pub mod error;
pub mod listener;
pub mod output;
pub mod sink;
pub mod stream;

pub use artifact::{ArtifactFile, MountedPath};
pub use container::{ContainerData, ContainerRunResult, ContainerSpec, Mount};
pub use docker::{BollardContainerRuntime, ContainerRuntime};
pub use engine::{Engine, EngineDescriptor, EngineMetadata, EngineRuntimeOptions};
pub use error::{EngineError, RuntimeError};
pub use listener::{
    CompositeContainerListener, ContainerListener, LoggingContainerListener,
    MetricsContainerListener, NullContainerListener, RaisingContainerListener,
};
pub use output::{EngineOutput, EngineOutputFilter, ParsedOutput};
pub use sink::{MemorySink, ResultSink};
pub use stream::{OutputSplitter, StreamControl};
