//! Belugas 공통 크레이트
//!
//! 엔진 실행 단위(`belugas-engine`)와 오케스트레이터(`belugas-cli`)가 공유하는
//! 도메인 타입, 에러, 설정, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{BelugasError, ConfigError, EngineRunError, RunError};

// 설정
pub use config::BelugasConfig;

// 도메인 타입
pub use types::{DetectedFeature, FeatureSet, RunHistory, RunRules};
