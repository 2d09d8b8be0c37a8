//! 에러 타입 — 도메인별 에러 정의

/// Belugas 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BelugasError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 실행 계획/오케스트레이션 에러
    #[error("run error: {0}")]
    Run(#[from] RunError),

    /// 엔진 실행 에러
    #[error("engine error: {0}")]
    Engine(#[from] EngineRunError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 실행 계획/오케스트레이션 에러
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 활성화된 엔진이 없음
    #[error("no enabled engines")]
    NoEnabledEngines,

    /// 요청된 엔진 이름을 레지스트리에서 찾을 수 없음
    #[error("unknown engine name: {0}")]
    InvalidEngineName(String),

    /// 같은 qualified name이 한 실행에 두 번 등장
    #[error("engine '{0}' is configured more than once")]
    DuplicateEngine(String),
}

/// 엔진 실행 에러 (컨테이너 수준)
#[derive(Debug, thiserror::Error)]
pub enum EngineRunError {
    /// 엔진 컨테이너가 비정상 종료됨
    #[error("engine {engine} failed: {reason}")]
    Failure { engine: String, reason: String },

    /// 엔진 컨테이너가 실행 시간 제한을 초과함
    #[error("engine {engine} ran for {seconds} seconds and was killed")]
    Timeout { engine: String, seconds: u64 },

    /// 요청된 채널에 해당하는 이미지가 없음
    #[error("{0}")]
    ImageRequired(String),

    /// 컨테이너 런타임 또는 임시 파일 처리 실패
    #[error("{0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_display() {
        assert_eq!(RunError::NoEnabledEngines.to_string(), "no enabled engines");
        assert!(
            RunError::InvalidEngineName("nope".to_owned())
                .to_string()
                .contains("nope")
        );
        assert!(
            RunError::DuplicateEngine("rubocop:stable".to_owned())
                .to_string()
                .contains("rubocop:stable")
        );
    }

    #[test]
    fn engine_run_error_display() {
        let err = EngineRunError::Timeout {
            engine: "rubocop:stable".to_owned(),
            seconds: 900,
        };
        let msg = err.to_string();
        assert!(msg.contains("rubocop:stable"));
        assert!(msg.contains("900"));
    }

    #[test]
    fn converts_into_belugas_error() {
        let err: BelugasError = RunError::NoEnabledEngines.into();
        assert!(matches!(err, BelugasError::Run(RunError::NoEnabledEngines)));

        let err: BelugasError = ConfigError::ParseFailed {
            reason: "bad".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("bad"));
    }
}
