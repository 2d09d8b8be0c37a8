//! 설정 관리 — belugas.toml 파싱 및 런타임 설정
//!
//! [`BelugasConfig`]는 실행 전체의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BELUGAS_RUNTIME_TIMEOUT_SECS=600` 형식, 그리고
//!    `ENGINE_MEMORY_LIMIT_BYTES` / `CONTAINER_TIMEOUT_SECONDS`)
//! 3. 설정 파일 (`belugas.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! 환경변수는 프로세스 경계에서 한 번만 읽습니다. 엔진은 환경을 직접 조회하지 않고
//! 이 구조체에서 파생된 값을 생성 시점에 전달받습니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), belugas_core::error::BelugasError> {
//! use belugas_core::config::BelugasConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BelugasConfig::load("belugas.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BelugasConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BelugasError, ConfigError};

/// 엔진 메모리 상한 기본값 (바이트)
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 512_000_000;

/// 엔진 실행 시간 제한 기본값 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// 엔진 메모리 상한 오버라이드 환경변수
pub const ENV_ENGINE_MEMORY_LIMIT_BYTES: &str = "ENGINE_MEMORY_LIMIT_BYTES";

/// 엔진 실행 시간 제한 오버라이드 환경변수
pub const ENV_CONTAINER_TIMEOUT_SECONDS: &str = "CONTAINER_TIMEOUT_SECONDS";

/// 설정 상한값 상수
const MIN_MEMORY_LIMIT_BYTES: u64 = 4 * 1024 * 1024;
const MAX_TIMEOUT_SECS: u64 = 24 * 3600;
const MAX_STDERR_BYTES: usize = 16 * 1024 * 1024;

/// Belugas 통합 설정
///
/// `belugas.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BelugasConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// 결과 출력 설정
    #[serde(default)]
    pub output: OutputConfig,
}

impl BelugasConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BelugasError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값으로 시작해 환경변수 오버라이드를 적용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, BelugasError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(BelugasError::Config(ConfigError::FileNotFound { .. })) => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BelugasError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BelugasError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BelugasError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BelugasError> {
        toml::from_str(toml_str).map_err(|e| {
            BelugasError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BELUGAS_{SECTION}_{FIELD}`
    /// 예: `BELUGAS_RUNTIME_DOCKER_SOCKET=/run/docker.sock`
    ///
    /// 엔진 이미지와 호환되는 기존 이름(`ENGINE_MEMORY_LIMIT_BYTES`,
    /// `CONTAINER_TIMEOUT_SECONDS`)도 지원하며, 둘 다 설정되면 기존 이름이 우선합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BELUGAS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BELUGAS_GENERAL_LOG_FORMAT");

        // Runtime
        override_string(
            &mut self.runtime.docker_socket,
            "BELUGAS_RUNTIME_DOCKER_SOCKET",
        );
        override_u64(
            &mut self.runtime.memory_limit_bytes,
            "BELUGAS_RUNTIME_MEMORY_LIMIT_BYTES",
        );
        override_u64(
            &mut self.runtime.memory_limit_bytes,
            ENV_ENGINE_MEMORY_LIMIT_BYTES,
        );
        override_u64(&mut self.runtime.timeout_secs, "BELUGAS_RUNTIME_TIMEOUT_SECS");
        override_u64(&mut self.runtime.timeout_secs, ENV_CONTAINER_TIMEOUT_SECONDS);
        override_string(&mut self.runtime.tmp_host_dir, "BELUGAS_RUNTIME_TMP_HOST_DIR");
        override_string(
            &mut self.runtime.tmp_container_dir,
            "BELUGAS_RUNTIME_TMP_CONTAINER_DIR",
        );
        override_string(&mut self.runtime.user, "BELUGAS_RUNTIME_USER");

        // Output
        override_string(&mut self.output.format, "BELUGAS_OUTPUT_FORMAT");
        override_usize(
            &mut self.output.max_findings_per_engine,
            "BELUGAS_OUTPUT_MAX_FINDINGS_PER_ENGINE",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BelugasError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.runtime.memory_limit_bytes < MIN_MEMORY_LIMIT_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "runtime.memory_limit_bytes".to_owned(),
                reason: format!("must be at least {MIN_MEMORY_LIMIT_BYTES}"),
            }
            .into());
        }

        if i64::try_from(self.runtime.memory_limit_bytes).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "runtime.memory_limit_bytes".to_owned(),
                reason: "value does not fit in a signed 64-bit integer".to_owned(),
            }
            .into());
        }

        if self.runtime.timeout_secs == 0 || self.runtime.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "runtime.timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.runtime.max_stderr_bytes > MAX_STDERR_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "runtime.max_stderr_bytes".to_owned(),
                reason: format!("must be 0-{MAX_STDERR_BYTES}"),
            }
            .into());
        }

        if self.runtime.tmp_host_dir.is_empty() || self.runtime.tmp_container_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runtime.tmp_host_dir".to_owned(),
                reason: "tmp directories must not be empty".to_owned(),
            }
            .into());
        }

        if !is_numeric_user(&self.runtime.user) {
            return Err(ConfigError::InvalidValue {
                field: "runtime.user".to_owned(),
                reason: "must be a numeric non-root uid:gid pair".to_owned(),
            }
            .into());
        }

        let valid_outputs = ["json", "text"];
        if !valid_outputs.contains(&self.output.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "output.format".to_owned(),
                reason: format!("must be one of: {}", valid_outputs.join(", ")),
            }
            .into());
        }

        if self.output.max_findings_per_engine == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.max_findings_per_engine".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// `uid:gid` 형식이며 둘 다 0이 아닌 숫자인지 확인합니다.
fn is_numeric_user(user: &str) -> bool {
    let Some((uid, gid)) = user.split_once(':') else {
        return false;
    };
    matches!(
        (uid.parse::<u32>(), gid.parse::<u32>()),
        (Ok(u), Ok(g)) if u != 0 && g != 0
    )
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub docker_socket: String,
    /// 엔진 메모리 상한 (바이트)
    pub memory_limit_bytes: u64,
    /// 엔진 실행 시간 제한 (초)
    pub timeout_secs: u64,
    /// 임시 파일 디렉토리 (Docker 데몬이 보는 호스트 경로)
    pub tmp_host_dir: String,
    /// 임시 파일 디렉토리 (이 프로세스가 쓰는 경로)
    pub tmp_container_dir: String,
    /// 엔진 컨테이너 실행 사용자 (`uid:gid`)
    pub user: String,
    /// 보관할 stderr 최대 크기 (바이트)
    pub max_stderr_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir().join("belugas").display().to_string();
        Self {
            docker_socket: String::new(),
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tmp_host_dir: tmp.clone(),
            tmp_container_dir: tmp,
            user: "9000:9000".to_owned(),
            max_stderr_bytes: 64 * 1024,
        }
    }
}

/// 결과 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 출력 형식 (json, text)
    pub format: String,
    /// 엔진 하나가 보고할 수 있는 최대 결과 수
    pub max_findings_per_engine: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_owned(),
            max_findings_per_engine: 10_000,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = BelugasConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.runtime.memory_limit_bytes, 512_000_000);
        assert_eq!(config.runtime.timeout_secs, 900);
        assert_eq!(config.runtime.user, "9000:9000");
        assert_eq!(config.output.format, "json");
    }

    #[test]
    fn default_config_passes_validation() {
        BelugasConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = BelugasConfig::parse("").unwrap();
        assert_eq!(config.runtime.memory_limit_bytes, DEFAULT_MEMORY_LIMIT_BYTES);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let config = BelugasConfig::parse(
            r#"
[runtime]
timeout_secs = 60
"#,
        )
        .unwrap();
        assert_eq!(config.runtime.timeout_secs, 60);
        assert_eq!(config.runtime.user, "9000:9000");
        assert_eq!(config.general.log_format, "pretty");
    }

    #[test]
    fn parse_invalid_toml_fails() {
        let err = BelugasConfig::parse("[runtime\n").unwrap_err();
        assert!(matches!(
            err,
            BelugasError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_root_user() {
        let mut config = BelugasConfig::default();
        config.runtime.user = "0:0".to_owned();
        assert!(config.validate().is_err());

        config.runtime.user = "app".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = BelugasConfig::default();
        config.runtime.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_tiny_memory_limit() {
        let mut config = BelugasConfig::default();
        config.runtime.memory_limit_bytes = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_output_format() {
        let mut config = BelugasConfig::default();
        config.output.format = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn legacy_memory_env_overrides_config() {
        // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
        unsafe {
            std::env::set_var(ENV_ENGINE_MEMORY_LIMIT_BYTES, "1024000000");
        }
        let mut config = BelugasConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var(ENV_ENGINE_MEMORY_LIMIT_BYTES);
        }
        assert_eq!(config.runtime.memory_limit_bytes, 1_024_000_000);
    }

    #[test]
    #[serial]
    fn legacy_timeout_env_wins_over_prefixed_env() {
        unsafe {
            std::env::set_var("BELUGAS_RUNTIME_TIMEOUT_SECS", "100");
            std::env::set_var(ENV_CONTAINER_TIMEOUT_SECONDS, "200");
        }
        let mut config = BelugasConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("BELUGAS_RUNTIME_TIMEOUT_SECS");
            std::env::remove_var(ENV_CONTAINER_TIMEOUT_SECONDS);
        }
        assert_eq!(config.runtime.timeout_secs, 200);
    }

    #[test]
    #[serial]
    fn unparseable_env_value_is_ignored() {
        unsafe {
            std::env::set_var(ENV_ENGINE_MEMORY_LIMIT_BYTES, "lots");
        }
        let mut config = BelugasConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var(ENV_ENGINE_MEMORY_LIMIT_BYTES);
        }
        assert_eq!(config.runtime.memory_limit_bytes, DEFAULT_MEMORY_LIMIT_BYTES);
    }

    #[tokio::test]
    #[serial]
    async fn load_or_default_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BelugasConfig::load_or_default(dir.path().join("missing.toml"))
            .await
            .unwrap();
        assert_eq!(config.runtime.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[tokio::test]
    async fn from_file_missing_reports_path() {
        let err = BelugasConfig::from_file("/nonexistent/belugas.toml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/belugas.toml"));
    }
}
