//! belugas.toml 통합 설정 테스트
//!
//! - belugas.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 파일 로딩 / 잘못된 형식 에러 테스트

use belugas_core::config::{BelugasConfig, DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_TIMEOUT_SECS};
use belugas_core::error::{BelugasError, ConfigError};

/// 환경변수를 설정한 채로 `f`를 실행하고 원래 값으로 되돌립니다.
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let originals: Vec<_> = vars
        .iter()
        .map(|(key, _)| (*key, std::env::var(key).ok()))
        .collect();
    // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
    unsafe {
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        for (key, original) in originals {
            match original {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }
    }
    result
}

// =============================================================================
// belugas.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../belugas.toml.example");
    let config = BelugasConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.runtime.tmp_host_dir, "/tmp/belugas");
    assert_eq!(config.output.format, "json");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../belugas.toml.example");
    let config = BelugasConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../belugas.toml.example");
    let example = BelugasConfig::parse(content).expect("should parse");
    let defaults = BelugasConfig::default();

    assert_eq!(example.general.log_level, defaults.general.log_level);
    assert_eq!(example.general.log_format, defaults.general.log_format);
    assert_eq!(example.runtime.docker_socket, defaults.runtime.docker_socket);
    assert_eq!(
        example.runtime.memory_limit_bytes,
        defaults.runtime.memory_limit_bytes
    );
    assert_eq!(example.runtime.timeout_secs, defaults.runtime.timeout_secs);
    assert_eq!(example.runtime.user, defaults.runtime.user);
    assert_eq!(
        example.runtime.max_stderr_bytes,
        defaults.runtime.max_stderr_bytes
    );
    assert_eq!(example.output.format, defaults.output.format);
    assert_eq!(
        example.output.max_findings_per_engine,
        defaults.output.max_findings_per_engine
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_runtime_only() {
    let toml = r#"
[runtime]
timeout_secs = 60
"#;
    let config = BelugasConfig::parse(toml).expect("should parse");

    assert_eq!(config.runtime.timeout_secs, 60);
    assert_eq!(config.runtime.memory_limit_bytes, DEFAULT_MEMORY_LIMIT_BYTES);
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.output.format, "json");
}

#[test]
fn partial_config_output_only() {
    let toml = r#"
[output]
format = "text"
"#;
    let config = BelugasConfig::parse(toml).expect("should parse");

    assert_eq!(config.output.format, "text");
    assert_eq!(config.output.max_findings_per_engine, 10_000);
    assert_eq!(config.runtime.timeout_secs, DEFAULT_TIMEOUT_SECS);
    config.validate().expect("partial config should validate");
}

#[test]
fn separate_host_and_container_tmp_dirs() {
    let toml = r#"
[runtime]
tmp_host_dir = "/var/lib/belugas/tmp"
tmp_container_dir = "/tmp/belugas"
"#;
    let config = BelugasConfig::parse(toml).expect("should parse");

    assert_eq!(config.runtime.tmp_host_dir, "/var/lib/belugas/tmp");
    assert_eq!(config.runtime.tmp_container_dir, "/tmp/belugas");
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;
    let result = with_env(&[("BELUGAS_GENERAL_LOG_LEVEL", "error")], || {
        let mut config = BelugasConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let result = with_env(&[("BELUGAS_OUTPUT_MAX_FINDINGS_PER_ENGINE", "25")], || {
        let mut config = BelugasConfig::default();
        config.apply_env_overrides();
        config.output.max_findings_per_engine
    });

    assert_eq!(result, 25);
}

#[test]
#[serial_test::serial]
fn legacy_engine_env_names_are_honoured() {
    let (memory, timeout) = with_env(
        &[
            ("ENGINE_MEMORY_LIMIT_BYTES", "256000000"),
            ("CONTAINER_TIMEOUT_SECONDS", "120"),
        ],
        || {
            let mut config = BelugasConfig::default();
            config.apply_env_overrides();
            (config.runtime.memory_limit_bytes, config.runtime.timeout_secs)
        },
    );

    assert_eq!(memory, 256_000_000);
    assert_eq!(timeout, 120);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[runtime]
user = "1000:1000"
"#;
    let user = with_env(&[], || {
        // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
        unsafe {
            std::env::remove_var("BELUGAS_RUNTIME_USER");
        }
        let mut config = BelugasConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.runtime.user
    });

    assert_eq!(user, "1000:1000");
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_reads_and_validates_file() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("belugas.toml");
    std::fs::write(&path, "[runtime]\ntimeout_secs = 30\n").expect("should write config");

    let config = BelugasConfig::load(&path).await.expect("should load");
    assert_eq!(config.runtime.timeout_secs, 30);
}

#[tokio::test]
#[serial_test::serial]
async fn load_rejects_invalid_value() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("belugas.toml");
    std::fs::write(&path, "[runtime]\nuser = \"0:0\"\n").expect("should write config");

    let err = BelugasConfig::load(&path).await.unwrap_err();
    assert!(matches!(
        err,
        BelugasError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "runtime.user"
    ));
}

#[tokio::test]
async fn load_missing_file_is_not_found() {
    let err = BelugasConfig::load("/nonexistent/belugas.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BelugasError::Config(ConfigError::FileNotFound { .. })
    ));
}

// =============================================================================
// 에러 케이스 테스트
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = BelugasConfig::parse("").expect("empty config should parse");
    assert_eq!(config.runtime.user, "9000:9000");
}

#[test]
fn comments_only_parses_with_defaults() {
    let config = BelugasConfig::parse("# nothing here\n# [runtime]\n").expect("should parse");
    assert_eq!(config.output.format, "json");
}

#[test]
fn malformed_toml_returns_parse_error() {
    let err = BelugasConfig::parse("[runtime\ntimeout_secs = 1").unwrap_err();
    assert!(matches!(
        err,
        BelugasError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let err = BelugasConfig::parse("[runtime]\ntimeout_secs = \"soon\"\n").unwrap_err();
    assert!(matches!(
        err,
        BelugasError::Config(ConfigError::ParseFailed { .. })
    ));
}
