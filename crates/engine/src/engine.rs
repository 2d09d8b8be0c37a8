//! 엔진 실행 단위
//!
//! [`Engine`]은 분석 엔진 하나의 실행을 담당합니다:
//!
//! 1. 리스너 합성 (호출자 + 로깅 + 메트릭 + 에러 변환)
//! 2. 임시 파일 생성 (엔진 설정, 누적 탐지 결과 스냅샷)
//! 3. 격리 정책이 적용된 컨테이너 실행 파라미터 구성
//! 4. stdout 청크 → 파싱 → 필터 → 수신자 연결
//! 5. 실행 후 임시 파일 삭제 (모든 종료 경로)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use belugas_core::config::{DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_TIMEOUT_SECS, RuntimeConfig};
use belugas_core::metrics as m;
use belugas_core::types::{FeatureSet, RunHistory, RunRules};

use crate::artifact::{ArtifactFile, MountedPath};
use crate::container::{ContainerRunResult, ContainerSpec, LABEL_KEY, Mount, container_name};
use crate::docker::ContainerRuntime;
use crate::error::{EngineError, RuntimeError};
use crate::listener::{
    CompositeContainerListener, ContainerListener, LoggingContainerListener,
    MetricsContainerListener, RaisingContainerListener,
};
use crate::output::{EngineOutput, EngineOutputFilter};
use crate::sink::ResultSink;
use crate::stream::StreamControl;

/// 기본 채널
pub const DEFAULT_CHANNEL: &str = "stable";

/// 분석 대상 소스 코드 마운트 경로
pub const CODE_MOUNT_PATH: &str = "/code";

/// 엔진 설정 마운트 경로
pub const CONFIG_MOUNT_PATH: &str = "/config.json";

/// 이전 엔진 탐지 결과 마운트 경로
pub const PREVIOUS_RESULTS_MOUNT_PATH: &str = "/previous-engine-results.json";

/// 엔진 이미지/명령 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineMetadata {
    /// 채널 구분이 없는 엔진의 이미지
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// 실행 명령 (비어 있으면 이미지 기본값)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// 채널 → 이미지
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, String>,
}

impl EngineMetadata {
    /// 채널에 해당하는 이미지를 찾습니다.
    ///
    /// 채널 목록이 있으면 목록에서만 찾고, 없으면 `image`를 사용합니다.
    pub fn image_for(&self, channel: &str) -> Option<&str> {
        if self.channels.is_empty() {
            self.image.as_deref()
        } else {
            self.channels.get(channel).map(String::as_str)
        }
    }

    /// 설정된 채널 이름 목록
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }
}

/// 엔진 실행 설명자
///
/// 설정 빌더가 만들어 오케스트레이터에 넘깁니다.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDescriptor {
    /// 엔진 이름
    pub name: String,
    /// 이미지/명령 메타데이터
    pub metadata: EngineMetadata,
    /// 분석 대상 소스 경로 (호스트 기준)
    pub code_path: PathBuf,
    /// 컨테이너에 전달할 엔진 설정 (JSON 객체)
    pub config: Value,
    /// 감사용 라벨
    pub label: String,
    /// 실행 전제 조건
    pub run_rules: RunRules,
}

impl EngineDescriptor {
    /// 최소 정보로 설명자를 생성합니다.
    pub fn new(name: impl Into<String>, metadata: EngineMetadata, code_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            metadata,
            code_path: code_path.into(),
            config: Value::Object(serde_json::Map::new()),
            label: String::new(),
            run_rules: RunRules::default(),
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// 라벨을 지정합니다.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// 실행 전제 조건을 지정합니다.
    pub fn with_run_rules(mut self, run_rules: RunRules) -> Self {
        self.run_rules = run_rules;
        self
    }

    /// 설정의 `channel` 값 (기본 `stable`)
    pub fn channel(&self) -> &str {
        self.config
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CHANNEL)
    }

    /// `name:channel`
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.name, self.channel())
    }
}

/// 엔진 런타임 옵션
///
/// 환경 변수는 프로세스 시작 시 [`belugas_core::BelugasConfig`]에서 한 번만 읽고,
/// 이 값으로 각 엔진에 전달됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRuntimeOptions {
    /// 메모리 제한 (바이트)
    pub memory_limit_bytes: u64,
    /// 실행 시간 제한
    pub timeout: Duration,
    /// 실행 사용자 (`uid:gid`)
    pub user: String,
    /// 임시 파일 디렉토리
    pub tmp: MountedPath,
    /// stderr 수집 최대 크기
    pub max_stderr_bytes: usize,
}

impl Default for EngineRuntimeOptions {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user: "9000:9000".to_owned(),
            tmp: MountedPath::local(std::env::temp_dir().join("belugas")),
            max_stderr_bytes: 64 * 1024,
        }
    }
}

impl EngineRuntimeOptions {
    /// 런타임 설정에서 옵션을 생성합니다.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            memory_limit_bytes: config.memory_limit_bytes,
            timeout: Duration::from_secs(config.timeout_secs),
            user: config.user.clone(),
            tmp: MountedPath::new(&config.tmp_host_dir, &config.tmp_container_dir),
            max_stderr_bytes: config.max_stderr_bytes,
        }
    }

    /// 임시 디렉토리를 지정합니다.
    pub fn with_tmp(mut self, tmp: MountedPath) -> Self {
        self.tmp = tmp;
        self
    }

    /// 실행 시간 제한을 지정합니다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 메모리 제한을 지정합니다.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }
}

/// 엔진 실행 단위
pub struct Engine<R: ContainerRuntime> {
    descriptor: EngineDescriptor,
    runtime: Arc<R>,
    options: EngineRuntimeOptions,
    filter: EngineOutputFilter,
}

impl<R: ContainerRuntime> Engine<R> {
    /// 엔진을 생성합니다.
    pub fn new(descriptor: EngineDescriptor, runtime: Arc<R>, options: EngineRuntimeOptions) -> Self {
        let filter = EngineOutputFilter::new(&descriptor.config);
        Self {
            descriptor,
            runtime,
            options,
            filter,
        }
    }

    /// 엔진 이름
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// `name:channel`
    pub fn qualified_name(&self) -> String {
        self.descriptor.qualified_name()
    }

    /// 설명자
    pub fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    /// 실행 전제 조건이 충족되었는지 확인합니다.
    ///
    /// 규칙이 없으면 항상 `true`입니다. 그렇지 않으면 선행 엔진이 모두 실행되었고
    /// 선행 기능이 모두 탐지되었어야 합니다.
    pub fn can_run(&self, history: &RunHistory) -> bool {
        self.descriptor.run_rules.is_empty() || self.descriptor.run_rules.satisfied_by(history)
    }

    /// 컨테이너 실행 파라미터를 구성합니다.
    pub fn container_spec(&self, config_file: &MountedPath, features_file: &MountedPath) -> ContainerSpec {
        let descriptor = &self.descriptor;
        let channel = descriptor.channel();
        let image = descriptor.metadata.image_for(channel).map(str::to_owned);

        let mut spec = ContainerSpec::isolated(container_name(&descriptor.name, channel), image)
            .with_memory_limit(self.options.memory_limit_bytes)
            .with_label(LABEL_KEY, descriptor.label.as_str())
            .with_mount(Mount::read_only(
                descriptor.code_path.display().to_string(),
                CODE_MOUNT_PATH,
            ))
            .with_mount(Mount::read_only(
                config_file.host_path().display().to_string(),
                CONFIG_MOUNT_PATH,
            ))
            .with_mount(Mount::read_only(
                features_file.host_path().display().to_string(),
                PREVIOUS_RESULTS_MOUNT_PATH,
            ));
        spec.command = descriptor.metadata.command.clone();
        spec.user = self.options.user.clone();
        spec.timeout = self.options.timeout;
        spec.max_stderr_bytes = self.options.max_stderr_bytes;
        spec
    }

    /// 엔진을 실행합니다.
    ///
    /// 유효하고 필터되지 않은 출력은 `sink.write`로, 잘못된 출력은 `sink.failed`로
    /// 전달됩니다. 임시 파일은 반환 경로와 무관하게 삭제됩니다.
    ///
    /// # Errors
    ///
    /// - `EngineError::Failure`: 컨테이너 비정상 종료
    /// - `EngineError::Timeout`: 실행 시간 제한 초과
    /// - `EngineError::ImageRequired`: 채널에 맞는 이미지 없음
    /// - `EngineError::Runtime`, `EngineError::Artifact`: 시작 전 실패
    pub async fn run(
        &self,
        features: &FeatureSet,
        sink: &mut dyn ResultSink,
        listener: Arc<dyn ContainerListener>,
    ) -> Result<ContainerRunResult, EngineError> {
        let qualified = self.qualified_name();

        let raising = Arc::new(
            RaisingContainerListener::new(qualified.as_str())
                .with_timeout_budget(self.options.timeout),
        );
        let composite = CompositeContainerListener::new(vec![
            listener,
            Arc::new(LoggingContainerListener::new(qualified.as_str())),
            Arc::new(MetricsContainerListener::new(&qualified)),
            raising.clone(),
        ]);

        let config_json = serde_json::to_vec(&self.descriptor.config).map_err(|e| {
            EngineError::Artifact {
                path: CONFIG_MOUNT_PATH.to_owned(),
                reason: e.to_string(),
            }
        })?;
        let features_json = serde_json::to_vec(features).map_err(|e| EngineError::Artifact {
            path: PREVIOUS_RESULTS_MOUNT_PATH.to_owned(),
            reason: e.to_string(),
        })?;

        // 두 가드는 함수가 끝날 때 drop되어 파일을 삭제한다
        let config_file = ArtifactFile::write(self.artifact_path(), &config_json).await?;
        let features_file = ArtifactFile::write(self.artifact_path(), &features_json).await?;

        tracing::debug!(
            engine = %qualified,
            config = %String::from_utf8_lossy(&config_json),
            "engine config"
        );

        let spec = self.container_spec(config_file.path(), features_file.path());
        let metric_label = m::engine_label(&qualified);

        let mut handle_output = |chunk: &[u8]| -> StreamControl {
            let Some(output) = EngineOutput::parse(Bytes::copy_from_slice(chunk)) else {
                return StreamControl::Continue;
            };

            if let Some(message) = output.error_message() {
                metrics::counter!(m::ENGINE_INVALID_OUTPUTS_TOTAL, m::LABEL_ENGINE => metric_label.clone())
                    .increment(1);
                tracing::warn!(engine = %qualified, error = %message, "invalid engine output");
                sink.failed(&format!("{qualified} produced invalid output: {message}"));
                return StreamControl::Stop;
            }

            if self.filter.filter(&output) {
                metrics::counter!(m::ENGINE_FILTERED_OUTPUTS_TOTAL, m::LABEL_ENGINE => metric_label.clone())
                    .increment(1);
                return StreamControl::Continue;
            }

            let output = output.attribute_to(&self.descriptor.name);
            if sink.write(&output) {
                StreamControl::Continue
            } else {
                tracing::debug!(engine = %qualified, "sink declined further output");
                StreamControl::Stop
            }
        };

        let result = match self.runtime.run(&spec, &composite, &mut handle_output).await {
            Ok(result) => result,
            Err(RuntimeError::ImageRequired { reason, .. }) => {
                return Err(EngineError::ImageRequired(
                    self.image_required_message(spec.image.as_deref(), &reason),
                ));
            }
            Err(source) => {
                return Err(EngineError::Runtime {
                    engine: qualified,
                    source,
                });
            }
        };

        if let Some(err) = raising.take_error() {
            return Err(err);
        }
        Ok(result)
    }

    fn artifact_path(&self) -> MountedPath {
        self.options.tmp.join(uuid::Uuid::new_v4().to_string())
    }

    /// 채널에 이미지가 없으면 채널 목록을, 이미지가 있었는데 런타임이 찾지 못했으면
    /// 이미지 이름과 런타임의 사유를 함께 보여줍니다.
    fn image_required_message(&self, image: Option<&str>, reason: &str) -> String {
        match image {
            Some(image) => format!(
                "Unable to find image {image} for {}: {reason}. Available channels: {:?}.",
                self.qualified_name(),
                self.descriptor.metadata.channel_names()
            ),
            None => format!(
                "Unable to find an image for {}. Available channels: {:?}.",
                self.qualified_name(),
                self.descriptor.metadata.channel_names()
            ),
        }
    }
}
