//! 컨테이너 실행 파라미터와 실행 결과 타입

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::stream::OUTPUT_DELIMITER;

/// 감사용 라벨 키
pub const LABEL_KEY: &str = "com.belugas.label";

/// 엔진 컨테이너 이름 접두어
pub const CONTAINER_NAME_PREFIX: &str = "belugas-engines";

/// 바인드 마운트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// 호스트 경로
    pub host: String,
    /// 컨테이너 내부 경로
    pub container: String,
    /// 읽기 전용 여부
    pub read_only: bool,
}

impl Mount {
    /// 읽기 전용 마운트를 생성합니다.
    pub fn read_only(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }

    /// Docker `binds` 형식 (`host:container[:ro]`)
    pub fn to_bind(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host, self.container)
        } else {
            format!("{}:{}", self.host, self.container)
        }
    }
}

/// 컨테이너 실행 파라미터
///
/// 런타임 드라이버에 전달되는 격리/자원 정책 전체를 담습니다.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// 컨테이너 이름
    pub name: String,
    /// 이미지 (없으면 런타임이 `ImageRequired`를 반환)
    pub image: Option<String>,
    /// 실행 명령 (비어 있으면 이미지 기본값)
    pub command: Vec<String>,
    /// 실행 사용자 (`uid:gid`)
    pub user: String,
    /// 컨테이너 라벨
    pub labels: BTreeMap<String, String>,
    /// 바인드 마운트
    pub mounts: Vec<Mount>,
    /// 제거할 capability 목록
    pub cap_drop: Vec<String>,
    /// 네트워크 모드
    pub network_mode: String,
    /// 메모리 제한 (바이트)
    pub memory_bytes: u64,
    /// 메모리 + 스왑 제한 (바이트). `memory_bytes`와 같으면 스왑 없음
    pub memory_swap_bytes: u64,
    /// 종료 후 컨테이너 자동 제거
    pub auto_remove: bool,
    /// 실행 시간 제한
    pub timeout: Duration,
    /// stdout 청크 구분자
    pub output_delimiter: u8,
    /// stderr 수집 최대 크기
    pub max_stderr_bytes: usize,
}

impl ContainerSpec {
    /// 격리 정책 기본값으로 실행 파라미터를 생성합니다.
    ///
    /// 모든 capability 제거, 네트워크 없음, 스왑 없음, 종료 후 자동 제거.
    pub fn isolated(name: impl Into<String>, image: Option<String>) -> Self {
        Self {
            name: name.into(),
            image,
            command: Vec::new(),
            user: "9000:9000".to_owned(),
            labels: BTreeMap::new(),
            mounts: Vec::new(),
            cap_drop: vec!["all".to_owned()],
            network_mode: "none".to_owned(),
            memory_bytes: belugas_core::config::DEFAULT_MEMORY_LIMIT_BYTES,
            memory_swap_bytes: belugas_core::config::DEFAULT_MEMORY_LIMIT_BYTES,
            auto_remove: true,
            timeout: Duration::from_secs(belugas_core::config::DEFAULT_TIMEOUT_SECS),
            output_delimiter: OUTPUT_DELIMITER,
            max_stderr_bytes: 64 * 1024,
        }
    }

    /// 메모리 제한을 설정하고 스왑을 비활성화합니다.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self.memory_swap_bytes = bytes;
        self
    }

    /// 라벨을 추가합니다.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// 마운트를 추가합니다.
    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Docker `binds` 목록
    pub fn binds(&self) -> Vec<String> {
        self.mounts.iter().map(Mount::to_bind).collect()
    }

    /// 동일한 `docker run` 플래그 목록 (진단 로그용)
    pub fn docker_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        for cap in &self.cap_drop {
            flags.push("--cap-drop".to_owned());
            flags.push(cap.clone());
        }
        for (key, value) in &self.labels {
            flags.push("--label".to_owned());
            flags.push(format!("{key}={value}"));
        }
        flags.push("--memory".to_owned());
        flags.push(self.memory_bytes.to_string());
        flags.push("--memory-swap".to_owned());
        flags.push(self.memory_swap_bytes.to_string());
        flags.push("--net".to_owned());
        flags.push(self.network_mode.clone());
        if self.auto_remove {
            flags.push("--rm".to_owned());
        }
        for mount in &self.mounts {
            flags.push("--volume".to_owned());
            flags.push(mount.to_bind());
        }
        flags.push("--user".to_owned());
        flags.push(self.user.clone());
        flags
    }

    /// 리스너에 전달되는 식별 정보
    pub fn data(&self) -> ContainerData {
        ContainerData {
            image: self.image.clone().unwrap_or_default(),
            name: self.name.clone(),
        }
    }
}

/// 리스너 이벤트에 포함되는 컨테이너 식별 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerData {
    /// 이미지
    pub image: String,
    /// 컨테이너 이름
    pub name: String,
}

impl fmt::Display for ContainerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.image)
    }
}

/// 컨테이너 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRunResult {
    /// 종료 코드 (확인할 수 없으면 `None`)
    pub exit_status: Option<i64>,
    /// 수집된 stderr
    pub stderr: String,
    /// 실행 시간
    pub duration: Duration,
    /// 시간 제한 초과로 종료됨
    pub timed_out: bool,
    /// 출력 소비자가 중지를 요청함
    pub stopped: bool,
    /// 시작 이후 발생한 런타임 에러
    pub error: Option<String>,
}

impl ContainerRunResult {
    /// 정상 종료 여부
    ///
    /// 소비자가 중지를 요청한 경우 종료 코드와 무관하게 정상으로 봅니다.
    pub fn is_success(&self) -> bool {
        if self.timed_out || self.error.is_some() {
            return false;
        }
        self.stopped || self.exit_status == Some(0)
    }
}

/// 컨테이너 이름을 생성합니다: `belugas-engines-<name>-<channel>-<uuid>`
pub fn container_name(name: &str, channel: &str) -> String {
    let sanitized: String = format!("{name}-{channel}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{CONTAINER_NAME_PREFIX}-{sanitized}-{}", uuid::Uuid::new_v4())
}
