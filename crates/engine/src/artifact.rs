//! 엔진 실행 중에만 존재하는 임시 파일
//!
//! belugas 자체가 컨테이너 안에서 실행되는 경우(docker-in-docker), 파일을 쓰는
//! 경로와 엔진 컨테이너에 마운트하는 호스트 경로가 다릅니다. [`MountedPath`]는
//! 두 경로를 함께 다루고, [`ArtifactFile`]은 drop 시 파일을 삭제합니다.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// 호스트 경로와 belugas 프로세스 기준 경로의 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedPath {
    host: PathBuf,
    container: PathBuf,
}

impl MountedPath {
    /// 두 경로를 지정하여 생성합니다.
    pub fn new(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }

    /// 호스트와 프로세스 경로가 같은 경우
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            host: path.clone(),
            container: path,
        }
    }

    /// 하위 경로
    pub fn join(&self, name: impl AsRef<Path>) -> Self {
        Self {
            host: self.host.join(name.as_ref()),
            container: self.container.join(name.as_ref()),
        }
    }

    /// 엔진 컨테이너에 마운트할 호스트 경로
    pub fn host_path(&self) -> &Path {
        &self.host
    }

    /// belugas 프로세스가 읽고 쓰는 경로
    pub fn container_path(&self) -> &Path {
        &self.container
    }
}

/// drop 시 삭제되는 임시 파일
#[derive(Debug)]
pub struct ArtifactFile {
    path: MountedPath,
}

impl ArtifactFile {
    /// 파일을 쓰고 가드를 반환합니다. 상위 디렉토리가 없으면 생성합니다.
    pub async fn write(path: MountedPath, contents: impl AsRef<[u8]>) -> Result<Self, EngineError> {
        let target = path.container_path().to_path_buf();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| artifact_error(parent, &e))?;
        }

        // 쓰기가 중간에 실패해도 파일이 남지 않도록 가드를 먼저 만든다
        let guard = Self { path };
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| artifact_error(&target, &e))?;
        Ok(guard)
    }

    /// 파일 경로
    pub fn path(&self) -> &MountedPath {
        &self.path
    }
}

impl Drop for ArtifactFile {
    fn drop(&mut self) {
        let target = self.path.container_path();
        match std::fs::remove_file(target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %target.display(),
                    error = %e,
                    "failed to remove engine artifact"
                );
            }
        }
    }
}

fn artifact_error(path: &Path, err: &io::Error) -> EngineError {
    EngineError::Artifact {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_applies_to_both_roots() {
        let tmp = MountedPath::new("/host/tmp", "/tmp/belugas");
        let file = tmp.join("abc");
        assert_eq!(file.host_path(), Path::new("/host/tmp/abc"));
        assert_eq!(file.container_path(), Path::new("/tmp/belugas/abc"));
    }

    #[test]
    fn local_uses_same_path() {
        let path = MountedPath::local("/tmp/x");
        assert_eq!(path.host_path(), path.container_path());
    }

    #[tokio::test]
    async fn artifact_is_written_and_removed_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = MountedPath::local(dir.path()).join("config.json");

        let artifact = ArtifactFile::write(path.clone(), b"{}").await.expect("write");
        let written = std::fs::read(path.container_path()).expect("read");
        assert_eq!(written, b"{}");

        drop(artifact);
        assert!(!path.container_path().exists());
    }

    #[tokio::test]
    async fn missing_parent_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = MountedPath::local(dir.path().join("nested/deeper")).join("f");
        let artifact = ArtifactFile::write(path.clone(), "[]").await.expect("write");
        assert!(artifact.path().container_path().exists());
    }

    #[tokio::test]
    async fn drop_ignores_already_removed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = MountedPath::local(dir.path()).join("gone");
        let artifact = ArtifactFile::write(path.clone(), "x").await.expect("write");
        std::fs::remove_file(path.container_path()).expect("remove");
        drop(artifact);
    }

    #[tokio::test]
    async fn write_failure_is_artifact_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // 디렉토리 경로에 파일을 쓰면 실패
        let path = MountedPath::local(dir.path());
        let err = ArtifactFile::write(path, "x").await.expect_err("must fail");
        assert!(matches!(err, EngineError::Artifact { .. }));
        assert!(dir.path().exists());
    }
}
