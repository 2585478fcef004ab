use super::{ApplyError, WorkloadControl};
use crate::synthesis::RuntimeConfiguration;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct FileWorkloadState {
    applied_image: Option<String>,
    running_image: Option<String>,
    artifacts: BTreeSet<String>,
    restarts: u64,
}

/// Workload whose configuration is a JSON file on disk.
///
/// `apply` replaces the file atomically, after writing any artifacts into the
/// same directory; `restart` promotes the applied image to the running one.
pub struct FileWorkload {
    path: PathBuf,
    state: Mutex<FileWorkloadState>,
}

impl FileWorkload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileWorkloadState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn restarts(&self) -> u64 {
        self.state.lock().expect("file workload state poisoned").restarts
    }

    /// Directory artifacts are resolved against.
    pub fn artifact_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), ApplyError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = staging_path(path);
    tokio::fs::write(&staging, contents).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}

#[async_trait]
impl WorkloadControl for FileWorkload {
    async fn apply(&self, config: &RuntimeConfiguration) -> Result<(), ApplyError> {
        let rendered = config
            .to_pretty_json()
            .map_err(|err| ApplyError::Workload(err.to_string()))?;

        for (relative, artifact) in &config.artifacts {
            let target = self.artifact_dir().join(relative);
            write_atomically(&target, &artifact.contents).await?;
            tracing::debug!(
                path = %target.display(),
                relation = artifact.relation.as_str(),
                sha256 = artifact.sha256.as_str(),
                "workload artifact written"
            );
        }

        write_atomically(&self.path, rendered.as_bytes()).await?;

        let current: BTreeSet<String> = config.artifacts.keys().cloned().collect();
        let previous = {
            let mut state = self.state.lock().expect("file workload state poisoned");
            state.applied_image = Some(config.image().to_string());
            std::mem::replace(&mut state.artifacts, current.clone())
        };
        let stale = previous.difference(&current);
        for relative in stale {
            let target = self.artifact_dir().join(relative);
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            image = config.image(),
            artifacts = config.artifacts.len(),
            "workload configuration written"
        );
        Ok(())
    }

    async fn restart(&self) -> Result<(), ApplyError> {
        let mut state = self.state.lock().expect("file workload state poisoned");
        if state.applied_image.is_none() {
            return Err(ApplyError::Workload(
                "restart requested before any configuration was applied".to_string(),
            ));
        }
        state.running_image = state.applied_image.clone();
        state.restarts += 1;
        Ok(())
    }

    async fn current_image_ref(&self) -> Result<Option<String>, ApplyError> {
        Ok(self
            .state
            .lock()
            .expect("file workload state poisoned")
            .running_image
            .clone())
    }
}
