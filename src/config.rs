/// Daemon configuration with conservative defaults.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mount base of the cgroup-v1 hierarchies.
    pub cgroup_base: PathBuf,
    /// Fixed engine-root directory created under every controller mount.
    pub engine_root: String,
    /// Directory holding one persisted spec blob per container.
    pub store_dir: PathBuf,
    /// Runtime directory for default stdio targets.
    pub run_dir: PathBuf,
    /// Daemon pid file.
    pub pid_file: PathBuf,
    /// Grace period between SIGTERM and the freeze+SIGKILL escalation.
    pub kill_grace_ms: u64,
    /// Deadline for a freezer FROZEN/THAWED transition to complete.
    pub freeze_deadline_ms: u64,
    /// Deadline for the freezer cgroup to drain after SIGKILL.
    pub drain_deadline_ms: u64,
    /// How often to retry rmdir while the kernel reports EBUSY.
    pub rmdir_retries: u32,
    pub rmdir_backoff_ms: u64,
    /// Period of the housekeeping pass over all containers.
    pub heartbeat_ms: u64,
    /// File-backed stdio is rotated once it exceeds this many bytes.
    pub stdio_rotate_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cgroup_base: PathBuf::from("/sys/fs/cgroup"),
            engine_root: "corral".to_string(),
            store_dir: PathBuf::from("/var/lib/corral/specs"),
            run_dir: PathBuf::from("/run/corral"),
            pid_file: PathBuf::from("/run/corrald.pid"),
            kill_grace_ms: 1000,
            freeze_deadline_ms: 3000,
            drain_deadline_ms: 5000,
            rmdir_retries: 10,
            rmdir_backoff_ms: 100,
            heartbeat_ms: 5000,
            stdio_rotate_limit: 10 * 1024 * 1024, // 10 MB per stream
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::from_io(&format!("read config {}", path.display()), e))?;
        serde_json::from_str(&data)
            .map_err(|e| Error::InvalidValue(format!("config {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.engine_root, "corral");
        assert!(cfg.kill_grace_ms > 0);
        assert!(cfg.rmdir_retries > 0);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"kill_grace_ms": 250}"#).unwrap();
        assert_eq!(cfg.kill_grace_ms, 250);
        assert_eq!(cfg.engine_root, "corral");
    }

    #[test]
    fn load_missing_file_is_io() {
        let err = Config::load(Path::new("/nonexistent/corral.json")).unwrap_err();
        assert_eq!(err.kind(), "IO");
    }
}
