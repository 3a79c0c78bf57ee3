/// A node in one controller's cgroup tree.
///
/// The node is a plain (controller, path) pair; it does not own the
/// directory. Creation is idempotent and removal retries while the
/// kernel still reports EBUSY, which is transient for a short window
/// after the last member task exits.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::{Error, Result};
use crate::subsystem::SubsystemKind;

#[derive(Clone, Debug)]
pub struct CgroupNode {
    kind: SubsystemKind,
    path: PathBuf,
}

impl CgroupNode {
    pub fn new(kind: SubsystemKind, path: PathBuf) -> Self {
        Self { kind, path }
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Idempotent directory creation.
    pub fn create(&self) -> Result<()> {
        log::debug!("mkdir {}", self.path.display());
        match fs::create_dir(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(Error::from_io(&format!("mkdir({})", self.path.display()), e)),
        }
    }

    /// Remove the directory, retrying while EBUSY is transient.
    /// An already-missing directory is not an error.
    pub fn remove(&self, retries: u32, backoff: Duration) -> Result<()> {
        log::debug!("rmdir {}", self.path.display());
        let mut attempt = 0;
        loop {
            match fs::remove_dir(&self.path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    let busy = e.raw_os_error() == Some(libc::EBUSY);
                    if busy && attempt < retries {
                        attempt += 1;
                        std::thread::sleep(backoff);
                        continue;
                    }
                    return Err(Error::from_io(&format!("rmdir({})", self.path.display()), e));
                }
            }
        }
    }

    /// Move a task into this node.
    pub fn attach(&self, pid: Pid) -> Result<()> {
        let tasks = self.path.join("tasks");
        fs::write(&tasks, pid.to_string())
            .map_err(|e| Error::from_io(&format!("attach {} to {}", pid, tasks.display()), e))
    }

    /// Snapshot of the member task (thread) ids. Not stable under
    /// concurrent forks; callers re-read until convergence.
    pub fn member_tasks(&self) -> Result<Vec<Pid>> {
        self.read_pids("tasks")
    }

    /// Snapshot of the member process (thread-group) ids.
    pub fn member_procs(&self) -> Result<Vec<Pid>> {
        self.read_pids("cgroup.procs")
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.member_tasks()?.is_empty())
    }

    /// Signal every member task, ignoring the ones that exit under us.
    pub fn kill_all(&self, signal: Signal) -> Result<()> {
        let pids = self.member_tasks()?;
        log::debug!("kill {} -> {} tasks in {}", signal, pids.len(), self.path.display());
        for pid in pids {
            match kill(pid, signal) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => {
                    return Err(Error::from_errno(&format!("kill({}, {})", pid, signal), e))
                }
            }
        }
        Ok(())
    }

    /// Knob existence doubles as a kernel feature probe.
    pub fn has_knob(&self, name: &str) -> bool {
        self.path.join(name).exists()
    }

    pub fn get_knob(&self, name: &str) -> Result<String> {
        let path = self.path.join(name);
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::from_io(&format!("read {}", path.display()), e))?;
        Ok(raw.trim().to_string())
    }

    pub fn set_knob(&self, name: &str, value: &str) -> Result<()> {
        let path = self.path.join(name);
        fs::write(&path, value)
            .map_err(|e| Error::from_io(&format!("write {}={}", path.display(), value), e))
    }

    fn read_pids(&self, file: &str) -> Result<Vec<Pid>> {
        let path = self.path.join(file);
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::from_io(&format!("read {}", path.display()), e))?;

        let mut pids = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let pid = line
                .parse::<i32>()
                .map_err(|e| Error::Unknown(format!("parse pid {:?} in {}: {}", line, path.display(), e)))?;
            pids.push(Pid::from_raw(pid));
        }
        Ok(pids)
    }
}
