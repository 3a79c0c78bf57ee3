/// Daemon wiring: bring the engine up in the right order, park until a
/// termination signal, and tear the process (not the containers) down.
///
/// Startup: subsystems -> store -> holder + root container ->
/// restore_all -> SIGCHLD handler -> reaper. Shutdown stops the reaper
/// and leaves containers running; the next daemon adopts them through
/// Restore.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::holder::Holder;
use crate::reaper::{self, Reaper};
use crate::store::{FsStore, SpecStore};
use crate::subsystem::Registry;
use crate::task::read_comm;

pub struct Daemon {
    holder: Arc<Mutex<Holder>>,
    reaper: Option<Reaper>,
}

impl Daemon {
    pub fn start(config: Config) -> Result<Daemon> {
        let config = Arc::new(config);
        let registry = Registry::initialize(&config)?;
        let store: Arc<dyn SpecStore> = Arc::new(FsStore::open(&config.store_dir)?);

        let mut holder = Holder::new(registry, config.clone(), store);
        holder.create_root()?;
        holder.restore_all()?;
        let holder = Arc::new(Mutex::new(holder));

        reaper::install_sigchld_handler()?;
        let reaper = Reaper::spawn(
            holder.clone(),
            Duration::from_millis(config.heartbeat_ms),
        );

        log::info!("engine up, {} containers", holder.lock().unwrap().list().len());
        Ok(Daemon {
            holder,
            reaper: Some(reaper),
        })
    }

    /// The engine handle the RPC front-end calls into. The mutex is
    /// the engine lock.
    pub fn holder(&self) -> Arc<Mutex<Holder>> {
        self.holder.clone()
    }

    pub fn shutdown(mut self) {
        log::info!("shutting down; containers stay running for the next restore");
        if let Some(reaper) = self.reaper.take() {
            reaper.stop();
        }
    }
}

// Termination signals, in the same one-atomic-store discipline as the
// SIGCHLD path.

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_term(_signal: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn install_term_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_term),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { sigaction(signal, &action) }
            .map_err(|e| Error::from_errno(&format!("sigaction({})", signal), e))?;
    }
    Ok(())
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Park the main thread until SIGINT/SIGTERM arrives.
pub fn wait_for_shutdown(poll: Duration) {
    while !shutdown_requested() {
        std::thread::sleep(poll);
    }
}

/// Pid file with identity verification: a recycled pid does not count
/// as a running daemon unless its comm matches too.
pub struct PidFile {
    path: PathBuf,
    name: String,
}

impl PidFile {
    pub fn new(path: &Path, name: &str) -> PidFile {
        PidFile {
            path: path.to_path_buf(),
            name: name.to_string(),
        }
    }

    pub fn running(&self) -> bool {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        let Ok(pid) = raw.trim().parse::<i32>() else {
            return false;
        };
        let pid = Pid::from_raw(pid);
        if matches!(kill(pid, None), Err(Errno::ESRCH)) {
            return false;
        }
        read_comm(pid).map(|comm| comm == self.name).unwrap_or(false)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::from_io(&format!("mkdir {}", parent.display()), e))?;
        }
        std::fs::write(&self.path, std::process::id().to_string())
            .map_err(|e| Error::from_io(&format!("write {}", self.path.display()), e))
    }

    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_pid_file(test: &str, name: &str) -> PidFile {
        let dir = std::env::temp_dir().join("corral-daemon-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(test);
        let _ = std::fs::remove_file(&path);
        PidFile::new(&path, name)
    }

    #[test]
    fn missing_pid_file_is_not_running() {
        let pf = scratch_pid_file("missing.pid", "corrald");
        assert!(!pf.running());
    }

    #[test]
    fn own_pid_with_matching_comm_is_running() {
        let own_comm = std::fs::read_to_string("/proc/self/comm")
            .unwrap()
            .trim_end()
            .to_string();
        let pf = scratch_pid_file("own.pid", &own_comm);
        pf.save().unwrap();
        assert!(pf.running());
        pf.remove();
        assert!(!pf.running());
    }

    #[test]
    fn comm_mismatch_is_not_running() {
        let pf = scratch_pid_file("mismatch.pid", "definitely_not_this_process");
        pf.save().unwrap();
        assert!(!pf.running());
        pf.remove();
    }

    #[test]
    fn garbage_pid_file_is_not_running() {
        let pf = scratch_pid_file("garbage.pid", "corrald");
        std::fs::write(&pf.path, "not-a-pid").unwrap();
        assert!(!pf.running());
        pf.remove();
    }
}
