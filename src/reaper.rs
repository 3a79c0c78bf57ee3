/// Reaper: collects SIGCHLD and routes exit statuses into the holder.
///
/// The signal handler only flips an atomic; a dedicated thread drains
/// `waitpid(-1, WNOHANG)` and delivers each (pid, status) through the
/// holder. The reaper records exits and nothing else; the heavy
/// teardown belongs to whoever later calls Stop. It must never take
/// the daemon down with it.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::{Error, Result};
use crate::holder::Holder;
use crate::task::raw_wait_status;

static SIGCHLD_PENDING: AtomicBool = AtomicBool::new(false);

/// Async-signal-safe: one atomic store, nothing else.
extern "C" fn handle_sigchld(_signal: libc::c_int) {
    SIGCHLD_PENDING.store(true, Ordering::SeqCst);
}

/// Install before the first task starts.
pub fn install_sigchld_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGCHLD, &action) }
        .map_err(|e| Error::from_errno("sigaction(SIGCHLD)", e))?;
    log::debug!("SIGCHLD handler installed");
    Ok(())
}

pub struct Reaper {
    thread: Option<JoinHandle<()>>,
    shutdown: Sender<()>,
}

impl Reaper {
    /// Start the reaper thread. It also owns the periodic heartbeat
    /// over all containers.
    pub fn spawn(holder: Arc<Mutex<Holder>>, heartbeat: Duration) -> Reaper {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let thread = std::thread::Builder::new()
            .name("corral-reaper".to_string())
            .spawn(move || {
                let ticker = tick(heartbeat);
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(ticker) -> _ => holder.lock().unwrap().heartbeat(),
                        default(Duration::from_millis(50)) => {}
                    }
                    if SIGCHLD_PENDING.swap(false, Ordering::SeqCst) {
                        drain_exits(&holder);
                    }
                }
                log::debug!("reaper stopped");
            })
            .expect("failed to spawn the reaper thread");

        Reaper {
            thread: Some(thread),
            shutdown: shutdown_tx,
        }
    }

    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

/// Drain every pending exit. Unroutable pids are orphans adopted from
/// the pre-restart world; log and move on.
fn drain_exits(holder: &Arc<Mutex<Holder>>) {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status @ WaitStatus::Exited(..)) | Ok(status @ WaitStatus::Signaled(..)) => {
                let pid = status.pid().expect("terminated status carries a pid");
                let raw = raw_wait_status(&status);
                if holder.lock().unwrap().deliver_exit_status(pid, raw) {
                    log::debug!("delivered exit status {} for pid {}", raw, pid);
                } else {
                    log::info!("reaped unowned pid {} (status {})", pid, raw);
                }
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => {
                log::warn!("waitpid(-1): {}", e);
                break;
            }
        }
    }
}
