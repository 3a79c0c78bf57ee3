/// Task runner: forks the container's root process, performs the
/// post-fork pre-exec setup, and tracks its exit.
///
/// The parent and child share a CLOEXEC socketpair. The child reports
/// `(stage, errno)` on any setup failure and `_exit`s; a successful
/// exec closes the child end and the parent reads EOF. Everything the
/// child needs (argv, envp, knob paths) is built BEFORE fork: between
/// fork and exec the child calls only async-signal-safe operations,
/// no allocation, no locks.
use std::ffi::{CStr, CString};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::linux::fs::MetadataExt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Group, Pid, User};

use crate::cgroup::CgroupNode;
use crate::error::{Error, Result};

/// How long the parent waits for the child's setup verdict.
const START_TIMEOUT: Duration = Duration::from_secs(30);

/// The kernel truncates /proc/<pid>/comm to this many bytes.
const COMM_LEN: usize = 15;

/// Serializes fork against concurrent task starts. Held only across
/// the fork itself.
static FORK_LOCK: Mutex<()> = Mutex::new(());

/// Where in the pre-exec sequence the child failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartStage {
    Setsid = 1,
    OomScore = 2,
    CgroupAttach = 3,
    Groups = 4,
    Gid = 5,
    Uid = 6,
    Stdio = 7,
    Chdir = 8,
    Chroot = 9,
    Exec = 10,
}

impl StartStage {
    fn from_code(code: i32) -> Option<StartStage> {
        match code {
            1 => Some(StartStage::Setsid),
            2 => Some(StartStage::OomScore),
            3 => Some(StartStage::CgroupAttach),
            4 => Some(StartStage::Groups),
            5 => Some(StartStage::Gid),
            6 => Some(StartStage::Uid),
            7 => Some(StartStage::Stdio),
            8 => Some(StartStage::Chdir),
            9 => Some(StartStage::Chroot),
            10 => Some(StartStage::Exec),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            StartStage::Setsid => "setsid",
            StartStage::OomScore => "oom_score",
            StartStage::CgroupAttach => "cgroup_attach",
            StartStage::Groups => "setgroups",
            StartStage::Gid => "setgid",
            StartStage::Uid => "setuid",
            StartStage::Stdio => "stdio",
            StartStage::Chdir => "chdir",
            StartStage::Chroot => "chroot",
            StartStage::Exec => "exec",
        }
    }
}

/// Split a command line into argv, honoring single quotes, double
/// quotes, and backslash escapes. No variable expansion.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut in_single = false;
    let mut in_double = false;

    let mut chars = command.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            '\\' if !in_single => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    has_token = true;
                }
                None => {
                    return Err(Error::InvalidValue(
                        "command ends with a bare backslash".to_string(),
                    ))
                }
            },
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_single || in_double {
        return Err(Error::InvalidValue("unterminated quote in command".to_string()));
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

/// The fully resolved execution environment. Built in the parent so
/// the child touches nothing but raw pointers and fds.
#[derive(Clone, Debug)]
pub struct TaskEnv {
    argv: Vec<CString>,
    envp: Vec<CString>,
    cwd: CString,
    root: Option<CString>,
    uid: Option<libc::uid_t>,
    gid: Option<libc::gid_t>,
    groups: Vec<libc::gid_t>,
    stdin_c: CString,
    stdout_c: CString,
    stderr_c: CString,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl TaskEnv {
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        command: &str,
        cwd: &str,
        root: &str,
        user: &str,
        group: &str,
        env: &str,
        stdin_path: &str,
        stdout_path: &Path,
        stderr_path: &Path,
    ) -> Result<TaskEnv> {
        let args = split_command(command)?;
        if args.is_empty() {
            return Err(Error::InvalidValue("container command is empty".to_string()));
        }

        let mut argv = Vec::with_capacity(args.len());
        for arg in &args {
            argv.push(to_cstring("command", arg)?);
        }

        let (uid, gid, groups) = resolve_credentials(user, group)?;
        let envp = build_envp(env, cwd, user)?;

        Ok(TaskEnv {
            argv,
            envp,
            cwd: to_cstring("cwd", cwd)?,
            root: if root.is_empty() {
                None
            } else {
                Some(to_cstring("root", root)?)
            },
            uid,
            gid,
            groups,
            stdin_c: to_cstring("stdin_path", stdin_path)?,
            stdout_c: path_cstring(stdout_path)?,
            stderr_c: path_cstring(stderr_path)?,
            stdout_path: stdout_path.to_path_buf(),
            stderr_path: stderr_path.to_path_buf(),
        })
    }

    /// The comm the kernel will report for the execed process.
    pub fn expected_comm(&self) -> String {
        let arg0 = self.argv[0].to_string_lossy();
        let base = arg0.rsplit('/').next().unwrap_or(&arg0).to_string();
        base.chars().take(COMM_LEN).collect()
    }
}

fn to_cstring(what: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidValue(format!("{} contains a NUL byte", what)))
}

fn path_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidValue(format!("path {} contains a NUL byte", path.display())))
}

fn resolve_credentials(
    user: &str,
    group: &str,
) -> Result<(Option<libc::uid_t>, Option<libc::gid_t>, Vec<libc::gid_t>)> {
    let mut uid = None;
    let mut gid = None;
    let mut groups = Vec::new();

    if !user.is_empty() {
        let pw = User::from_name(user)
            .map_err(|e| Error::from_errno(&format!("getpwnam({})", user), e))?
            .ok_or_else(|| Error::InvalidValue(format!("unknown user {}", user)))?;
        uid = Some(pw.uid.as_raw());
        gid = Some(pw.gid.as_raw());

        let user_c = to_cstring("user", user)?;
        let supplementary = nix::unistd::getgrouplist(&user_c, pw.gid)
            .map_err(|e| Error::from_errno(&format!("getgrouplist({})", user), e))?;
        groups = supplementary.iter().map(|g| g.as_raw()).collect();
    }

    if !group.is_empty() {
        let gr = Group::from_name(group)
            .map_err(|e| Error::from_errno(&format!("getgrnam({})", group), e))?
            .ok_or_else(|| Error::InvalidValue(format!("unknown group {}", group)))?;
        gid = Some(gr.gid.as_raw());
    }

    Ok((uid, gid, groups))
}

/// Environment: defaults first, overridden by the semicolon-separated
/// KEY=VALUE pairs from the spec.
fn build_envp(env: &str, cwd: &str, user: &str) -> Result<Vec<CString>> {
    let mut pairs: Vec<(String, String)> = vec![
        ("container".to_string(), "corral".to_string()),
        ("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string()),
        ("HOME".to_string(), cwd.to_string()),
        (
            "USER".to_string(),
            if user.is_empty() { "root".to_string() } else { user.to_string() },
        ),
    ];

    for entry in env.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::InvalidValue(format!("env entry {:?} has no '='", entry)))?;
        if let Some(existing) = pairs.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_string();
        } else {
            pairs.push((key.to_string(), value.to_string()));
        }
    }

    let mut envp = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        envp.push(to_cstring("env", &format!("{}={}", key, value))?);
    }
    Ok(envp)
}

/// One container start: at most one live child, replaced on each Start.
#[derive(Debug)]
pub struct Task {
    env: TaskEnv,
    cgroups: Vec<CgroupNode>,
    pid: Option<Pid>,
    running: bool,
    exit_status: Option<i32>,
    start_errno: Option<i32>,
}

impl Task {
    pub fn new(env: TaskEnv, cgroups: Vec<CgroupNode>) -> Task {
        Task {
            env,
            cgroups,
            pid: None,
            running: false,
            exit_status: None,
            start_errno: None,
        }
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub fn start_errno(&self) -> Option<i32> {
        self.start_errno
    }

    /// Called exactly once by the reaper when the child exits.
    pub fn deliver_exit_status(&mut self, status: i32) {
        self.exit_status = Some(status);
        self.running = false;
    }

    /// True while the pid is alive or a zombie awaiting reap.
    pub fn exists(&self) -> bool {
        match self.pid {
            Some(pid) => !matches!(kill(pid, None), Err(Errno::ESRCH)),
            None => false,
        }
    }

    pub fn kill(&self, signal: Signal) -> Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| Error::InvalidState("task is not running".to_string()))?;
        kill(pid, signal).map_err(|e| Error::from_errno(&format!("kill({})", pid), e))
    }

    /// Fork and exec the task. On child setup failure the stage and
    /// errno arrive over the status channel and both are recorded.
    pub fn start(&mut self) -> Result<()> {
        let (parent_fd, child_fd) = status_channel()?;
        let child_raw = child_fd.as_raw_fd();
        let parent_raw = parent_fd.as_raw_fd();

        // Everything the child dereferences, built before fork.
        let argv_ptrs = null_terminated(&self.env.argv);
        let envp_ptrs = null_terminated(&self.env.envp);
        let mut tasks_files = Vec::with_capacity(self.cgroups.len());
        for cg in &self.cgroups {
            tasks_files.push(path_cstring(&cg.path().join("tasks"))?);
        }
        let oom_path = to_cstring("oom path", "/proc/self/oom_score_adj")?;

        let guard = FORK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let fork_result = unsafe { fork() }
            .map_err(|e| Error::from_errno("fork", e))?;
        drop(guard);

        match fork_result {
            ForkResult::Child => {
                // Only the status channel write end survives here.
                unsafe {
                    libc::close(parent_raw);
                    run_child(
                        child_raw,
                        &oom_path,
                        &tasks_files,
                        &self.env,
                        &argv_ptrs,
                        &envp_ptrs,
                    )
                }
            }
            ForkResult::Parent { child } => {
                drop(child_fd);
                self.pid = Some(child);
                let verdict = read_status(parent_fd).map_err(|e| {
                    // A wedged or unreadable channel leaves a child of
                    // unknown state behind; put it down and reap it.
                    let _ = kill(child, Signal::SIGKILL);
                    let _ = waitpid(child, None);
                    self.pid = None;
                    e
                })?;
                match verdict {
                    None => {
                        self.running = true;
                        self.exit_status = None;
                        self.start_errno = None;
                        log::info!("task started, pid {}", child);
                        Ok(())
                    }
                    Some((stage_code, errno)) => {
                        // The child already _exited; reap it here so the
                        // failed pid never reaches the reaper.
                        let status = match waitpid(child, None) {
                            Ok(ws) => raw_wait_status(&ws),
                            Err(Errno::ECHILD) => 0,
                            Err(e) => return Err(Error::from_errno("waitpid", e)),
                        };
                        self.pid = None;
                        self.running = false;
                        self.exit_status = Some(status);
                        self.start_errno = Some(errno);

                        let stage = StartStage::from_code(stage_code);
                        let op = format!(
                            "task start failed at {}",
                            stage.map(|s| s.name()).unwrap_or("unknown stage")
                        );
                        Err(Error::from_errno(&op, Errno::from_i32(errno)))
                    }
                }
            }
        }
    }

    /// Adopt an already-running child after a daemon restart. The pid
    /// must still run the expected command; membership in the expected
    /// cgroups is verified, not recreated.
    pub fn restore(&mut self, pid: Pid) -> Result<()> {
        let comm = read_comm(pid)?;
        let expected = self.env.expected_comm();
        if comm != expected {
            return Err(Error::InvalidState(format!(
                "pid {} runs {:?}, expected {:?}",
                pid, comm, expected
            )));
        }

        for cg in &self.cgroups {
            let member = cg
                .member_procs()
                .map(|pids| pids.contains(&pid))
                .unwrap_or(false);
            if !member {
                log::warn!(
                    "restored pid {} missing from {}, re-attaching",
                    pid,
                    cg.path().display()
                );
                cg.attach(pid)?;
            }
        }

        self.pid = Some(pid);
        self.running = true;
        log::info!("task restored, pid {}", pid);
        Ok(())
    }

    /// Reap the zombie if the reaper has not already. Bounded: a task
    /// that survived SIGKILL is logged, never waited on forever.
    pub fn reap(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };
        for _ in 0..50 {
            match waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => std::thread::sleep(Duration::from_millis(2)),
                Ok(ws) => {
                    if self.exit_status.is_none() {
                        self.exit_status = Some(raw_wait_status(&ws));
                    }
                    self.running = false;
                    return;
                }
                // someone else (the reaper, or init for adopted pids)
                // already owns this exit
                Err(Errno::ECHILD) => {
                    self.running = false;
                    return;
                }
                Err(e) => {
                    log::warn!("waitpid({}): {}", pid, e);
                    return;
                }
            }
        }
        log::warn!("pid {} not reapable after stop", pid);
    }

    pub fn stdout(&self) -> Result<String> {
        read_output(&self.env.stdout_path)
    }

    pub fn stderr(&self) -> Result<String> {
        read_output(&self.env.stderr_path)
    }

    /// Trim file-backed stdio once it exceeds `limit` bytes of disk.
    /// Returns how many bytes were dropped.
    pub fn rotate(&self, limit: u64) -> Result<u64> {
        let mut dropped = 0;
        for path in [&self.env.stdout_path, &self.env.stderr_path] {
            dropped += rotate_log(path, limit)?;
        }
        Ok(dropped)
    }
}

fn read_output(path: &Path) -> Result<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::from_io(&format!("read {}", path.display()), e)),
    }
}

/// Collapse the head of an oversized log, preferring
/// FALLOC_FL_COLLAPSE_RANGE with a block-aligned prefix and falling
/// back to a full truncation where the filesystem cannot collapse.
fn rotate_log(path: &Path, limit: u64) -> Result<u64> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::from_io(&format!("open {}", path.display()), e)),
    };
    let meta = file
        .metadata()
        .map_err(|e| Error::from_io(&format!("stat {}", path.display()), e))?;

    if !meta.is_file() || meta.st_blocks() * 512 <= limit {
        return Ok(0);
    }

    let size = meta.st_size();
    // Keep half of the allowed size, aligned down to the block size.
    let mut hole = size as i64 - (limit / 2) as i64;
    hole -= hole % meta.st_blksize() as i64;

    if hole > 0 {
        let rc = unsafe {
            libc::fallocate(
                file.as_raw_fd(),
                libc::FALLOC_FL_COLLAPSE_RANGE,
                0,
                hole as libc::off_t,
            )
        };
        if rc == 0 {
            log::debug!("rotated {} by {} bytes", path.display(), hole);
            return Ok(hole as u64);
        }
    }

    file.set_len(0)
        .map_err(|e| Error::from_io(&format!("truncate {}", path.display()), e))?;
    log::debug!("truncated {} ({} bytes)", path.display(), size);
    Ok(size)
}

pub fn read_comm(pid: Pid) -> Result<String> {
    let path = format!("/proc/{}/comm", pid);
    let comm = std::fs::read_to_string(&path)
        .map_err(|e| Error::from_io(&format!("read {}", path), e))?;
    Ok(comm.trim_end().to_string())
}

/// Reconstruct the raw wait status word from a decoded WaitStatus.
pub fn raw_wait_status(status: &WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => (code & 0xff) << 8,
        WaitStatus::Signaled(_, signal, core) => {
            (*signal as i32) | if *core { 0x80 } else { 0 }
        }
        _ => 0,
    }
}

fn status_channel() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    let rc = unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            0,
            fds.as_mut_ptr(),
        )
    };
    if rc != 0 {
        return Err(Error::from_errno("socketpair(AF_UNIX)", Errno::last()));
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Read the child's verdict: EOF means the exec happened.
fn read_status(fd: OwnedFd) -> Result<Option<(i32, i32)>> {
    set_recv_timeout(&fd, START_TIMEOUT)?;

    let mut file = File::from(fd);
    let mut buf = [0u8; 8];
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Err(Error::Timeout("task start status channel".to_string()))
            }
            Err(e) => return Err(Error::from_io("read status channel", e)),
        }
    }

    match total {
        0 => Ok(None),
        8 => {
            let stage = i32::from_ne_bytes(buf[..4].try_into().unwrap());
            let errno = i32::from_ne_bytes(buf[4..].try_into().unwrap());
            Ok(Some((stage, errno)))
        }
        n => Err(Error::Unknown(format!("short status read: {} bytes", n))),
    }
}

fn set_recv_timeout(fd: &OwnedFd, timeout: Duration) -> Result<()> {
    let tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const libc::timeval as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(Error::from_errno("setsockopt(SO_RCVTIMEO)", Errno::last()));
    }
    Ok(())
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
    ptrs.push(std::ptr::null());
    ptrs
}

/// Decimal-format a pid into a stack buffer. The child cannot allocate.
fn format_pid(buf: &mut [u8; 16], pid: u32) -> usize {
    if pid == 0 {
        buf[0] = b'0';
        return 1;
    }
    let mut tmp = [0u8; 16];
    let mut rest = pid;
    let mut n = 0;
    while rest > 0 {
        tmp[n] = b'0' + (rest % 10) as u8;
        rest /= 10;
        n += 1;
    }
    for i in 0..n {
        buf[i] = tmp[n - 1 - i];
    }
    n
}

unsafe fn child_fail(fd: RawFd, stage: StartStage) -> ! {
    let errno = Errno::last() as i32;
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&(stage as i32).to_ne_bytes());
    buf[4..].copy_from_slice(&errno.to_ne_bytes());
    let _ = libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len());
    libc::_exit(127);
}

unsafe fn write_whole(fd: libc::c_int, bytes: &[u8]) -> bool {
    libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) == bytes.len() as isize
}

unsafe fn open_as(fd: RawFd, stage: StartStage, path: &CStr, flags: libc::c_int, target: RawFd) {
    let opened = libc::open(path.as_ptr(), flags, 0o644);
    if opened < 0 || libc::dup2(opened, target) < 0 {
        child_fail(fd, stage);
    }
    if opened > 2 {
        libc::close(opened);
    }
}

/// The child side, between fork and exec. Raw syscalls only.
unsafe fn run_child(
    fd: RawFd,
    oom_path: &CStr,
    tasks_files: &[CString],
    env: &TaskEnv,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> ! {
    if libc::setsid() < 0 {
        child_fail(fd, StartStage::Setsid);
    }

    // The daemon runs with a protected OOM score; the task must not.
    let oom_fd = libc::open(oom_path.as_ptr(), libc::O_WRONLY);
    if oom_fd < 0 || !write_whole(oom_fd, b"0") {
        child_fail(fd, StartStage::OomScore);
    }
    libc::close(oom_fd);

    // Enter every controller before anything else runs: descendants
    // inherit membership from here on.
    let mut pid_buf = [0u8; 16];
    let pid_len = format_pid(&mut pid_buf, libc::getpid() as u32);
    for tasks in tasks_files {
        let tasks_fd = libc::open(tasks.as_ptr(), libc::O_WRONLY);
        if tasks_fd < 0 || !write_whole(tasks_fd, &pid_buf[..pid_len]) {
            child_fail(fd, StartStage::CgroupAttach);
        }
        libc::close(tasks_fd);
    }

    // CRITICAL: groups, then gid, then uid. Reordering re-grants root.
    if let Some(uid) = env.uid {
        if libc::setgroups(env.groups.len(), env.groups.as_ptr()) < 0 {
            child_fail(fd, StartStage::Groups);
        }
        let gid = env.gid.unwrap_or(uid as libc::gid_t);
        if libc::setresgid(gid, gid, gid) < 0 {
            child_fail(fd, StartStage::Gid);
        }
        if libc::setresuid(uid, uid, uid) < 0 {
            child_fail(fd, StartStage::Uid);
        }
    } else if let Some(gid) = env.gid {
        if libc::setresgid(gid, gid, gid) < 0 {
            child_fail(fd, StartStage::Gid);
        }
    }

    open_as(fd, StartStage::Stdio, &env.stdin_c, libc::O_RDONLY, 0);
    open_as(
        fd,
        StartStage::Stdio,
        &env.stdout_c,
        libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        1,
    );
    open_as(
        fd,
        StartStage::Stdio,
        &env.stderr_c,
        libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        2,
    );

    if libc::chdir(env.cwd.as_ptr()) < 0 {
        child_fail(fd, StartStage::Chdir);
    }

    if let Some(root) = &env.root {
        if libc::chroot(root.as_ptr()) < 0 {
            child_fail(fd, StartStage::Chroot);
        }
    }

    libc::execvpe(argv[0], argv.as_ptr(), envp.as_ptr());
    child_fail(fd, StartStage::Exec);
}
