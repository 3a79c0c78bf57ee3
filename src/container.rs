/// Container: a named lifecycle unit binding a spec, a set of
/// per-controller cgroup nodes, and at most one live task.
///
/// State machine:
///   Stopped --Start--> Running --Pause--> Paused --Resume--> Running
///   Running --exit delivered--> Dead
///   Running/Dead --Stop--> Stopped (Paused resumes first)
/// Dead keeps its cgroups so accounting stays readable until Stop.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::cgroup::CgroupNode;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::spec::Spec;
use crate::store::SpecStore;
use crate::subsystem::{self, Registry, SubsystemKind};
use crate::task::{Task, TaskEnv};

/// Reserved name of the root container. It owns the engine-root
/// cgroups and has no task of its own.
pub const ROOT_CONTAINER: &str = "/";

pub const ROOT_PID_PROPERTY: &str = "root_pid";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Stopped,
    Dead,
    Running,
    Paused,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Stopped => "stopped",
            State::Dead => "dead",
            State::Running => "running",
            State::Paused => "paused",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

struct DataDef {
    name: &'static str,
    root_valid: bool,
    valid_states: &'static [State],
}

/// The read-only data surface. Each datum carries whether the root
/// container may answer it and which states permit the query.
const DATA: &[DataDef] = &[
    DataDef {
        name: "state",
        root_valid: true,
        valid_states: &[State::Stopped, State::Dead, State::Running, State::Paused],
    },
    DataDef { name: "exit_status", root_valid: false, valid_states: &[State::Dead] },
    DataDef { name: "start_errno", root_valid: false, valid_states: &[State::Stopped] },
    DataDef { name: "root_pid", root_valid: false, valid_states: &[State::Running, State::Paused] },
    DataDef {
        name: "stdout",
        root_valid: false,
        valid_states: &[State::Running, State::Paused, State::Dead],
    },
    DataDef {
        name: "stderr",
        root_valid: false,
        valid_states: &[State::Running, State::Paused, State::Dead],
    },
    DataDef {
        name: "cpu_usage",
        root_valid: true,
        valid_states: &[State::Running, State::Paused, State::Dead],
    },
    DataDef {
        name: "memory_usage",
        root_valid: true,
        valid_states: &[State::Running, State::Paused, State::Dead],
    },
];

#[derive(Debug)]
pub struct Container {
    name: String,
    spec: Spec,
    state: State,
    task: Option<Task>,
    leaf_cgroups: Vec<CgroupNode>,
    /// Set when Restore adopted a running task: the first Start after a
    /// daemon restart may have succeeded before the restart and is
    /// answered idempotently.
    maybe_returned_ok: bool,
    registry: Registry,
    config: Arc<Config>,
    store: Arc<dyn SpecStore>,
}

impl Container {
    pub fn new(
        name: &str,
        registry: Registry,
        config: Arc<Config>,
        store: Arc<dyn SpecStore>,
    ) -> Container {
        Container {
            name: name.to_string(),
            spec: Spec::new(),
            state: State::Stopped,
            task: None,
            leaf_cgroups: Vec::new(),
            maybe_returned_ok: false,
            registry,
            config,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_CONTAINER
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Persist the initial (empty) spec so the container survives a
    /// daemon restart even before its first property is set.
    pub fn create(&mut self) -> Result<()> {
        log::info!("create {}", self.name);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if self.is_root() {
            return Ok(());
        }
        self.store.save(&self.name, &self.spec.to_blob()?)
    }

    /// A Running container whose task is gone heals itself to Stopped.
    fn check_state(&mut self, expected: State) -> bool {
        if self.state == State::Running
            && !self.is_root()
            && self.task.as_ref().map(|t| !t.is_running()).unwrap_or(true)
        {
            self.state = State::Stopped;
        }
        self.state == expected
    }

    fn node_for(&self, kind: SubsystemKind) -> CgroupNode {
        if self.is_root() {
            self.registry.engine_node(kind)
        } else {
            self.registry.container_node(kind, &self.name)
        }
    }

    fn leaf(&self, kind: SubsystemKind) -> Option<&CgroupNode> {
        self.leaf_cgroups.iter().find(|cg| cg.kind() == kind)
    }

    /// Member pids of the freezer cgroup, the canonical task set.
    pub fn processes(&self) -> Result<Vec<Pid>> {
        self.node_for(SubsystemKind::Freezer).member_tasks()
    }

    /// Create the three per-controller nodes and configure the memory
    /// knobs. Partial creations are rolled back before returning.
    fn prepare_cgroups(&mut self) -> Result<()> {
        let nodes: Vec<CgroupNode> =
            SubsystemKind::ALL.iter().map(|k| self.node_for(*k)).collect();

        let mut created: Vec<CgroupNode> = Vec::new();
        let outcome: Result<()> = (|| {
            for node in &nodes {
                node.create()?;
                created.push(node.clone());
            }

            let memcg = nodes
                .iter()
                .find(|n| n.kind() == SubsystemKind::Memory)
                .expect("memory node always prepared");
            subsystem::set_use_hierarchy(memcg)?;

            let limit = self.spec.get("memory_limit")?;
            if !limit.is_empty() && limit != "0" {
                memcg.set_knob("memory.limit_in_bytes", &limit)?;
            }

            let guarantee = self.spec.get("memory_guarantee")?;
            if !guarantee.is_empty() && guarantee != "0" {
                if self.registry.memory_has_low_limit() {
                    memcg.set_knob("memory.low_limit_in_bytes", &guarantee)?;
                } else {
                    log::warn!(
                        "{}: memory_guarantee set but kernel lacks memory.low_limit_in_bytes",
                        self.name
                    );
                }
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                self.leaf_cgroups = nodes;
                Ok(())
            }
            Err(e) => {
                self.remove_cgroup_dirs(&mut created);
                Err(e)
            }
        }
    }

    fn remove_cgroup_dirs(&self, nodes: &mut Vec<CgroupNode>) {
        let retries = self.config.rmdir_retries;
        let backoff = Duration::from_millis(self.config.rmdir_backoff_ms);
        for node in nodes.drain(..).rev() {
            if let Err(e) = node.remove(retries, backoff) {
                log::warn!("leaking cgroup {}: {}", node.path().display(), e);
            }
        }
    }

    fn prepare_task(&mut self) -> Result<()> {
        let stdout_path = self.stdio_path("stdout_path", "stdout")?;
        let stderr_path = self.stdio_path("stderr_path", "stderr")?;

        let env = TaskEnv::prepare(
            &self.spec.get("command")?,
            &self.spec.get("cwd")?,
            &self.spec.get("root")?,
            &self.spec.get("user")?,
            &self.spec.get("group")?,
            &self.spec.get("env")?,
            &self.spec.get("stdin_path")?,
            &stdout_path,
            &stderr_path,
        )?;

        self.task = Some(Task::new(env, self.leaf_cgroups.clone()));
        Ok(())
    }

    fn stdio_path(&self, property: &str, suffix: &str) -> Result<PathBuf> {
        let configured = self.spec.get(property)?;
        if !configured.is_empty() {
            return Ok(PathBuf::from(configured));
        }
        std::fs::create_dir_all(&self.config.run_dir).map_err(|e| {
            Error::from_io(&format!("mkdir {}", self.config.run_dir.display()), e)
        })?;
        Ok(self.config.run_dir.join(format!("{}.{}", self.name, suffix)))
    }

    pub fn start(&mut self) -> Result<()> {
        if (self.state == State::Running || self.state == State::Dead) && self.maybe_returned_ok {
            log::info!("{}: already started before restart", self.name);
            self.maybe_returned_ok = false;
            return Ok(());
        }
        self.maybe_returned_ok = false;

        if !self.check_state(State::Stopped) {
            return Err(Error::InvalidState(format!(
                "cannot start {} from state {}",
                self.name, self.state
            )));
        }

        self.prepare_cgroups()?;

        if self.is_root() {
            self.state = State::Running;
            return Ok(());
        }

        let command = self.spec.get("command")?;
        if command.is_empty() {
            let mut nodes = std::mem::take(&mut self.leaf_cgroups);
            self.remove_cgroup_dirs(&mut nodes);
            return Err(Error::InvalidValue("container command is empty".to_string()));
        }

        if let Err(e) = self.prepare_task().and_then(|_| {
            self.task.as_mut().expect("task just prepared").start()
        }) {
            let mut nodes = std::mem::take(&mut self.leaf_cgroups);
            self.remove_cgroup_dirs(&mut nodes);
            log::warn!("{}: start failed: {}", self.name, e);
            return Err(e);
        }

        let pid = self.task.as_ref().and_then(|t| t.pid()).expect("task started");
        log::info!("{} started, root pid {}", self.name, pid);

        self.spec.set_internal(ROOT_PID_PROPERTY, &pid.to_string());
        if let Err(e) = self.persist() {
            log::warn!("{}: failed to persist root_pid: {}", self.name, e);
        }

        self.state = State::Running;
        Ok(())
    }

    /// Graceful-then-forceful teardown of every task in the container:
    /// SIGTERM, drain, freeze to stop fork races, SIGKILL, thaw, wait.
    fn kill_all(&mut self) -> Result<()> {
        let freezer = self.node_for(SubsystemKind::Freezer);
        if !freezer.exists() {
            return Ok(());
        }

        log::info!("killall {}", self.name);

        if let Err(e) = freezer.kill_all(Signal::SIGTERM) {
            log::warn!("{}: SIGTERM sweep failed: {}", self.name, e);
        }

        let grace = Duration::from_millis(self.config.kill_grace_ms);
        wait_until(grace, || freezer.is_empty().unwrap_or(true));

        let freeze_deadline = Duration::from_millis(self.config.freeze_deadline_ms);
        if let Err(e) = subsystem::freeze(&freezer, freeze_deadline) {
            log::warn!("{}: freeze before SIGKILL failed: {}", self.name, e);
        }

        if let Err(e) = freezer.kill_all(Signal::SIGKILL) {
            log::warn!("{}: SIGKILL sweep failed: {}", self.name, e);
        }

        if let Err(e) = subsystem::thaw(&freezer, freeze_deadline) {
            log::warn!("{}: thaw after SIGKILL failed: {}", self.name, e);
        }

        let drain = Duration::from_millis(self.config.drain_deadline_ms);
        if !wait_until(drain, || freezer.is_empty().unwrap_or(true)) {
            return Err(Error::Timeout(format!(
                "tasks of {} still alive after SIGKILL",
                self.name
            )));
        }
        Ok(())
    }

    /// Stop best-efforts every step; the return value reflects the
    /// first hard error while teardown still runs to the end.
    pub fn stop(&mut self) -> Result<()> {
        if self.is_root() {
            return Err(Error::InvalidState("cannot stop the root container".to_string()));
        }
        if self.state == State::Paused {
            self.resume()?;
        }
        if !(self.check_state(State::Running) || self.check_state(State::Dead)) {
            return Err(Error::InvalidState(format!(
                "cannot stop {} from state {}",
                self.name, self.state
            )));
        }

        log::info!("stop {}", self.name);
        let mut first_error = None;

        if let Err(e) = self.kill_all() {
            log::warn!("{}: killall failed: {}", self.name, e);
            first_error.get_or_insert(e);
        }

        if let Some(task) = self.task.as_mut() {
            task.reap();
        }

        let retries = self.config.rmdir_retries;
        let backoff = Duration::from_millis(self.config.rmdir_backoff_ms);
        for node in std::mem::take(&mut self.leaf_cgroups).into_iter().rev() {
            if let Err(e) = node.remove(retries, backoff) {
                log::warn!("{}: cannot remove {}: {}", self.name, node.path().display(), e);
                first_error.get_or_insert(e);
            }
        }

        self.spec.clear_internal(ROOT_PID_PROPERTY);
        if let Err(e) = self.persist() {
            log::warn!("{}: failed to persist stop: {}", self.name, e);
            first_error.get_or_insert(e);
        }

        self.state = State::Stopped;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.is_root() || !self.check_state(State::Running) {
            return Err(Error::InvalidState(format!(
                "cannot pause {} from state {}",
                self.name, self.state
            )));
        }

        let freezer = self.node_for(SubsystemKind::Freezer);
        subsystem::freeze(&freezer, Duration::from_millis(self.config.freeze_deadline_ms))?;
        self.state = State::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if !self.check_state(State::Paused) {
            return Err(Error::InvalidState(format!(
                "cannot resume {} from state {}",
                self.name, self.state
            )));
        }

        let freezer = self.node_for(SubsystemKind::Freezer);
        subsystem::thaw(&freezer, Duration::from_millis(self.config.freeze_deadline_ms))?;
        self.state = State::Running;
        Ok(())
    }

    /// Route an exit status here if the pid is ours. Only the first
    /// delivery for the live task wins; repeats find state != Running.
    pub fn deliver_exit_status(&mut self, pid: Pid, status: i32) -> bool {
        if self.state != State::Running {
            return false;
        }
        let Some(task) = self.task.as_mut() else {
            return false;
        };
        if task.pid() != Some(pid) || !task.is_running() {
            return false;
        }

        task.deliver_exit_status(status);
        self.state = State::Dead;
        log::info!("{}: root pid {} exited with status {}", self.name, pid, status);
        true
    }

    pub fn get_data(&self, name: &str) -> Result<String> {
        let def = DATA
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::InvalidValue(format!("invalid container data {}", name)))?;

        if self.is_root() && !def.root_valid {
            return Err(Error::InvalidData(format!(
                "{} is undefined for the root container",
                name
            )));
        }
        if !def.valid_states.contains(&self.state) {
            return Err(Error::InvalidState(format!(
                "{} is undefined in state {}",
                name, self.state
            )));
        }

        let value = match name {
            "state" => self.state.to_string(),
            "exit_status" => self
                .task
                .as_ref()
                .filter(|t| !t.is_running())
                .and_then(|t| t.exit_status())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-1".to_string()),
            "start_errno" => self
                .task
                .as_ref()
                .filter(|t| !t.is_running())
                .and_then(|t| t.start_errno())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-1".to_string()),
            "root_pid" => self
                .task
                .as_ref()
                .and_then(|t| t.pid())
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-1".to_string()),
            "stdout" => self.task.as_ref().map(|t| t.stdout()).transpose()?.unwrap_or_default(),
            "stderr" => self.task.as_ref().map(|t| t.stderr()).transpose()?.unwrap_or_default(),
            "cpu_usage" => self.usage(SubsystemKind::Cpuacct),
            "memory_usage" => self.usage(SubsystemKind::Memory),
            _ => unreachable!("datum listed but not handled"),
        };
        Ok(value)
    }

    fn usage(&self, kind: SubsystemKind) -> String {
        let Some(cg) = self.leaf(kind) else {
            log::warn!("{}: {} cgroup not prepared", self.name, kind);
            return "-1".to_string();
        };
        let read = match kind {
            SubsystemKind::Cpuacct => subsystem::cpu_usage_ns(cg),
            SubsystemKind::Memory => subsystem::memory_usage_bytes(cg),
            SubsystemKind::Freezer => return "-1".to_string(),
        };
        match read {
            Ok(value) => value.to_string(),
            Err(e) => {
                log::warn!("{}: cannot read {} usage: {}", self.name, kind, e);
                "-1".to_string()
            }
        }
    }

    pub fn get_property(&self, property: &str) -> Result<String> {
        if self.is_root() {
            return Err(Error::InvalidProperty(
                "the root container has no properties".to_string(),
            ));
        }
        self.spec.get(property)
    }

    pub fn set_property(&mut self, property: &str, value: &str) -> Result<()> {
        if self.is_root() {
            return Err(Error::InvalidValue(
                "cannot set properties on the root container".to_string(),
            ));
        }
        if self.state != State::Stopped && !Spec::is_dynamic(property)? {
            return Err(Error::InvalidState(format!(
                "static property {} is only settable while stopped",
                property
            )));
        }
        self.spec.set(property, value)?;
        self.persist()
    }

    /// Rebuild the container from a persisted spec after a daemon
    /// restart. A live, verified root pid is adopted; a stale one is
    /// swept and the container left Stopped.
    pub fn restore(&mut self, spec: Spec) -> Result<()> {
        self.spec = spec;
        self.state = State::Stopped;

        let root_pid = self
            .spec
            .get_internal(ROOT_PID_PROPERTY)
            .and_then(|s| s.parse::<i32>().ok())
            .filter(|pid| *pid > 0);

        let Some(pid) = root_pid else {
            log::info!("restore {}: task never started", self.name);
            self.sweep_leftovers();
            return Ok(());
        };

        log::info!("restore {}: adopting pid {}", self.name, pid);
        self.prepare_cgroups()?;
        self.prepare_task()?;

        match self
            .task
            .as_mut()
            .expect("task just prepared")
            .restore(Pid::from_raw(pid))
        {
            Ok(()) => {
                self.state = State::Running;
                self.maybe_returned_ok = true;
                Ok(())
            }
            Err(e) => {
                log::warn!("restore {}: pid {} is stale: {}", self.name, pid, e);
                self.task = None;
                self.sweep_leftovers();
                self.spec.clear_internal(ROOT_PID_PROPERTY);
                if let Err(e) = self.persist() {
                    log::warn!("{}: failed to persist sweep: {}", self.name, e);
                }
                Ok(())
            }
        }
    }

    /// Best-effort kill of whatever survived the restart plus removal
    /// of the orphaned cgroup directories.
    fn sweep_leftovers(&mut self) {
        if self.node_for(SubsystemKind::Freezer).exists() {
            if let Err(e) = self.kill_all() {
                log::warn!("{}: restore sweep failed: {}", self.name, e);
            }
        }
        let mut nodes: Vec<CgroupNode> = if self.leaf_cgroups.is_empty() {
            SubsystemKind::ALL
                .iter()
                .map(|k| self.node_for(*k))
                .filter(|n| n.exists())
                .collect()
        } else {
            std::mem::take(&mut self.leaf_cgroups)
        };
        self.remove_cgroup_dirs(&mut nodes);
    }

    /// Periodic housekeeping: rotate file-backed stdio.
    pub fn heartbeat(&mut self) {
        if let Some(task) = self.task.as_ref() {
            match task.rotate(self.config.stdio_rotate_limit) {
                Ok(0) => {}
                Ok(dropped) => log::info!("{}: rotated stdio, dropped {} bytes", self.name, dropped),
                Err(e) => log::warn!("{}: stdio rotation failed: {}", self.name, e),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state_for_tests(&mut self, state: State) {
        self.state = state;
    }
}

/// Sleep-poll until the condition holds or the deadline passes.
/// Returns whether the condition was met.
fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if cond() {
            return true;
        }
        if start.elapsed() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;

    fn scratch(name: &str) -> (Registry, Arc<Config>, Arc<dyn SpecStore>) {
        let base = std::env::temp_dir().join("corral-container-tests").join(name);
        let _ = std::fs::remove_dir_all(&base);
        for kind in SubsystemKind::ALL {
            std::fs::create_dir_all(base.join("cgroup").join(kind.kernel_name())).unwrap();
        }
        let config = Config {
            cgroup_base: base.join("cgroup"),
            store_dir: base.join("store"),
            run_dir: base.join("run"),
            kill_grace_ms: 10,
            freeze_deadline_ms: 10,
            drain_deadline_ms: 10,
            rmdir_backoff_ms: 1,
            ..Config::default()
        };
        let registry = Registry::with_layout_for_tests(&config);
        let store: Arc<dyn SpecStore> = Arc::new(FsStore::open(&config.store_dir).unwrap());
        (registry, Arc::new(config), store)
    }

    fn container(name: &str, test: &str) -> Container {
        let (registry, config, store) = scratch(test);
        Container::new(name, registry, config, store)
    }

    #[test]
    fn state_names() {
        assert_eq!(State::Stopped.to_string(), "stopped");
        assert_eq!(State::Dead.to_string(), "dead");
        assert_eq!(State::Running.to_string(), "running");
        assert_eq!(State::Paused.to_string(), "paused");
    }

    #[test]
    fn data_gates_by_state() {
        let c = container("web", "data-gates");
        assert_eq!(c.get_data("state").unwrap(), "stopped");
        assert_eq!(c.get_data("exit_status").unwrap_err().kind(), "InvalidState");
        assert_eq!(c.get_data("root_pid").unwrap_err().kind(), "InvalidState");
        assert_eq!(c.get_data("bogus").unwrap_err().kind(), "InvalidValue");
        // never started: no task, errno defaults to -1
        assert_eq!(c.get_data("start_errno").unwrap(), "-1");
    }

    #[test]
    fn data_gates_for_root() {
        let mut c = container(ROOT_CONTAINER, "data-root");
        c.force_state_for_tests(State::Running);
        assert_eq!(c.get_data("state").unwrap(), "running");
        assert_eq!(c.get_data("root_pid").unwrap_err().kind(), "InvalidData");
        assert_eq!(c.get_data("stdout").unwrap_err().kind(), "InvalidData");
    }

    #[test]
    fn static_properties_lock_outside_stopped() {
        let mut c = container("locked", "prop-lock");
        c.set_property("command", "sleep 1").unwrap();
        c.force_state_for_tests(State::Running);
        assert_eq!(
            c.set_property("command", "sleep 2").unwrap_err().kind(),
            "InvalidState"
        );
        // dynamic properties stay settable
        c.set_property("memory_limit", "1048576").unwrap();
        c.force_state_for_tests(State::Stopped);
        c.set_property("command", "sleep 2").unwrap();
        assert_eq!(c.get_property("command").unwrap(), "sleep 2");
    }

    #[test]
    fn root_has_no_properties() {
        let mut c = container(ROOT_CONTAINER, "root-props");
        assert_eq!(c.get_property("command").unwrap_err().kind(), "InvalidProperty");
        assert_eq!(
            c.set_property("command", "x").unwrap_err().kind(),
            "InvalidValue"
        );
    }

    #[test]
    fn start_without_command_rolls_back_cgroups() {
        let mut c = container("empty", "no-command");
        let err = c.start().unwrap_err();
        assert_eq!(err.kind(), "InvalidValue");
        assert_eq!(c.state(), State::Stopped);
        // freezer leaf must not leak (memory may keep knob files on a
        // plain filesystem, unlike a real cgroupfs)
        assert!(!c.node_for(SubsystemKind::Freezer).exists());
        assert!(!c.node_for(SubsystemKind::Cpuacct).exists());
    }

    #[test]
    fn start_records_errno_when_child_setup_fails() {
        // The fake cgroup tree has no `tasks` files, so the child fails
        // during pre-exec setup (usually at the attach stage, with
        // ENOENT) and reports the stage errno over the status channel.
        let mut c = container("failing", "start-errno");
        c.set_property("command", "sh -c 'echo never'").unwrap();
        let err = c.start().unwrap_err();
        assert!(matches!(err.kind(), "IO" | "Permission"), "got {}", err);
        assert_eq!(c.state(), State::Stopped);
        let errno: i32 = c.get_data("start_errno").unwrap().parse().unwrap();
        assert!(errno > 0);
        assert!(!c.node_for(SubsystemKind::Freezer).exists());
    }

    #[test]
    fn start_self_heals_when_task_is_gone() {
        let mut c = container("again", "double-start");
        c.force_state_for_tests(State::Running);
        // no live task: self-heals to Stopped, then fails on the empty command
        assert_eq!(c.start().unwrap_err().kind(), "InvalidValue");
        assert_eq!(c.state(), State::Stopped);
    }

    #[test]
    fn deliver_requires_matching_pid() {
        let mut c = container("misroute", "deliver");
        c.force_state_for_tests(State::Running);
        assert!(!c.deliver_exit_status(Pid::from_raw(4242), 0));
        assert_eq!(c.state(), State::Running);
    }

    #[test]
    fn root_start_prepares_engine_cgroups() {
        let mut c = container(ROOT_CONTAINER, "root-start");
        c.start().unwrap();
        assert_eq!(c.state(), State::Running);
        for kind in SubsystemKind::ALL {
            assert!(c.node_for(kind).exists());
        }
        assert_eq!(c.get_data("state").unwrap(), "running");
    }
}
