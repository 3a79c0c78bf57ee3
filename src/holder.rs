/// Process-wide registry of containers.
///
/// The holder owns every container by name; the mutex wrapped around
/// it by the daemon is the engine lock: all state machine
/// transitions, holder mutations, and cgroup directory operations
/// happen under it.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use nix::unistd::Pid;

use crate::config::Config;
use crate::container::{Container, State, ROOT_CONTAINER};
use crate::error::{Error, Result};
use crate::spec::Spec;
use crate::store::SpecStore;
use crate::subsystem::Registry;

pub type ContainerRef = Arc<Mutex<Container>>;

const MAX_NAME_LEN: usize = 128;

pub struct Holder {
    registry: Registry,
    config: Arc<Config>,
    store: Arc<dyn SpecStore>,
    containers: BTreeMap<String, ContainerRef>,
}

impl Holder {
    pub fn new(registry: Registry, config: Arc<Config>, store: Arc<dyn SpecStore>) -> Holder {
        Holder {
            registry,
            config,
            store,
            containers: BTreeMap::new(),
        }
    }

    /// Non-empty, at most 128 bytes, alphanumeric or underscore.
    /// The reserved root name is always valid.
    pub fn valid_name(name: &str) -> bool {
        if name == ROOT_CONTAINER {
            return true;
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return false;
        }
        name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    }

    pub fn create(&mut self, name: &str) -> Result<ContainerRef> {
        if !Self::valid_name(name) {
            return Err(Error::InvalidValue(format!("invalid container name {:?}", name)));
        }
        if self.containers.contains_key(name) {
            return Err(Error::InvalidValue(format!("container {} already exists", name)));
        }

        let mut container = Container::new(
            name,
            self.registry.clone(),
            self.config.clone(),
            self.store.clone(),
        );
        container.create()?;

        let handle = Arc::new(Mutex::new(container));
        self.containers.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Create and start the root container. It owns the engine-root
    /// cgroups and exists for the rest of the daemon's life.
    pub fn create_root(&mut self) -> Result<()> {
        let root = self.create(ROOT_CONTAINER)?;
        let result = root.lock().unwrap().start();
        result
    }

    pub fn get(&self, name: &str) -> Option<ContainerRef> {
        self.containers.get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.containers.keys().cloned().collect()
    }

    /// Stop (implicitly resuming if paused), drop, and forget a
    /// container. Teardown failures are logged but the container is
    /// removed regardless.
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        if name == ROOT_CONTAINER {
            return Err(Error::InvalidValue("cannot destroy the root container".to_string()));
        }
        let handle = self
            .containers
            .remove(name)
            .ok_or_else(|| Error::InvalidValue(format!("container {} does not exist", name)))?;

        {
            let mut container = handle.lock().unwrap();
            if container.state() != State::Stopped {
                if let Err(e) = container.stop() {
                    log::warn!("destroy {}: stop failed: {}", name, e);
                }
            }
        }

        if let Err(e) = self.store.remove(name) {
            log::warn!("destroy {}: cannot remove persisted spec: {}", name, e);
        }
        log::info!("destroyed {}", name);
        Ok(())
    }

    /// Materialize one container per persisted blob. A blob that fails
    /// to restore is logged and skipped; it must not take the daemon
    /// down with it.
    pub fn restore_all(&mut self) -> Result<()> {
        for (name, blob) in self.store.load_all()? {
            if name == ROOT_CONTAINER || self.containers.contains_key(&name) {
                continue;
            }
            if !Self::valid_name(&name) {
                log::warn!("skipping persisted spec with invalid name {:?}", name);
                continue;
            }

            let spec = match Spec::from_blob(&blob) {
                Ok(spec) => spec,
                Err(e) => {
                    log::warn!("skipping undecodable spec for {}: {}", name, e);
                    continue;
                }
            };

            let mut container = Container::new(
                &name,
                self.registry.clone(),
                self.config.clone(),
                self.store.clone(),
            );
            match container.restore(spec) {
                Ok(()) => {
                    log::info!("restored {} in state {}", name, container.state());
                    self.containers
                        .insert(name.clone(), Arc::new(Mutex::new(container)));
                }
                Err(e) => log::error!("cannot restore {}: {}", name, e),
            }
        }
        Ok(())
    }

    /// Route a reaped exit to its owner. Unmatched pids belong to
    /// orphans adopted from the pre-restart world; the caller logs and
    /// moves on.
    pub fn deliver_exit_status(&mut self, pid: Pid, status: i32) -> bool {
        for handle in self.containers.values() {
            if handle.lock().unwrap().deliver_exit_status(pid, status) {
                return true;
            }
        }
        false
    }

    /// Periodic housekeeping across all containers.
    pub fn heartbeat(&mut self) {
        for handle in self.containers.values() {
            handle.lock().unwrap().heartbeat();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;
    use crate::subsystem::SubsystemKind;

    fn scratch_holder(test: &str) -> Holder {
        let base = std::env::temp_dir().join("corral-holder-tests").join(test);
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
        Holder::new(registry, Arc::new(config), store)
    }

    #[test]
    fn name_grammar() {
        assert!(Holder::valid_name("a"));
        assert!(Holder::valid_name("web_1"));
        assert!(Holder::valid_name(ROOT_CONTAINER));
        assert!(Holder::valid_name(&"x".repeat(128)));

        assert!(!Holder::valid_name(""));
        assert!(!Holder::valid_name(&"x".repeat(129)));
        assert!(!Holder::valid_name("bad/name"));
        assert!(!Holder::valid_name("sp ace"));
        assert!(!Holder::valid_name("dash-ed"));
    }

    #[test]
    fn create_get_list_destroy() {
        let mut holder = scratch_holder("crud");
        holder.create("web").unwrap();
        assert!(holder.get("web").is_some());
        assert_eq!(holder.list(), vec!["web".to_string()]);

        assert_eq!(holder.create("web").unwrap_err().kind(), "InvalidValue");
        assert_eq!(holder.create("bad/name").unwrap_err().kind(), "InvalidValue");
        assert_eq!(holder.create("").unwrap_err().kind(), "InvalidValue");
        assert_eq!(
            holder.create(&"x".repeat(129)).unwrap_err().kind(),
            "InvalidValue"
        );

        holder.destroy("web").unwrap();
        assert!(holder.get("web").is_none());
        assert_eq!(holder.destroy("web").unwrap_err().kind(), "InvalidValue");
        assert_eq!(
            holder.destroy(ROOT_CONTAINER).unwrap_err().kind(),
            "InvalidValue"
        );
    }

    #[test]
    fn create_persists_and_destroy_forgets() {
        let mut holder = scratch_holder("persistence");
        holder.create("keep").unwrap();
        assert_eq!(holder.store.load_all().unwrap().len(), 1);
        holder.destroy("keep").unwrap();
        assert!(holder.store.load_all().unwrap().is_empty());
    }

    #[test]
    fn root_is_created_and_running() {
        let mut holder = scratch_holder("root");
        holder.create_root().unwrap();
        let root = holder.get(ROOT_CONTAINER).unwrap();
        assert_eq!(root.lock().unwrap().state(), State::Running);
        assert_eq!(
            root.lock().unwrap().get_data("state").unwrap(),
            "running"
        );
    }

    #[test]
    fn unmatched_exit_is_ignored() {
        let mut holder = scratch_holder("unmatched");
        holder.create("idle").unwrap();
        assert!(!holder.deliver_exit_status(Pid::from_raw(77777), 0));
    }

    #[test]
    fn restore_all_rebuilds_stopped_containers() {
        let mut holder = scratch_holder("restore-stopped");
        {
            let web = holder.create("web").unwrap();
            web.lock().unwrap().set_property("command", "sleep 60").unwrap();
        }

        let mut reborn = Holder::new(
            holder.registry.clone(),
            holder.config.clone(),
            holder.store.clone(),
        );
        reborn.restore_all().unwrap();

        let web = reborn.get("web").unwrap();
        let web = web.lock().unwrap();
        assert_eq!(web.state(), State::Stopped);
        assert_eq!(web.get_property("command").unwrap(), "sleep 60");
    }

    #[test]
    fn restore_all_adopts_live_pid() {
        let holder = scratch_holder("restore-live");

        // A blob pointing at this very process: comm matches, so the
        // restore path adopts instead of sweeping.
        let own_comm = std::fs::read_to_string("/proc/self/comm")
            .unwrap()
            .trim_end()
            .to_string();
        let mut spec = Spec::new();
        spec.set("command", &own_comm).unwrap();
        spec.set_internal("root_pid", &std::process::id().to_string());
        holder.store.save("adopted", &spec.to_blob().unwrap()).unwrap();

        let mut reborn = Holder::new(
            holder.registry.clone(),
            holder.config.clone(),
            holder.store.clone(),
        );
        reborn.restore_all().unwrap();

        let adopted = reborn.get("adopted").unwrap();
        let c = adopted.lock().unwrap();
        assert_eq!(c.state(), State::Running);
        assert_eq!(
            c.get_data("root_pid").unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn restore_all_sweeps_stale_pid() {
        let holder = scratch_holder("restore-stale");

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        let mut spec = Spec::new();
        spec.set("command", "sleep 9999").unwrap();
        spec.set_internal("root_pid", &dead_pid.to_string());
        holder.store.save("stale", &spec.to_blob().unwrap()).unwrap();

        let mut reborn = Holder::new(
            holder.registry.clone(),
            holder.config.clone(),
            holder.store.clone(),
        );
        reborn.restore_all().unwrap();

        let stale = reborn.get("stale").unwrap();
        assert_eq!(stale.lock().unwrap().state(), State::Stopped);
    }
}
