/// Cgroup subsystem registry.
///
/// The engine runs every container under three cgroup-v1 controllers:
/// cpu accounting, memory, and the freezer. Each controller has a
/// well-known kernel name, a mount under the cgroup filesystem, and a
/// fixed engine-root child under which all per-container directories
/// live. Missing mounts are fatal at startup; missing optional knobs
/// are downgraded to warnings.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cgroup::CgroupNode;
use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum SubsystemKind {
    Cpuacct,
    Memory,
    Freezer,
}

impl SubsystemKind {
    pub const ALL: [SubsystemKind; 3] = [
        SubsystemKind::Cpuacct,
        SubsystemKind::Memory,
        SubsystemKind::Freezer,
    ];

    pub fn kernel_name(self) -> &'static str {
        match self {
            SubsystemKind::Cpuacct => "cpuacct",
            SubsystemKind::Memory => "memory",
            SubsystemKind::Freezer => "freezer",
        }
    }
}

impl std::fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Process-wide registry of mounted controllers. Built once at startup
/// and passed to callers explicitly.
#[derive(Clone, Debug)]
pub struct Registry {
    base: PathBuf,
    engine_root: String,
    memory_has_low_limit: bool,
}

impl Registry {
    /// Verify every controller the engine needs is enabled and mounted,
    /// then probe optional capabilities.
    pub fn initialize(config: &Config) -> Result<Self> {
        let enabled = enabled_controllers()?;

        for kind in SubsystemKind::ALL {
            if !enabled.contains(kind.kernel_name()) {
                return Err(Error::InvalidValue(format!(
                    "required cgroup controller {} not enabled (enabled: {:?})",
                    kind, enabled
                )));
            }

            let mount = config.cgroup_base.join(kind.kernel_name());
            if !mount.is_dir() {
                return Err(Error::Io(format!(
                    "cgroup controller {} not mounted at {}",
                    kind,
                    mount.display()
                )));
            }
        }

        let memory_has_low_limit = config
            .cgroup_base
            .join("memory")
            .join("memory.low_limit_in_bytes")
            .exists();
        if !memory_has_low_limit {
            log::warn!("memory.low_limit_in_bytes not supported; memory_guarantee will be ignored");
        }

        log::info!(
            "cgroup subsystems ready under {} (engine root {})",
            config.cgroup_base.display(),
            config.engine_root
        );

        Ok(Self {
            base: config.cgroup_base.clone(),
            engine_root: config.engine_root.clone(),
            memory_has_low_limit,
        })
    }

    pub fn mount_point(&self, kind: SubsystemKind) -> PathBuf {
        self.base.join(kind.kernel_name())
    }

    /// The fixed engine-root node of one controller. Created lazily by
    /// the root container's PrepareCgroups, not here.
    pub fn engine_node(&self, kind: SubsystemKind) -> CgroupNode {
        CgroupNode::new(kind, self.mount_point(kind).join(&self.engine_root))
    }

    /// The per-container leaf node. Containers never nest: the layout
    /// is always <mount>/<engine-root>/<container-name>.
    pub fn container_node(&self, kind: SubsystemKind, name: &str) -> CgroupNode {
        CgroupNode::new(
            kind,
            self.mount_point(kind).join(&self.engine_root).join(name),
        )
    }

    pub fn memory_has_low_limit(&self) -> bool {
        self.memory_has_low_limit
    }

    /// Registry over a scratch directory layout, bypassing the
    /// /proc/cgroups probe.
    #[cfg(test)]
    pub(crate) fn with_layout_for_tests(config: &Config) -> Registry {
        Registry {
            base: config.cgroup_base.clone(),
            engine_root: config.engine_root.clone(),
            memory_has_low_limit: false,
        }
    }
}

fn enabled_controllers() -> Result<HashSet<String>> {
    let content = fs::read_to_string("/proc/cgroups")
        .map_err(|e| Error::from_io("read /proc/cgroups", e))?;

    let mut controllers = HashSet::new();
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 4 && parts[3] == "1" {
            controllers.insert(parts[0].to_string());
        }
    }
    Ok(controllers)
}

// cpuacct

/// Consumed CPU time in nanoseconds.
pub fn cpu_usage_ns(cg: &CgroupNode) -> Result<u64> {
    parse_u64(cg, "cpuacct.usage")
}

// memory

/// Current memory footprint in bytes.
pub fn memory_usage_bytes(cg: &CgroupNode) -> Result<u64> {
    parse_u64(cg, "memory.usage_in_bytes")
}

/// Enable hierarchical accounting on a memory node.
///
/// The kernel rejects the write once the node has member tasks; if the
/// knob already reads 1 that rejection is not an error.
pub fn set_use_hierarchy(cg: &CgroupNode) -> Result<()> {
    match cg.set_knob("memory.use_hierarchy", "1") {
        Ok(()) => Ok(()),
        Err(err) => {
            if cg.get_knob("memory.use_hierarchy").map(|v| v == "1").unwrap_or(false) {
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn parse_u64(cg: &CgroupNode, knob: &str) -> Result<u64> {
    let raw = cg.get_knob(knob)?;
    raw.parse::<u64>()
        .map_err(|e| Error::Unknown(format!("parse {} {:?}: {}", knob, raw, e)))
}

// freezer

pub const FROZEN: &str = "FROZEN";
pub const THAWED: &str = "THAWED";

pub fn freezer_state(cg: &CgroupNode) -> Result<String> {
    cg.get_knob("freezer.state")
}

pub fn freeze(cg: &CgroupNode, deadline: Duration) -> Result<()> {
    set_freezer_state(cg, FROZEN, deadline)
}

pub fn thaw(cg: &CgroupNode, deadline: Duration) -> Result<()> {
    set_freezer_state(cg, THAWED, deadline)
}

/// Write the target state, then poll until the kernel reports the
/// transition finished. FREEZING is a transient state on the way to
/// FROZEN. The deadline keeps a wedged freezer from hanging the engine.
fn set_freezer_state(cg: &CgroupNode, target: &str, deadline: Duration) -> Result<()> {
    cg.set_knob("freezer.state", target)?;

    let started = Instant::now();
    loop {
        let state = freezer_state(cg)?;
        if state == target {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            return Err(Error::Timeout(format!(
                "freezer {} stuck in {} waiting for {}",
                cg.path().display(),
                state,
                target
            )));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Detecting cgroup-v1 support, used by tests to skip on unsupported hosts.
pub fn cgroups_available() -> bool {
    Path::new("/proc/cgroups").exists() && Path::new("/sys/fs/cgroup").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_names_are_stable() {
        assert_eq!(SubsystemKind::Cpuacct.kernel_name(), "cpuacct");
        assert_eq!(SubsystemKind::Memory.kernel_name(), "memory");
        assert_eq!(SubsystemKind::Freezer.kernel_name(), "freezer");
    }

    #[test]
    fn node_layout_is_three_levels() {
        let registry = Registry {
            base: PathBuf::from("/sys/fs/cgroup"),
            engine_root: "corral".to_string(),
            memory_has_low_limit: false,
        };
        let node = registry.container_node(SubsystemKind::Freezer, "web");
        assert_eq!(
            node.path(),
            Path::new("/sys/fs/cgroup/freezer/corral/web")
        );
        let engine = registry.engine_node(SubsystemKind::Memory);
        assert_eq!(engine.path(), Path::new("/sys/fs/cgroup/memory/corral"));
    }

    #[test]
    fn initialize_requires_mounts() {
        // Point the base somewhere empty: every controller is missing.
        let cfg = Config {
            cgroup_base: std::env::temp_dir().join("corral-test-no-cgroups"),
            ..Config::default()
        };
        if !cgroups_available() {
            return;
        }
        assert!(Registry::initialize(&cfg).is_err());
    }
}
