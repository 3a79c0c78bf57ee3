/// Container specification: a key/value map split into the user
/// property namespace and an internal namespace written by the engine
/// (e.g. root_pid). Each user property is tagged dynamic (settable
/// while running) or static (settable only while stopped).
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub struct PropertyDef {
    pub name: &'static str,
    pub desc: &'static str,
    pub dynamic: bool,
    pub default: &'static str,
}

/// The user property catalogue. The dynamic flag is part of the
/// contract: SetProperty rejects static properties outside Stopped.
pub const PROPERTIES: &[PropertyDef] = &[
    PropertyDef { name: "command", desc: "command executed on start", dynamic: false, default: "" },
    PropertyDef { name: "cwd", desc: "working directory of the task", dynamic: false, default: "/" },
    PropertyDef { name: "root", desc: "chroot directory, empty for none", dynamic: false, default: "" },
    PropertyDef { name: "user", desc: "user the task runs as, empty to inherit", dynamic: false, default: "" },
    PropertyDef { name: "group", desc: "group the task runs as, empty to inherit", dynamic: false, default: "" },
    PropertyDef { name: "env", desc: "semicolon-separated KEY=VALUE pairs", dynamic: false, default: "" },
    PropertyDef { name: "memory_limit", desc: "memory limit in bytes, 0 for none", dynamic: true, default: "0" },
    PropertyDef { name: "memory_guarantee", desc: "memory guarantee in bytes, 0 for none", dynamic: true, default: "0" },
    PropertyDef { name: "stdin_path", desc: "stdin target", dynamic: false, default: "/dev/null" },
    PropertyDef { name: "stdout_path", desc: "stdout target, empty for the engine default", dynamic: false, default: "" },
    PropertyDef { name: "stderr_path", desc: "stderr target, empty for the engine default", dynamic: false, default: "" },
];

fn lookup(name: &str) -> Option<&'static PropertyDef> {
    PROPERTIES.iter().find(|p| p.name == name)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Spec {
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    internal: BTreeMap<String, String>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a user property, falling back to the catalogue default.
    pub fn get(&self, name: &str) -> Result<String> {
        let def = lookup(name)
            .ok_or_else(|| Error::InvalidProperty(format!("unknown property {}", name)))?;
        Ok(self
            .properties
            .get(name)
            .cloned()
            .unwrap_or_else(|| def.default.to_string()))
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if lookup(name).is_none() {
            return Err(Error::InvalidProperty(format!("unknown property {}", name)));
        }
        self.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn is_dynamic(name: &str) -> Result<bool> {
        lookup(name)
            .map(|def| def.dynamic)
            .ok_or_else(|| Error::InvalidProperty(format!("unknown property {}", name)))
    }

    pub fn get_internal(&self, name: &str) -> Option<&str> {
        self.internal.get(name).map(|s| s.as_str())
    }

    pub fn set_internal(&mut self, name: &str, value: &str) {
        self.internal.insert(name.to_string(), value.to_string());
    }

    pub fn clear_internal(&mut self, name: &str) {
        self.internal.remove(name);
    }

    /// Wire form stored in the spec store. Opaque to the store itself.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Unknown(format!("encode spec: {}", e)))
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        serde_json::from_slice(blob)
            .map_err(|e| Error::InvalidValue(format!("decode spec: {}", e)))
    }
}
