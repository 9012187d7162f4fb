use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::System;
use tempfile::NamedTempFile;

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

const APP_DIR: &str = "imagej_tasks";
const CONFIG_FILE: &str = "imagej-configuration.json";

pub const MIN_MEMORY_MB: u64 = 100;
pub const MIN_STACK_MEMORY_MB: u64 = 10;
pub const MAX_STACK_MEMORY_MB: u64 = 515;

/// Upper bounds for the JVM memory flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    pub max_memory: u64,
    pub max_stack_memory: u64,
}

impl MemoryLimits {
    /// Heap ceiling is 70% of physical memory, in MB.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self::from_total_memory(sys.total_memory())
    }

    pub fn from_total_memory(total_bytes: u64) -> Self {
        let max_memory = ((total_bytes as f64 * 0.7) / 1_000_000.0) as u64;
        Self {
            max_memory: max_memory.max(MIN_MEMORY_MB),
            max_stack_memory: MAX_STACK_MEMORY_MB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub memory: u64,
    pub stack_memory: u64,
}

impl Configuration {
    pub fn with_limits(limits: MemoryLimits) -> Self {
        Self {
            path: None,
            memory: limits.max_memory,
            stack_memory: limits.max_stack_memory,
        }
    }

    pub fn set_memory(&mut self, memory: u64, limits: &MemoryLimits) -> ConfigResult<()> {
        if !(MIN_MEMORY_MB..=limits.max_memory).contains(&memory) {
            return Err(ConfigError::MemoryOutOfRange {
                value: memory,
                min: MIN_MEMORY_MB,
                max: limits.max_memory,
            });
        }
        self.memory = memory;
        Ok(())
    }

    pub fn set_stack_memory(&mut self, stack_memory: u64, limits: &MemoryLimits) -> ConfigResult<()> {
        if !(MIN_STACK_MEMORY_MB..=limits.max_stack_memory).contains(&stack_memory) {
            return Err(ConfigError::StackMemoryOutOfRange {
                value: stack_memory,
                min: MIN_STACK_MEMORY_MB,
                max: limits.max_stack_memory,
            });
        }
        self.stack_memory = stack_memory;
        Ok(())
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path.filter(|p| !p.as_os_str().is_empty());
    }
}

/// Stored form, tolerant of the loosely typed values older versions wrote.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredConfiguration {
    path: Option<Value>,
    memory: Option<Value>,
    stack_memory: Option<Value>,
}

fn positive(value: Option<&Value>) -> Option<u64> {
    let number = match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (number > 0).then_some(number)
}

impl StoredConfiguration {
    fn sanitize(self, limits: &MemoryLimits) -> Configuration {
        let path = match self.path {
            Some(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        };
        Configuration {
            path,
            memory: positive(self.memory.as_ref())
                .map(|m| m.min(limits.max_memory))
                .unwrap_or(limits.max_memory),
            stack_memory: positive(self.stack_memory.as_ref())
                .map(|m| m.min(limits.max_stack_memory))
                .unwrap_or(limits.max_stack_memory),
        }
    }
}

/// JSON-backed persistence for [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn with_default_path() -> ConfigResult<Self> {
        let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Ok(Self::new(config_path(xdg.as_deref(), home.as_deref())?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load(&self, limits: &MemoryLimits) -> Configuration {
        if !self.path.exists() {
            return Configuration::with_limits(*limits);
        }
        let stored = fs::read_to_string(&self.path)
            .map_err(ConfigError::from)
            .and_then(|contents| {
                serde_json::from_str::<StoredConfiguration>(&contents).map_err(ConfigError::from)
            });
        match stored {
            Ok(stored) => stored.sanitize(limits),
            Err(err) => {
                warn!("Failed to load {}: {}; using defaults", self.path.display(), err);
                Configuration::with_limits(*limits)
            }
        }
    }

    pub fn save(&self, configuration: &Configuration) -> ConfigResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut temp_file = NamedTempFile::new_in(&parent)?;
        let json = serde_json::to_string_pretty(configuration)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&self.path)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}

pub fn config_path(xdg_config_home: Option<&Path>, home: Option<&Path>) -> ConfigResult<PathBuf> {
    let mut root = match xdg_config_home.filter(|p| !p.as_os_str().is_empty()) {
        Some(xdg) => xdg.to_path_buf(),
        None => home.ok_or(ConfigError::MissingHomeDirectory)?.join(".config"),
    };
    root.push(APP_DIR);
    root.push(CONFIG_FILE);
    Ok(root)
}
