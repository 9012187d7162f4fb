use std::{
    env,
    path::{Path, PathBuf},
};

use crate::config::Configuration;
use crate::error::TaskError;
use crate::imagej::environment::{self, IMAGEJ_JAR};
use crate::worker::launcher::{IoPolicy, LaunchRequest};

pub const JAVA: &str = "java";
pub const MACROS_ENV: &str = "IMAGEJ_TASKS_MACROS";
const MACROS_DIR: &str = "macros";

/// What a task asks ImageJ to do, before memory and paths are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub macro_name: Option<&'static str>,
    pub argument: Option<String>,
    pub io: IoPolicy,
}

impl Invocation {
    pub fn batch(macro_name: &'static str, argument: String) -> Self {
        Self {
            macro_name: Some(macro_name),
            argument: Some(argument),
            io: IoPolicy::Capture,
        }
    }

    /// Opens the ImageJ GUI. With `console` its output shares our terminal.
    pub fn interactive(console: bool) -> Self {
        Self {
            macro_name: None,
            argument: None,
            io: if console { IoPolicy::Inherit } else { IoPolicy::Discard },
        }
    }

    /// Fails without touching any process when the installation is unusable.
    pub fn to_request(
        &self,
        configuration: &Configuration,
        macros_dir: &Path,
    ) -> Result<LaunchRequest, TaskError> {
        let root = environment::check(configuration)?;

        let mut args = vec![
            format!("-Xmx{}m", configuration.memory),
            format!("-Xss{}m", configuration.stack_memory),
            "-jar".to_string(),
            IMAGEJ_JAR.to_string(),
        ];
        if let Some(name) = self.macro_name {
            args.push("-batchpath".to_string());
            args.push(macros_dir.join(format!("{}.ijm", name)).to_string_lossy().into_owned());
            if let Some(argument) = &self.argument {
                args.push(argument.clone());
            }
        }

        Ok(LaunchRequest {
            program: JAVA.to_string(),
            args,
            working_dir: Some(root.to_path_buf()),
            io: self.io,
        })
    }
}

/// Where the `.ijm` macros ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Development,
    Packaged,
}

impl Layout {
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            Layout::Development
        } else {
            Layout::Packaged
        }
    }
}

pub fn macros_dir(layout: Layout, override_dir: Option<PathBuf>, exe: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    match layout {
        Layout::Development => Path::new(env!("CARGO_MANIFEST_DIR")).join(MACROS_DIR),
        Layout::Packaged => exe
            .and_then(Path::parent)
            .map(|dir| dir.join(MACROS_DIR))
            .unwrap_or_else(|| PathBuf::from(MACROS_DIR)),
    }
}

pub fn default_macros_dir() -> PathBuf {
    let exe = env::current_exe().ok();
    macros_dir(
        Layout::current(),
        env::var_os(MACROS_ENV).map(PathBuf::from),
        exe.as_deref(),
    )
}
