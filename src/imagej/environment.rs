use std::{fs, path::Path};

use crate::config::Configuration;
use crate::error::TaskError;

/// Main artifact of an ImageJ installation.
pub const IMAGEJ_JAR: &str = "ij.jar";

/// Whether the configured folder holds a usable ImageJ installation.
pub fn is_valid(configuration: &Configuration) -> bool {
    check(configuration).is_ok()
}

/// Same as [`is_valid`] but says what is wrong.
pub fn check(configuration: &Configuration) -> Result<&Path, TaskError> {
    let Some(root) = configuration.path.as_deref() else {
        return Err(TaskError::NotConfigured("no installation path set".to_string()));
    };
    if !root.is_dir() {
        return Err(TaskError::NotConfigured(format!("{} is not a folder", root.display())));
    }
    match fs::metadata(root.join(IMAGEJ_JAR)) {
        Ok(meta) if meta.is_file() => Ok(root),
        Ok(_) => Err(TaskError::NotConfigured(format!(
            "{} in {} is not a file",
            IMAGEJ_JAR,
            root.display()
        ))),
        Err(_) => Err(TaskError::NotConfigured(format!(
            "{} does not contain {}",
            root.display(),
            IMAGEJ_JAR
        ))),
    }
}
