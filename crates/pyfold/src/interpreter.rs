//! Discovery of an interpreter's default module search path
//!
//! The binary is run with `-E` so that `PYTHONPATH` and friends in the
//! bundling environment do not leak into the search roots.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};
use log::debug;

const PRINT_SYS_PATH: &str = "import sys\nfor path in sys.path: print(path)";

/// Ask `binary` for its `sys.path`, in order.
pub fn interpreter_search_paths(binary: &Path) -> Result<Vec<PathBuf>> {
    let output = Command::new(binary)
        .args(["-E", "-c", PRINT_SYS_PATH])
        .output()
        .with_context(|| format!("Failed to run Python interpreter {}", binary.display()))?;

    if !output.status.success() {
        bail!(
            "Python interpreter {} exited with {}: {}",
            binary.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8(output.stdout).with_context(|| {
        format!(
            "Python interpreter {} printed a non-UTF-8 sys.path",
            binary.display()
        )
    })?;
    let paths = parse_sys_path(&stdout);
    debug!(
        "Interpreter {} contributes {} search paths",
        binary.display(),
        paths.len()
    );
    Ok(paths)
}

fn parse_sys_path(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}
