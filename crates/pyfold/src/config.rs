//! Configuration loading
//!
//! Layers, lowest precedence first: built-in defaults, the per-user
//! `pyfold.toml`, the project's `pyfold.toml` (or `[tool.pyfold]` in
//! `pyproject.toml`), `PYFOLD_*` environment variables, and finally the
//! command line. Scalars from a later layer replace earlier ones; lists are
//! appended.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

use crate::{dirs, emit::OutputMode};

/// Default interpreter directive for generated bundles
pub const DEFAULT_SHEBANG: &str = "/usr/bin/env python";

/// Python 3 minor version whose standard library is assumed by default
pub const DEFAULT_PYTHON_VERSION: u8 = 12;

pub const ENV_PYTHON_BINARY: &str = "PYFOLD_PYTHON_BINARY";
pub const ENV_PYTHON_VERSION: &str = "PYFOLD_PYTHON_VERSION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Extra search roots, searched after the entry's directory
    pub src: Vec<PathBuf>,
    /// Modules to bundle even though no static import names them
    pub python_modules: Vec<String>,
    /// Interpreter whose `sys.path` is appended to the search roots
    pub python_binary: Option<PathBuf>,
    /// Minor version of Python 3 used for stdlib classification
    pub python_version: u8,
    pub copy_shebang: bool,
    pub shebang: String,
    pub mode: OutputMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            python_modules: Vec::new(),
            python_binary: None,
            python_version: DEFAULT_PYTHON_VERSION,
            copy_shebang: false,
            shebang: DEFAULT_SHEBANG.to_owned(),
            mode: OutputMode::default(),
        }
    }
}

/// One configuration file's contents; absent keys leave the layer below
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ConfigFile {
    pub src: Vec<PathBuf>,
    pub python_modules: Vec<String>,
    pub python_binary: Option<PathBuf>,
    pub python_version: Option<u8>,
    pub copy_shebang: Option<bool>,
    pub shebang: Option<String>,
    pub mode: Option<OutputMode>,
}

#[derive(Debug, Deserialize)]
struct PyProject {
    tool: Option<PyProjectTool>,
}

#[derive(Debug, Deserialize)]
struct PyProjectTool {
    pyfold: Option<ConfigFile>,
}

impl ConfigFile {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Extract `[tool.pyfold]` from a `pyproject.toml`
    pub fn from_pyproject(contents: &str) -> Result<Option<Self>> {
        let pyproject: PyProject = toml::from_str(contents)?;
        Ok(pyproject.tool.and_then(|tool| tool.pyfold))
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut file = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        file.anchor_paths(path.parent());
        Ok(file)
    }

    /// Relative paths in a file are relative to the file's directory
    fn anchor_paths(&mut self, base: Option<&Path>) {
        let Some(base) = base else {
            return;
        };
        for dir in &mut self.src {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

impl Config {
    /// Load all file and environment layers.
    ///
    /// With `explicit` set, that file replaces project config discovery.
    pub fn load(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_file) = dirs::user_config_file().filter(|p| p.is_file()) {
            debug!("Loading user config from {}", user_file.display());
            config.merge(ConfigFile::read(&user_file)?);
        }

        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            config.merge(ConfigFile::read(path)?);
        } else if let Some(project) = Self::project_config(project_dir)? {
            config.merge(project);
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn project_config(project_dir: &Path) -> Result<Option<ConfigFile>> {
        let dedicated = project_dir.join(dirs::CONFIG_FILE_NAME);
        if dedicated.is_file() {
            debug!("Loading project config from {}", dedicated.display());
            return ConfigFile::read(&dedicated).map(Some);
        }

        let pyproject = project_dir.join("pyproject.toml");
        if !pyproject.is_file() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&pyproject)
            .with_context(|| format!("Failed to read {}", pyproject.display()))?;
        let mut file = ConfigFile::from_pyproject(&contents)
            .with_context(|| format!("Invalid [tool.pyfold] in {}", pyproject.display()))?;
        if let Some(file) = &mut file {
            debug!("Loading project config from {}", pyproject.display());
            file.anchor_paths(Some(project_dir));
        }
        Ok(file)
    }

    pub fn merge(&mut self, file: ConfigFile) {
        self.src.extend(file.src);
        self.python_modules.extend(file.python_modules);
        if let Some(binary) = file.python_binary {
            self.python_binary = Some(binary);
        }
        if let Some(version) = file.python_version {
            self.python_version = version;
        }
        if let Some(copy) = file.copy_shebang {
            self.copy_shebang = copy;
        }
        if let Some(shebang) = file.shebang {
            self.shebang = shebang;
        }
        if let Some(mode) = file.mode {
            self.mode = mode;
        }
    }

    /// Apply `PYFOLD_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(binary) = lookup(ENV_PYTHON_BINARY).filter(|v| !v.is_empty()) {
            self.python_binary = Some(PathBuf::from(binary));
        }
        if let Some(version) = lookup(ENV_PYTHON_VERSION).filter(|v| !v.is_empty()) {
            self.python_version = parse_python_version(&version)
                .with_context(|| format!("Invalid {ENV_PYTHON_VERSION}={version}"))?;
        }
        Ok(())
    }
}

/// Accepts `11`, `3.11` or `py311`
pub fn parse_python_version(value: &str) -> Result<u8> {
    let value = value.trim();
    let minor = value
        .strip_prefix("3.")
        .or_else(|| value.strip_prefix("py3"))
        .unwrap_or(value);
    minor
        .parse::<u8>()
        .with_context(|| format!("expected a Python 3 minor version, got `{value}`"))
}
