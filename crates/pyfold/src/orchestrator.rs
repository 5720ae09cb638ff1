use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    closure::ClosureBuilder,
    config::Config,
    emit::{Bundle, EmitOptions, emit},
    interpreter::interpreter_search_paths,
    resolver::{ModuleResolver, SearchRoots},
};

/// Drives one bundling run: search roots, closure, emission.
#[derive(Debug, Clone)]
pub struct BundleOrchestrator {
    config: Config,
}

impl BundleOrchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the search roots for an entry located in `entry_dir`.
    pub fn search_roots(&self, entry_dir: Option<&Path>) -> Result<SearchRoots> {
        let interpreter_paths = match &self.config.python_binary {
            Some(binary) => interpreter_search_paths(binary)?,
            None => Vec::new(),
        };
        Ok(SearchRoots::new(
            entry_dir,
            &self.config.src,
            &interpreter_paths,
        ))
    }

    /// Bundle `entry_path` and everything it imports.
    pub fn bundle(&self, entry_path: &Path) -> Result<Bundle> {
        let entry_path = entry_path
            .canonicalize()
            .with_context(|| format!("Entry script {} does not exist", entry_path.display()))?;
        let entry_dir = entry_path.parent();
        info!("Bundling {}", entry_path.display());

        let roots = self.search_roots(entry_dir)?;
        let mut resolver = ModuleResolver::new(roots);
        let entry = ClosureBuilder::new(&mut resolver, self.config.python_version)
            .build(&entry_path, &self.config.python_modules)?;

        let bundle = emit(
            &entry,
            &EmitOptions {
                mode: self.config.mode,
                copy_shebang: self.config.copy_shebang,
                shebang: self.config.shebang.clone(),
            },
        )?;

        info!(
            "Bundled {} local modules into {} output ({} bytes)",
            bundle.modules.len(),
            bundle.mode,
            bundle.contents.len()
        );
        for (identity, hash) in &bundle.modules {
            debug!("  {identity} {hash}");
        }
        Ok(bundle)
    }
}

/// Write a bundle to `output`, creating parent directories as needed.
///
/// The file is made executable on Unix.
pub fn write_bundle(bundle: &Bundle, output: &Path) -> Result<PathBuf> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    std::fs::write(output, &bundle.contents)
        .with_context(|| format!("Failed to write bundle to {}", output.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(output, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", output.display()))?;
    }

    info!("Wrote {}", output.display());
    Ok(output.to_path_buf())
}
