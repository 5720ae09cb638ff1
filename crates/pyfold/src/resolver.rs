use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::{
    error::{BundleError, BundleResult},
    types::{
        FxIndexMap, FxIndexSet, ImportDeclaration, ModuleContext, PACKAGE_INIT, ResolvedModule,
        SOURCE_EXTENSION,
    },
};

/// Ordered, deduplicated list of directories searched for absolute imports.
///
/// The entry file's directory is always first, then directories supplied by
/// the caller, then the interpreter's own `sys.path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRoots {
    roots: Vec<PathBuf>,
}

impl SearchRoots {
    pub fn new(entry_dir: Option<&Path>, extra: &[PathBuf], interpreter: &[PathBuf]) -> Self {
        let mut unique_dirs = FxIndexSet::default();

        let ordered = entry_dir
            .into_iter()
            .chain(extra.iter().map(PathBuf::as_path))
            .chain(interpreter.iter().map(PathBuf::as_path));

        for dir in ordered {
            // `Path::new("")` is the parent of a bare file name
            let dir = if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir
            };
            if !dir.is_dir() {
                trace!("Skipping search root {} (not a directory)", dir.display());
                continue;
            }
            unique_dirs.insert(canonicalize_path(dir.to_path_buf()));
        }

        Self {
            roots: unique_dirs.into_iter().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl std::fmt::Display for SearchRoots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, root) in self.roots.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", root.display())?;
        }
        Ok(())
    }
}

/// Resolve symlinks and `..` so equal directories compare equal; falls back
/// to the path as given.
fn canonicalize_path(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or_else(|e| {
        warn!("Failed to canonicalize path {}: {e}", path.display());
        path
    })
}

/// A module file found on disk, before its source is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub identity: String,
    pub path: PathBuf,
    pub is_package: bool,
}

impl ModuleLocation {
    /// Read the module source into a [`ResolvedModule`]
    pub fn load(self) -> BundleResult<ResolvedModule> {
        let source = std::fs::read(&self.path).map_err(|e| BundleError::io(&self.path, e))?;
        Ok(ResolvedModule::new(
            self.identity,
            self.path,
            self.is_package,
            source,
        ))
    }
}

/// Maps import declarations to module files on the search roots.
#[derive(Debug)]
pub struct ModuleResolver {
    roots: SearchRoots,
    /// Cache of located modules by absolute dotted name
    module_cache: FxIndexMap<String, Option<ModuleLocation>>,
}

impl ModuleResolver {
    pub fn new(roots: SearchRoots) -> Self {
        debug!("Search roots: [{roots}]");
        Self {
            roots,
            module_cache: FxIndexMap::default(),
        }
    }

    pub fn search_roots(&self) -> &SearchRoots {
        &self.roots
    }

    /// Resolve a declaration to every module file it may refer to, with
    /// sources loaded.
    ///
    /// Zero results is the normal outcome when the import names something
    /// that is not a local module.
    pub fn resolve(
        &mut self,
        declaration: &ImportDeclaration,
        context: Option<&ModuleContext>,
    ) -> BundleResult<Vec<ResolvedModule>> {
        self.locate(declaration, context)
            .into_iter()
            .map(ModuleLocation::load)
            .collect()
    }

    /// Like [`resolve`](Self::resolve) but without reading any source.
    pub fn locate(
        &mut self,
        declaration: &ImportDeclaration,
        context: Option<&ModuleContext>,
    ) -> Vec<ModuleLocation> {
        let candidates = candidate_names(declaration, context);
        let mut found = Vec::new();
        for name in candidates {
            match self.locate_module(&name) {
                Some(location) => found.push(location),
                None => trace!("No module file for candidate '{name}' of `{declaration}`"),
            }
        }
        found
    }

    /// Find the file for an absolute dotted module name.
    ///
    /// Roots are tried in priority order; within a root the package form
    /// `name/__init__.py` is tried before the plain module `name.py`.
    pub fn locate_module(&mut self, module_name: &str) -> Option<ModuleLocation> {
        if let Some(cached) = self.module_cache.get(module_name) {
            return cached.clone();
        }

        let parts: Vec<&str> = module_name.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            warn!("Ignoring malformed module name '{module_name}'");
            return None;
        }

        let located = self
            .roots
            .iter()
            .find_map(|root| locate_in_root(root, &parts))
            .map(|(path, is_package)| ModuleLocation {
                identity: module_name.to_owned(),
                path: canonicalize_path(path),
                is_package,
            });

        if let Some(location) = &located {
            debug!(
                "Resolved '{}' to {}",
                location.identity,
                location.path.display()
            );
        }
        self.module_cache
            .insert(module_name.to_owned(), located.clone());
        located
    }
}

fn locate_in_root(root: &Path, parts: &[&str]) -> Option<(PathBuf, bool)> {
    let module_dir = parts.iter().fold(root.to_path_buf(), |path, part| path.join(part));

    let package_init = module_dir.join(PACKAGE_INIT);
    if package_init.is_file() {
        return Some((package_init, true));
    }

    let module_file = module_dir.with_extension(SOURCE_EXTENSION);
    if module_file.is_file() {
        return Some((module_file, false));
    }

    None
}

/// Turn a possibly relative declaration into an absolute dotted name.
///
/// Returns `Some("")` for `from . import x` at the top level, and `None` when
/// the import climbs above the top-level package.
pub fn absolute_module_name(
    declaration: &ImportDeclaration,
    context: Option<&ModuleContext>,
) -> Option<String> {
    if !declaration.is_relative() {
        return Some(declaration.target_name.clone());
    }

    let Some(context) = context else {
        warn!("Cannot resolve relative import `{declaration}` without module context");
        return None;
    };

    let mut package: Vec<&str> = context.name.split('.').filter(|p| !p.is_empty()).collect();
    // A package's own name already denotes its directory
    let climb = declaration.relative_level as usize - usize::from(context.is_package);
    if climb > package.len() {
        warn!(
            "Relative import `{declaration}` in '{}' goes beyond the top-level package",
            context.name
        );
        return None;
    }
    package.truncate(package.len() - climb);

    if !declaration.target_name.is_empty() {
        package.push(&declaration.target_name);
    }
    Some(package.join("."))
}

/// Every dotted name a declaration may cause the interpreter to load:
/// the ancestors of the absolute name (shallow first), the name itself, and
/// `name.item` for each imported item.
pub fn candidate_names(
    declaration: &ImportDeclaration,
    context: Option<&ModuleContext>,
) -> Vec<String> {
    let Some(absolute) = absolute_module_name(declaration, context) else {
        return Vec::new();
    };

    let mut names = FxIndexSet::default();
    if !absolute.is_empty() {
        let mut prefix = String::with_capacity(absolute.len());
        for part in absolute.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            names.insert(prefix.clone());
        }
    }

    for item in &declaration.items {
        if item == "*" {
            continue;
        }
        if absolute.is_empty() {
            names.insert(item.clone());
        } else {
            names.insert(format!("{absolute}.{item}"));
        }
    }

    names.into_iter().collect()
}
