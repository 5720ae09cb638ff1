//! Dependency closure construction
//!
//! Starting from the entry script, every import is scanned, classified and
//! located; each newly found local module is inserted into the closure
//! *before* its own imports are followed. A module that imports back into an
//! ancestor therefore finds the ancestor already present and stops, which is
//! what makes circular imports terminate.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use cow_utils::CowUtils;
use log::{debug, trace, warn};
use rustc_hash::FxHashSet;

use crate::{
    error::{BundleError, BundleResult},
    resolver::ModuleResolver,
    stdlib_detection::is_stdlib_module,
    types::{Closure, ENTRY_MODULE_NAME, ImportDeclaration, ModuleContext, ResolvedModule},
    visitors::scan_imports,
};

/// The entry script and everything it transitively imports
#[derive(Debug, Clone)]
pub struct EntryClosure {
    pub entry_path: PathBuf,
    pub entry_source: String,
    pub closure: Closure,
}

/// Mutable state of one traversal, owned by the caller of `visit_*`
#[derive(Debug, Default)]
struct Traversal {
    closure: Closure,
    /// Identities whose imports have been (or are being) scanned
    scanned: FxHashSet<String>,
}

/// Builds the closure of local modules reachable from an entry script.
#[derive(Debug)]
pub struct ClosureBuilder<'a> {
    resolver: &'a mut ModuleResolver,
    python_version: u8,
}

impl<'a> ClosureBuilder<'a> {
    pub fn new(resolver: &'a mut ModuleResolver, python_version: u8) -> Self {
        Self {
            resolver,
            python_version,
        }
    }

    /// Build the closure for `entry_path`.
    ///
    /// `forced_modules` are resolved as absolute imports in addition to the
    /// statically discovered ones; each must exist on some search root.
    pub fn build(
        &mut self,
        entry_path: &Path,
        forced_modules: &[String],
    ) -> BundleResult<EntryClosure> {
        let entry_source = read_source(entry_path)?;
        let closure = self.build_from_source(&entry_source, entry_path, forced_modules)?;
        Ok(EntryClosure {
            entry_path: entry_path.to_path_buf(),
            entry_source,
            closure,
        })
    }

    /// Build the closure for an entry whose source is already in memory.
    pub fn build_from_source(
        &mut self,
        entry_source: &str,
        entry_path: &Path,
        forced_modules: &[String],
    ) -> BundleResult<Closure> {
        let mut traversal = Traversal::default();
        traversal.scanned.insert(ENTRY_MODULE_NAME.to_owned());

        let entry_context = ModuleContext::entry();
        self.visit_source(entry_source, entry_path, &entry_context, &mut traversal)?;

        for name in forced_modules {
            if is_stdlib_module(name, self.python_version) {
                warn!("Not bundling forced module '{name}': it is part of the standard library");
                continue;
            }
            if self.resolver.locate_module(name).is_none() {
                return Err(BundleError::UnresolvedForcedModule {
                    name: name.clone(),
                    roots: self.resolver.search_roots().to_string(),
                });
            }
            let declaration = ImportDeclaration::absolute(name.as_str());
            self.visit_import(&declaration, None, &mut traversal)?;
        }

        debug!(
            "Closure of {} contains {} modules",
            entry_path.display(),
            traversal.closure.len()
        );
        Ok(traversal.closure)
    }

    fn visit_source(
        &mut self,
        source: &str,
        path: &Path,
        context: &ModuleContext,
        traversal: &mut Traversal,
    ) -> BundleResult<()> {
        for declaration in scan_imports(source, path)? {
            if !declaration.is_relative()
                && is_stdlib_module(&declaration.target_name, self.python_version)
            {
                trace!("Skipping stdlib import `{declaration}` in {}", path.display());
                continue;
            }
            self.visit_import(&declaration, Some(context), traversal)?;
        }
        Ok(())
    }

    /// Resolve one declaration and follow every module it reaches.
    fn visit_import(
        &mut self,
        declaration: &ImportDeclaration,
        context: Option<&ModuleContext>,
        traversal: &mut Traversal,
    ) -> BundleResult<()> {
        for location in self.resolver.locate(declaration, context) {
            if traversal.closure.contains(&location.identity)
                || location.identity == ENTRY_MODULE_NAME
            {
                continue;
            }
            // Relative imports and forced names reach here unclassified
            if is_stdlib_module(&location.identity, self.python_version) {
                trace!(
                    "Skipping '{}' reached by `{declaration}`: standard library",
                    location.identity
                );
                continue;
            }
            let module = location.load()?;
            debug!(
                "Bundling '{}' from {} (sha256 {})",
                module.identity,
                module.absolute_path.display(),
                &module.content_hash[..12]
            );
            traversal.closure.insert(module.clone());
            self.visit_module(&module, traversal)?;
        }
        Ok(())
    }

    fn visit_module(&mut self, module: &ResolvedModule, traversal: &mut Traversal) -> BundleResult<()> {
        if !traversal.scanned.insert(module.identity.clone()) {
            return Ok(());
        }
        let source = scan_text(&module.source, module.path())?;
        self.visit_source(&source, module.path(), &module.context(), traversal)
    }
}

/// Text of an embedded module for import scanning.
///
/// Module bytes are embedded unchanged, so a module in another encoding
/// only has to be readable enough to find its imports. Import statements
/// are ASCII, and Python only accepts ASCII-compatible source encodings, so
/// a lossy decode is used when the module declares a non-UTF-8 encoding.
fn scan_text<'a>(source: &'a [u8], path: &Path) -> BundleResult<Cow<'a, str>> {
    if let Ok(text) = std::str::from_utf8(source) {
        return Ok(Cow::Borrowed(text));
    }
    match declared_encoding(source) {
        Some(encoding) if !is_utf8_alias(&encoding) => {
            debug!(
                "Scanning {} declared as {encoding} with a lossy decode",
                path.display()
            );
            Ok(String::from_utf8_lossy(source))
        }
        _ => Err(BundleError::NotUtf8 {
            path: path.to_path_buf(),
        }),
    }
}

/// Encoding named by a `coding[:=]` comment on one of the first two lines.
fn declared_encoding(source: &[u8]) -> Option<String> {
    source.split(|&b| b == b'\n').take(2).find_map(|line| {
        let line = String::from_utf8_lossy(line);
        let comment = line.trim_start_matches([' ', '\t', '\x0c']).strip_prefix('#')?;
        let (_, rest) = comment.split_once("coding")?;
        let rest = rest.strip_prefix([':', '='])?.trim_start_matches([' ', '\t']);
        let name: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect();
        (!name.is_empty()).then_some(name)
    })
}

fn is_utf8_alias(encoding: &str) -> bool {
    let lowered = encoding.cow_to_ascii_lowercase();
    let normalized = lowered.cow_replace('_', "-");
    normalized == "utf-8" || normalized == "utf8" || normalized.starts_with("utf-8-")
}

fn read_source(path: &Path) -> BundleResult<String> {
    let bytes = std::fs::read(path).map_err(|e| BundleError::io(path, e))?;
    String::from_utf8(bytes).map_err(|_| BundleError::NotUtf8 {
        path: path.to_path_buf(),
    })
}
