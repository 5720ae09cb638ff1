//! Shared type definitions for the pyfold crate
//!
//! These types flow through every stage of a bundling run: the import
//! scanner produces [`ImportDeclaration`]s, the resolver turns them into
//! [`ResolvedModule`]s and the closure builder collects those into a
//! [`Closure`] that the emitters consume.

use std::{
    hash::BuildHasherDefault,
    path::{Path, PathBuf},
};

use cow_utils::CowUtils;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;
use sha2::{Digest, Sha256};

/// Type alias for FxHasher-based IndexMap
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Type alias for FxHasher-based IndexSet
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// File extension of Python source modules
pub const SOURCE_EXTENSION: &str = "py";

/// File name that marks a directory as a regular package
pub const PACKAGE_INIT: &str = "__init__.py";

/// One `import` or `from ... import` statement found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    /// Dotted name after the leading dots (may be empty for `from . import x`)
    pub target_name: String,
    /// Names listed after `import` in a from-import, in source order
    pub items: Vec<String>,
    /// Number of leading dots, 0 for absolute imports
    pub relative_level: u32,
}

impl ImportDeclaration {
    /// An absolute `import name` with no items
    pub fn absolute(name: impl Into<String>) -> Self {
        Self {
            target_name: name.into(),
            items: Vec::new(),
            relative_level: 0,
        }
    }

    pub fn is_relative(&self) -> bool {
        self.relative_level > 0
    }
}

impl std::fmt::Display for ImportDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dots = ".".repeat(self.relative_level as usize);
        if self.items.is_empty() && self.relative_level == 0 {
            write!(f, "import {}", self.target_name)
        } else {
            write!(
                f,
                "from {dots}{} import {}",
                self.target_name,
                self.items.join(", ")
            )
        }
    }
}

/// The dotted name and package-ness of the module whose imports are being
/// resolved. Relative imports climb from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContext {
    pub name: String,
    pub is_package: bool,
}

impl ModuleContext {
    /// Context of the entry script, which always runs as `__main__`
    pub fn entry() -> Self {
        Self {
            name: ENTRY_MODULE_NAME.to_owned(),
            is_package: false,
        }
    }
}

/// Identity under which the entry script runs; never a closure key
pub const ENTRY_MODULE_NAME: &str = "__main__";

/// A module found on a search root, with its source loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    /// Canonical dotted name, the closure's dedup key
    pub identity: String,
    /// Where the source was read from
    pub absolute_path: PathBuf,
    /// Whether the module is a package `__init__.py`
    pub is_package: bool,
    /// Slash-joined module path, e.g. `pkg/sub.py` or `pkg/__init__.py`
    pub relative_path: String,
    /// Exact source bytes
    pub source: Vec<u8>,
    /// SHA-256 of `source`, hex-encoded
    pub content_hash: String,
}

impl ResolvedModule {
    pub fn new(identity: String, absolute_path: PathBuf, is_package: bool, source: Vec<u8>) -> Self {
        let relative_path = relative_module_path(&identity, is_package);
        let content_hash = content_hash(&source);
        Self {
            identity,
            absolute_path,
            is_package,
            relative_path,
            source,
            content_hash,
        }
    }

    pub fn context(&self) -> ModuleContext {
        ModuleContext {
            name: self.identity.clone(),
            is_package: self.is_package,
        }
    }

    pub fn path(&self) -> &Path {
        &self.absolute_path
    }
}

/// Maps a dotted module name to the slash-joined path it is written to.
///
/// `a.b` becomes `a/b.py`, or `a/b/__init__.py` for a package.
pub fn relative_module_path(identity: &str, is_package: bool) -> String {
    let base = identity.cow_replace('.', "/");
    if is_package {
        format!("{base}/{PACKAGE_INIT}")
    } else {
        format!("{base}.{SOURCE_EXTENSION}")
    }
}

fn content_hash(source: &[u8]) -> String {
    let digest = Sha256::digest(source);
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Every local module reachable from the entry, keyed by identity in
/// discovery order. Populated monotonically; entries are never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    modules: FxIndexMap<String, ResolvedModule>,
}

impl Closure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.modules.contains_key(identity)
    }

    /// Insert a module unless its identity is already present.
    /// Returns `true` when the module was newly added.
    pub fn insert(&mut self, module: ResolvedModule) -> bool {
        if self.modules.contains_key(&module.identity) {
            return false;
        }
        self.modules.insert(module.identity.clone(), module);
        true
    }

    pub fn get(&self, identity: &str) -> Option<&ResolvedModule> {
        self.modules.get(identity)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Identities in discovery order
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Modules in discovery order
    pub fn modules(&self) -> impl Iterator<Item = &ResolvedModule> {
        self.modules.values()
    }
}
