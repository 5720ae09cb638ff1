//! Errors that abort a bundling run.
//!
//! An ordinary import that resolves to nothing is not represented here: it
//! names a function, class or installed package rather than a local module,
//! and the closure builder simply moves on.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Source could not be parsed as Python.
    #[error("failed to parse {}:{line}: {message}", .path.display())]
    Scan {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Source is not valid UTF-8 and cannot be parsed.
    #[error("failed to parse {}: source is not valid UTF-8", .path.display())]
    NotUtf8 { path: PathBuf },

    /// A module requested with `--add-python-module` exists on no search root.
    #[error(
        "could not find forced module `{name}` (import {name}) in any search root: {roots}"
    )]
    UnresolvedForcedModule { name: String, roots: String },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BundleResult<T> = std::result::Result<T, BundleError>;
