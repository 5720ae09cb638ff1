//! Bundle emitters
//!
//! Both output shapes consume the same closure: the inline emitter produces
//! one self-extracting script, the archive emitter a zip application.

mod archive;
mod inline;
mod literal;

use anyhow::Result;
use serde::Deserialize;

pub use archive::{ARCHIVE_MAIN, ArchiveLayout};
pub use inline::{InlineOptions, PRELUDE, WRITE_MODULE_FN, emit_inline, indent_source};
pub use literal::{bytes_literal, str_literal};

use crate::{closure::EntryClosure, types::Closure};

/// Shape of the produced artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// A single script with the modules embedded as literals
    #[default]
    Inline,
    /// An executable zip application
    Archive,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

/// A finished bundle, held in memory until the caller writes it out
#[derive(Debug, Clone)]
pub struct Bundle {
    pub mode: OutputMode,
    pub contents: Vec<u8>,
    /// `(identity, sha256)` of every embedded module, in emission order
    pub modules: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub mode: OutputMode,
    pub copy_shebang: bool,
    pub shebang: String,
}

/// Serialize the closure and entry into the requested artifact shape.
pub fn emit(entry: &EntryClosure, options: &EmitOptions) -> Result<Bundle> {
    let contents = match options.mode {
        OutputMode::Inline => emit_inline(
            &entry.closure,
            &entry.entry_source,
            &InlineOptions {
                copy_shebang: options.copy_shebang,
                shebang: options.shebang.clone(),
            },
        )
        .into_bytes(),
        OutputMode::Archive => {
            ArchiveLayout::new(&entry.closure, &entry.entry_source).to_zipapp(&options.shebang)?
        }
    };

    Ok(Bundle {
        mode: options.mode,
        contents,
        modules: summarize(&entry.closure),
    })
}

fn summarize(closure: &Closure) -> Vec<(String, String)> {
    closure
        .modules()
        .map(|m| (m.identity.clone(), m.content_hash.clone()))
        .collect()
}
