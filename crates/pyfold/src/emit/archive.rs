//! Archive (zip application) output
//!
//! The archive mirrors the module tree: each bundled module is stored at its
//! relative path, every directory level gets an `__init__.py` (empty unless
//! a real package file was bundled for it) and the entry script is stored as
//! `__main__.py`. The interpreter puts the archive itself on `sys.path`, so
//! no extraction step is needed at run time.

use std::{
    io::{Cursor, Write},
    path::Path,
};

use anyhow::{Context, Result};
use log::debug;
use zip::{CompressionMethod, DateTime, ZipWriter, write::SimpleFileOptions};

use crate::types::{Closure, FxIndexMap, PACKAGE_INIT};

/// File name the interpreter runs when executing a zip application
pub const ARCHIVE_MAIN: &str = "__main__.py";

/// Files of an archive bundle, keyed by slash-separated path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveLayout {
    files: FxIndexMap<String, Vec<u8>>,
}

impl ArchiveLayout {
    /// Lay out the closure and the entry script.
    pub fn new(closure: &Closure, entry_source: &str) -> Self {
        let mut files = FxIndexMap::default();

        for module in closure.modules() {
            files.insert(module.relative_path.clone(), module.source.clone());
        }

        // Directories implied by a module path but lacking a real package file
        let mut markers = Vec::new();
        for path in files.keys() {
            let mut dir = String::new();
            let components: Vec<&str> = path.split('/').collect();
            for component in &components[..components.len() - 1] {
                if !dir.is_empty() {
                    dir.push('/');
                }
                dir.push_str(component);
                let marker = format!("{dir}/{PACKAGE_INIT}");
                if !files.contains_key(&marker) && !markers.contains(&marker) {
                    markers.push(marker);
                }
            }
        }
        for marker in markers {
            debug!("Synthesizing package marker {marker}");
            files.insert(marker, Vec::new());
        }

        files.insert(ARCHIVE_MAIN.to_owned(), entry_source.as_bytes().to_vec());
        Self { files }
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write the layout as a plain directory tree under `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        for (path, contents) in &self.files {
            let target = path.split('/').fold(dir.to_path_buf(), |p, c| p.join(c));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&target, contents)
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }
        Ok(())
    }

    /// Serialize as an executable zip application: `#!<shebang>` followed
    /// by a deflated zip archive with fixed timestamps.
    pub fn to_zipapp(&self, shebang: &str) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        buffer.write_all(format!("#!{shebang}\n").as_bytes())?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut writer = ZipWriter::new(buffer);
        for (path, contents) in &self.files {
            writer
                .start_file(path.as_str(), options)
                .with_context(|| format!("Failed to add {path} to archive"))?;
            writer.write_all(contents)?;
        }
        let buffer = writer.finish().context("Failed to finish archive")?;
        Ok(buffer.into_inner())
    }
}
