//! Import discovery visitor that finds all imports in a Python module,
//! including those nested within functions, classes, and other scopes.

use std::path::Path;

use ruff_python_ast::{
    Stmt, StmtImport, StmtImportFrom,
    visitor::{Visitor, walk_stmt},
};
use ruff_python_parser::{ParseError, parse_module};

use crate::{
    error::{BundleError, BundleResult},
    types::ImportDeclaration,
};

/// Parse `source` and return every import declaration in source order.
///
/// Each call parses from scratch, so the result depends only on the text.
/// `path` is used for error reporting.
pub fn scan_imports(source: &str, path: &Path) -> BundleResult<Vec<ImportDeclaration>> {
    let parsed = parse_module(source).map_err(|err| scan_error(source, path, &err))?;

    let mut visitor = ImportDiscoveryVisitor::new();
    visitor.visit_body(&parsed.syntax().body);
    let imports = visitor.into_imports();

    log::trace!("Found {} imports in {}", imports.len(), path.display());
    Ok(imports)
}

fn scan_error(source: &str, path: &Path, err: &ParseError) -> BundleError {
    let offset = usize::from(err.location.start()).min(source.len());
    let line = source.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1;
    BundleError::Scan {
        path: path.to_path_buf(),
        line,
        message: err.error.to_string(),
    }
}

/// Visitor that collects import declarations from every scope
#[derive(Debug, Default)]
pub struct ImportDiscoveryVisitor {
    imports: Vec<ImportDeclaration>,
}

impl ImportDiscoveryVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_imports(self) -> Vec<ImportDeclaration> {
        self.imports
    }

    /// `import a.b, c` yields one declaration per alias
    fn record_import(&mut self, stmt: &StmtImport) {
        for alias in &stmt.names {
            self.imports
                .push(ImportDeclaration::absolute(alias.name.as_str()));
        }
    }

    fn record_import_from(&mut self, stmt: &StmtImportFrom) {
        let target_name = stmt
            .module
            .as_ref()
            .map(|m| m.as_str().to_owned())
            .unwrap_or_default();
        let items = stmt
            .names
            .iter()
            .map(|alias| alias.name.as_str().to_owned())
            .collect();

        self.imports.push(ImportDeclaration {
            target_name,
            items,
            relative_level: stmt.level,
        });
    }
}

impl<'a> Visitor<'a> for ImportDiscoveryVisitor {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(import_stmt) => self.record_import(import_stmt),
            Stmt::ImportFrom(import_from) => self.record_import_from(import_from),
            _ => walk_stmt(self, stmt),
        }
    }
}
