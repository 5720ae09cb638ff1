//! Inline (single script) output
//!
//! Layout of the generated script:
//!
//! 1. interpreter directive
//! 2. `from __future__` imports lifted out of the entry script
//! 3. the runtime prelude, which opens a temporary directory scope
//! 4. one `__pyfold_write_module(path, bytes)` call per bundled module
//! 5. the entry script, indented into the prelude's scope

use ruff_python_ast::{Stmt, StmtImportFrom};
use ruff_python_parser::{TokenKind, parse_module};
use ruff_text_size::{Ranged, TextRange};
use rustc_hash::FxHashSet;

use super::literal::{bytes_literal, str_literal};
use crate::types::Closure;

/// Runtime prelude embedded verbatim in every inline bundle
pub const PRELUDE: &str = include_str!("prelude.py");

/// Name of the prelude function that materializes one module
pub const WRITE_MODULE_FN: &str = "__pyfold_write_module";

const INDENT: &str = "    ";

#[derive(Debug, Clone, Default)]
pub struct InlineOptions {
    /// Copy the entry's own `#!` line instead of synthesizing one
    pub copy_shebang: bool,
    /// Interpreter used for the synthesized directive, e.g. `/usr/bin/env python`
    pub shebang: String,
}

/// Render the closure and entry source as one self-extracting script.
pub fn emit_inline(closure: &Closure, entry_source: &str, options: &InlineOptions) -> String {
    let (future_imports, entry_body) = split_future_imports(entry_source);

    let mut output = String::with_capacity(
        PRELUDE.len()
            + entry_source.len()
            + closure.modules().map(|m| m.source.len() + 64).sum::<usize>(),
    );

    output.push_str(&shebang_line(entry_source, options));
    for statement in &future_imports {
        output.push_str(statement);
        output.push('\n');
    }
    output.push_str(PRELUDE);

    for module in closure.modules() {
        output.push_str(INDENT);
        output.push_str(WRITE_MODULE_FN);
        output.push('(');
        output.push_str(&str_literal(&module.relative_path));
        output.push_str(", ");
        output.push_str(&bytes_literal(&module.source));
        output.push_str(")\n");
    }

    output.push_str(&indent_source(&entry_body));
    output
}

fn shebang_line(entry_source: &str, options: &InlineOptions) -> String {
    if options.copy_shebang {
        let first_line = entry_source.lines().next().unwrap_or_default();
        if first_line.starts_with("#!") {
            return format!("{first_line}\n");
        }
    }
    format!("#!{}\n", options.shebang)
}

/// Pull top-level `from __future__ import ...` statements out of the entry.
///
/// They must be the first statements of the generated file, so their text is
/// returned separately and each is replaced by `pass` in the body, which
/// keeps every other line where it was.
fn split_future_imports(source: &str) -> (Vec<String>, String) {
    let Ok(parsed) = parse_module(source) else {
        return (Vec::new(), source.to_owned());
    };

    let ranges: Vec<TextRange> = parsed
        .syntax()
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::ImportFrom(StmtImportFrom {
                module: Some(module),
                level: 0,
                range,
                ..
            }) if module.as_str() == "__future__" => Some(*range),
            _ => None,
        })
        .collect();

    if ranges.is_empty() {
        return (Vec::new(), source.to_owned());
    }

    let mut statements = Vec::with_capacity(ranges.len());
    let mut body = String::with_capacity(source.len());
    let mut last = 0;
    for range in ranges {
        let start = usize::from(range.start());
        let end = usize::from(range.end());
        statements.push(source[start..end].to_owned());
        body.push_str(&source[last..start]);
        body.push_str("pass");
        last = end;
    }
    body.push_str(&source[last..]);
    (statements, body)
}

/// Indent every line by one level, except lines that start inside a
/// multi-line string literal, whose content must not change.
pub fn indent_source(source: &str) -> String {
    let protected = string_continuation_lines(source);
    let mut output = String::with_capacity(source.len() + source.len() / 8);
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        if !protected.contains(&offset) {
            output.push_str(INDENT);
        }
        output.push_str(line);
        offset += line.len();
    }
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output
}

/// Byte offsets of line starts that lie inside a token spanning several
/// lines (triple-quoted strings and f-string literal parts).
fn string_continuation_lines(source: &str) -> FxHashSet<usize> {
    let mut protected = FxHashSet::default();
    let Ok(parsed) = parse_module(source) else {
        // Unparsable entries are rejected before emission; indent naively
        return protected;
    };

    for token in parsed.tokens().iter() {
        if matches!(token.kind(), TokenKind::Newline | TokenKind::NonLogicalNewline) {
            continue;
        }
        let start = usize::from(token.start());
        let text = &source[token.range()];
        if !text.contains('\n') {
            continue;
        }
        for (index, _) in text.match_indices('\n') {
            protected.insert(start + index + 1);
        }
    }
    protected
}
