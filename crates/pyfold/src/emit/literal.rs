//! Python literal encoding for embedded module paths and sources.
//!
//! Both encoders produce single-line, single-quoted literals in which every
//! quote, backslash and line break is escaped, so the literal can be spliced
//! into generated code whatever the embedded content contains.

use std::fmt::Write;

/// Encode arbitrary bytes as a Python `bytes` literal, e.g. `b'a\'b\n'`.
///
/// Evaluating the literal yields exactly `bytes`.
pub fn bytes_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + bytes.len() / 8 + 3);
    out.push_str("b'");
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push('\'');
    out
}

/// Encode text as a Python `str` literal, e.g. `'pkg/mod.py'`.
///
/// Printable non-ASCII characters are kept as-is; generated files are UTF-8.
pub fn str_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\U{:08x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
