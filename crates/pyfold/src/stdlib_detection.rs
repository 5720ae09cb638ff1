//! Standard library detection
//!
//! Standard library modules are present on every target machine, so they are
//! never embedded: bundling them would bloat the output and shadow the real
//! implementation.

use ruff_python_stdlib::sys;

/// Check if a dotted module name belongs to the Python standard library.
///
/// Only the first dotted component is consulted, so `xml.etree.ElementTree`
/// is stdlib because `xml` is, and any local module living under a stdlib
/// top-level name is treated the same way.
///
/// # Arguments
/// * `module_name` - The dotted module name to check
/// * `python_version` - Minor version of Python 3 (e.g., 10 for Python 3.10)
pub fn is_stdlib_module(module_name: &str, python_version: u8) -> bool {
    let top_level = module_name.split('.').next().unwrap_or(module_name);
    if top_level.is_empty() {
        return false;
    }

    // Not part of ruff's table, but always provided by the interpreter
    if top_level == "__future__" {
        return true;
    }

    sys::is_known_standard_library(python_version, top_level)
}
