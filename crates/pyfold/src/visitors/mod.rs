//! AST visitor implementations for pyfold
//!
//! Import discovery walks the whole syntax tree so that imports nested in
//! functions, branches and exception handlers are found as well.

mod import_discovery;

pub use import_discovery::{ImportDiscoveryVisitor, scan_imports};
