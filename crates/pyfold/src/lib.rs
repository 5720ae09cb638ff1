//! Fold a multi-module Python program into a single runnable artifact.

pub mod closure;
pub mod config;
pub mod dirs;
pub mod emit;
pub mod error;
pub mod interpreter;
pub mod orchestrator;
pub mod resolver;
pub mod stdlib_detection;
pub mod types;
pub mod visitors;

pub use closure::{ClosureBuilder, EntryClosure};
pub use config::Config;
pub use emit::{Bundle, OutputMode};
pub use error::{BundleError, BundleResult};
pub use orchestrator::{BundleOrchestrator, write_bundle};
