//! Headless host for Versefield: the built-in catalog, scripted input, and
//! a driver loop that feeds frames to a renderer.

pub mod catalog;
pub mod host;
pub mod script;

pub use catalog::{CatalogEntry, builtin, entries};
pub use host::{Host, RunSummary};
pub use script::{ScriptAction, ScriptError, ScriptedInput, parse_script};
