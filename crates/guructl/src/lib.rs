//! Guructl library - exposes modules for testing

pub mod errors;
pub mod logging;
pub mod output;
pub mod repl;
