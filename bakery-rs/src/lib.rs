//! `bakery`: an interpreter for INI-flavored build scripts.
//!
//! The engine ([`script`]) parses, batches and runs sections; side effects go
//! through the [`executor::Executor`] and [`executor::ResourceProbe`] seams.
//! [`fs_executor`] provides a filesystem-backed implementation of both.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fs_executor;
pub mod ini;
pub mod macros;
pub mod pattern;
pub mod script;
pub mod var;
