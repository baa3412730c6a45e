#![forbid(unsafe_code)]

//! HTTP face of the mock snap daemon.

pub mod config;
pub mod fixture;
pub mod http;
pub mod shell;

pub use config::DaemonConfig;
pub use shell::{MockDaemon, ShellError};
