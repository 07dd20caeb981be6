#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod counters;
pub mod data;
pub mod fold;
pub mod hooks;
pub mod layout;
pub mod logging;
pub mod media;
pub mod navigate;
pub mod record;
pub mod render;
pub mod span;
pub mod surface;
pub mod timeline;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
