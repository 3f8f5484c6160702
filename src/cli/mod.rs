//! Command-line interface components
//!
//! This module contains CLI-specific code for the image cache binary,
//! including argument parsing and command handlers.

pub mod args;
pub mod commands;

pub use args::{
    CacheAction, CacheArgs, Cli, Commands, ConfigAction, ConfigArgs, EntryArgs, FetchArgs,
    GlobalArgs,
};
pub use commands::{handle_cache, handle_config, handle_fetch};
