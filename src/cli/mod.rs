//! CLI module for the cutout-composer binary
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;
mod progress;

pub use main_impl::{
    main, Cli, CliBackend, CliModel, Command, ComposeArgs, DownloadArgs, DownloadTarget, ModelDirArgs,
    RemoveArgs,
};
