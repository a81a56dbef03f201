#![forbid(unsafe_code)]

pub mod app;
pub mod archive;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod history;
pub mod kv_store;
pub mod logging;
pub mod navigator;
pub mod pattern;
pub mod status;
