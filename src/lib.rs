pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod merge;
pub mod output;
pub mod platform;
pub mod retrieve;
