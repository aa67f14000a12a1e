//! DAO deployment watcher library
//!
//! Polls the explorer backend for a DAO's deployment record and turns the
//! sequence of snapshots into step descriptors for a progress view.

pub mod app;
pub mod decode;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod progress;
pub mod storage;
pub mod utils;
pub mod watch;
