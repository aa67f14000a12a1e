//! Progress inference from repeated snapshots

pub mod accumulator;
pub mod projector;
