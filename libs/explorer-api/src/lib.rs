//! Explorer API models
//!
//! JSON shapes returned by the SUDAO explorer backend.

pub mod models;
