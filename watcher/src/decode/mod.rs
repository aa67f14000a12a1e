//! Backend record decoding

pub mod identifiers;
pub mod snapshot;
pub mod variant;
