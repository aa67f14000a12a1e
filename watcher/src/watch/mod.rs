//! Watch sessions: per-DAO polling controllers and their registry

pub mod controller;
pub mod fsm;
pub mod registry;
