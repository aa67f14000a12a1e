pub mod client;
pub mod explorer;
