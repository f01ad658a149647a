//! Port traits: the seams between the domain and its collaborators.

pub mod config_port;
pub mod data_port;
pub mod label_port;
pub mod yield_port;
