//! Core domain types and logic.

pub mod asset;
pub mod bar;
pub mod config_validation;
pub mod error;
pub mod evaluator;
pub mod indicator;
pub mod indicator_set;
pub mod ledger;
pub mod market;
pub mod metrics;
pub mod node;
pub mod node_parser;
pub mod optimizer;
pub mod portfolio;
pub mod position;
pub mod preset;
pub mod simulation;
pub mod unified;
