//! Concrete adapter implementations for ports.

pub mod builtin_catalog;
pub mod csv_adapter;
pub mod english_labels;
pub mod file_config_adapter;
pub mod yield_adapter;
