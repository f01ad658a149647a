//! Preset catalog shipped with the binary, plus loading from external files.

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::StratlabError;
use crate::domain::preset::PresetCatalog;
use std::path::Path;

const DEFAULT_CATALOG: &str = include_str!("../../presets/default.ini");

pub fn builtin_catalog() -> Result<PresetCatalog, StratlabError> {
    let config = FileConfigAdapter::from_string(DEFAULT_CATALOG)?;
    PresetCatalog::from_config(&config)
}

pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<PresetCatalog, StratlabError> {
    let config = FileConfigAdapter::from_file(path)?;
    PresetCatalog::from_config(&config)
}
