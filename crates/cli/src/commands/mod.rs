//! Command implementations.

mod fetch;
mod info;
mod validate;

pub use fetch::run_fetch;
pub use info::run_info;
pub use validate::run_validate;

use std::path::Path;

use contracts::LoaderConfig;

use crate::error::{CliError, Result};

/// Load and validate a configuration; built-in defaults when `path` is `None`
pub(crate) fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    let Some(path) = path else {
        return Ok(LoaderConfig::default());
    };

    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }

    config_loader::ConfigLoader::load_from_path(path)
        .map_err(|e| CliError::config_invalid(e.to_string()))
}
