//! Layered loader: defaults, global file, workspace files, environment.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::EaselConfig;
use config::{Config, ConfigError, File};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root` from every layer.
    pub fn load(workspace_root: &Path) -> Result<EaselConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load a single explicit file over the defaults (plus environment overrides).
    pub fn load_from_file(path: &Path) -> Result<EaselConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        environment::add_to_builder(builder)
            .build()?
            .try_deserialize()
    }

    /// Defaults only, ignoring files and environment.
    pub fn defaults() -> Result<EaselConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .build()
            .and_then(Config::try_deserialize)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
