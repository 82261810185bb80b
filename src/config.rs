//! Application configuration.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries
//! the batch settings plus the configured action and condition lists.
//! Every section defaults sensibly so a completely empty `{}` file is
//! valid.

use std::path::{Path, PathBuf};

use pb_core::{Error, FailurePolicy, OverwriteMode, Result};
use pb_pipeline::batcher::BatcherOpts;
use pb_pipeline::CommandList;
use serde::{Deserialize, Serialize};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch: BatchConfig,
    pub actions: CommandList,
    pub conditions: CommandList,
}

/// Run-wide batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Name pattern applied to every item before the configured actions.
    pub name_pattern: String,
    /// Output file extension, without the leading dot.
    pub file_extension: String,
    /// Output directory for exported images.
    pub output_directory: PathBuf,
    /// How to handle output paths that already exist.
    pub overwrite_mode: OverwriteMode,
    /// Recreate the input folder structure under the output directory.
    pub use_folder_structure: bool,
    /// What to do after an action fails for one item.
    pub failure_policy: FailurePolicy,
    /// Silently skip inputs that fail to load instead of failing the run.
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            name_pattern: "[name]".into(),
            file_extension: "png".into(),
            output_directory: PathBuf::from("output"),
            overwrite_mode: OverwriteMode::default(),
            use_folder_structure: false,
            failure_policy: FailurePolicy::default(),
            continue_on_error: false,
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, or fall back to defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.batch.file_extension.is_empty() {
            return Err(Error::Validation("file_extension must not be empty".into()));
        }
        if self.batch.file_extension.starts_with('.') {
            return Err(Error::Validation(
                "file_extension must not include the leading dot".into(),
            ));
        }
        Ok(())
    }

    /// Engine settings for a run with this configuration.
    pub fn batcher_opts(&self, preview: bool) -> BatcherOpts {
        let base = if preview {
            BatcherOpts::preview()
        } else {
            BatcherOpts::default()
        };
        BatcherOpts {
            name_pattern: self.batch.name_pattern.clone(),
            file_extension: self.batch.file_extension.clone(),
            output_directory: self.batch.output_directory.clone(),
            use_folder_structure: self.batch.use_folder_structure,
            failure_policy: self.batch.failure_policy,
            continue_on_load_error: self.batch.continue_on_error,
            ..base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_valid() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.batch.file_extension, "png");
        assert_eq!(config.batch.name_pattern, "[name]");
        assert!(config.actions.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn commands_parse_from_json() {
        let config = Config::from_json(
            r#"{
                "batch": {"name_pattern": "image[001]", "file_extension": "jpg"},
                "actions": [
                    {
                        "name": "remove_folder_structure",
                        "orig_name": "remove_folder_structure",
                        "display_name": "Remove folder structure",
                        "enabled": true
                    }
                ],
                "conditions": [
                    {
                        "name": "matching_file_extension",
                        "orig_name": "matching_file_extension",
                        "display_name": "Matching file extension",
                        "enabled": false
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.batch.name_pattern, "image[001]");
        assert_eq!(config.actions.len(), 1);
        assert_eq!(config.conditions.len(), 1);
        assert!(!config.conditions.as_slice()[0].enabled);
    }

    #[test]
    fn invalid_extension_is_rejected() {
        let mut config = Config::default();
        config.batch.file_extension = ".png".into();
        assert!(config.validate().is_err());
        config.batch.file_extension = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn batcher_opts_carry_batch_settings() {
        let mut config = Config::default();
        config.batch.name_pattern = "x[001]".into();
        config.batch.continue_on_error = true;

        let full = config.batcher_opts(false);
        assert!(!full.is_preview);
        assert!(full.process_export);
        assert_eq!(full.name_pattern, "x[001]");
        assert!(full.continue_on_load_error);

        let preview = config.batcher_opts(true);
        assert!(preview.is_preview);
        assert!(!preview.process_contents);
        assert!(!preview.process_export);
        assert_eq!(preview.name_pattern, "x[001]");
    }
}
