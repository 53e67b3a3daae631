//! Configuration types for unclip.

use crate::{Result, SecretString, UnclipError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Length reported by a dataset in infinite mode.
pub const INFINITE_DATASET_LEN: usize = 99_999_999;

/// Default tokenizer: the multilingual CLIP text tower tokenizer.
pub const DEFAULT_TOKENIZER: &str = "M-CLIP/XLM-Roberta-Large-Vit-L-14";

/// What to do when a sample's image cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// Propagate the error; the batch containing the sample fails.
    #[default]
    Fail,
    /// Log a warning and draw another row uniformly at random.
    Resample,
}

/// Text-image dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path to the record table (CSV, TSV or Parquet) with `image_name` and `caption` columns.
    pub df_path: PathBuf,

    /// Tokenizer identifier: local `tokenizer.json`, a directory containing one,
    /// or a HuggingFace Hub repo id.
    #[serde(default = "default_tokenizer_name")]
    pub tokenizer_name: String,

    /// Hub revision used when `tokenizer_name` is a repo id.
    #[serde(default)]
    pub tokenizer_revision: Option<String>,

    /// HuggingFace token for private tokenizer repos.
    #[serde(default, skip_serializing)]
    pub hf_token: Option<SecretString>,

    /// Edge size of the square conditioning (CLIP) image.
    #[serde(default = "default_clip_image_size")]
    pub clip_image_size: u32,

    /// Token sequence length (padded/truncated).
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,

    /// Probability of replacing the caption with the empty string.
    #[serde(default = "default_drop_prob")]
    pub drop_text_prob: f64,

    /// Probability of replacing the conditioning image with zeros.
    #[serde(default = "default_drop_prob")]
    pub drop_image_prob: f64,

    /// Edge size of the square target image.
    #[serde(default = "default_image_size")]
    pub image_size: u32,

    /// Resample rows uniformly instead of indexing the table.
    #[serde(default)]
    pub infinity: bool,

    /// Behaviour on undecodable images.
    #[serde(default)]
    pub decode_error_policy: DecodeErrorPolicy,

    /// Attempts made under [`DecodeErrorPolicy::Resample`] before giving up.
    #[serde(default = "default_max_decode_retries")]
    pub max_decode_retries: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            df_path: PathBuf::new(),
            tokenizer_name: default_tokenizer_name(),
            tokenizer_revision: None,
            hf_token: None,
            clip_image_size: default_clip_image_size(),
            seq_len: default_seq_len(),
            drop_text_prob: default_drop_prob(),
            drop_image_prob: default_drop_prob(),
            image_size: default_image_size(),
            infinity: false,
            decode_error_policy: DecodeErrorPolicy::default(),
            max_decode_retries: default_max_decode_retries(),
        }
    }
}

impl DatasetConfig {
    /// Create a configuration for the given table with all other options defaulted.
    pub fn new(df_path: impl Into<PathBuf>) -> Self {
        Self {
            df_path: df_path.into(),
            ..Default::default()
        }
    }

    /// Validate the table path and all value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.df_path.as_os_str().is_empty() {
            return Err(UnclipError::Config("df_path must be set".into()));
        }
        self.validate_ranges()
    }

    /// Validate probabilities, sizes and retry budget, ignoring `df_path`.
    pub fn validate_ranges(&self) -> Result<()> {
        for (name, p) in [
            ("drop_text_prob", self.drop_text_prob),
            ("drop_image_prob", self.drop_image_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(UnclipError::Config(format!(
                    "{name} must be in [0, 1], got {p}"
                )));
            }
        }
        if self.clip_image_size == 0 || self.image_size == 0 {
            return Err(UnclipError::Config(format!(
                "image sizes must be positive (clip_image_size={}, image_size={})",
                self.clip_image_size, self.image_size
            )));
        }
        if self.seq_len == 0 {
            return Err(UnclipError::Config("seq_len must be positive".into()));
        }
        if self.decode_error_policy == DecodeErrorPolicy::Resample && self.max_decode_retries == 0
        {
            return Err(UnclipError::Config(
                "max_decode_retries must be positive with the resample policy".into(),
            ));
        }
        Ok(())
    }
}

/// Loader factory configuration: batching options plus the dataset options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Samples per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker threads used to fetch samples (0 = fetch on the calling thread).
    #[serde(default)]
    pub num_workers: usize,

    /// Shuffle indices each epoch.
    #[serde(default)]
    pub shuffle: bool,

    /// Seed for shuffling and per-sample dropout draws.
    ///
    /// Unset draws a fresh seed for every loader built from this config, so
    /// each loader shuffles and drops out differently. Set it to reproduce a run.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Drop the last incomplete batch.
    #[serde(default)]
    pub drop_last: bool,

    /// Dataset options, flattened into the same mapping.
    #[serde(flatten)]
    pub dataset: DatasetConfig,

    /// Keys matching neither the loader nor the dataset options.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

impl LoaderConfig {
    /// Loader configuration with default batching options.
    pub fn new(dataset: DatasetConfig) -> Self {
        Self {
            batch_size: default_batch_size(),
            num_workers: 0,
            shuffle: false,
            seed: None,
            drop_last: false,
            dataset,
            unknown: BTreeMap::new(),
        }
    }

    /// Validate batching options and the nested dataset options.
    pub fn validate(&self) -> Result<()> {
        if !self.unknown.is_empty() {
            let keys: Vec<&str> = self.unknown.keys().map(String::as_str).collect();
            return Err(UnclipError::Config(format!(
                "unknown loader option(s): {}",
                keys.join(", ")
            )));
        }
        if self.batch_size == 0 {
            return Err(UnclipError::Config("batch_size must be positive".into()));
        }
        self.dataset.validate()
    }
}

/// Train/validation loader configurations for a data module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataModuleConfig {
    /// Training loader configuration.
    pub train_config: LoaderConfig,
    /// Validation (and test) loader configuration.
    pub val_config: LoaderConfig,
}

impl DataModuleConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both loader configurations.
    pub fn validate(&self) -> Result<()> {
        self.train_config.validate()?;
        self.val_config.validate()
    }
}

// Default value functions
fn default_tokenizer_name() -> String {
    DEFAULT_TOKENIZER.to_string()
}
fn default_clip_image_size() -> u32 {
    224
}
fn default_seq_len() -> usize {
    77
}
fn default_drop_prob() -> f64 {
    0.5
}
fn default_image_size() -> u32 {
    512
}
fn default_max_decode_retries() -> usize {
    10
}
fn default_batch_size() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_defaults() {
        let config = DatasetConfig::new("data.csv");
        assert_eq!(config.tokenizer_name, DEFAULT_TOKENIZER);
        assert_eq!(config.clip_image_size, 224);
        assert_eq!(config.seq_len, 77);
        assert_eq!(config.drop_text_prob, 0.5);
        assert_eq!(config.drop_image_prob, 0.5);
        assert_eq!(config.image_size, 512);
        assert!(!config.infinity);
        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_data_module_yaml() {
        let yaml = r#"
train_config:
  df_path: /data/train.csv
  batch_size: 8
  num_workers: 4
  shuffle: true
  image_size: 256
  infinity: true
  hf_token: hf_secret
val_config:
  df_path: /data/val.parquet
  batch_size: 2
  seed: 7
  drop_text_prob: 0.0
  drop_image_prob: 0.0
  decode_error_policy: resample
"#;
        let config = DataModuleConfig::from_yaml(yaml).unwrap();

        let train = &config.train_config;
        assert_eq!(train.batch_size, 8);
        assert_eq!(train.num_workers, 4);
        assert!(train.shuffle);
        assert_eq!(train.seed, None);
        assert_eq!(train.dataset.df_path, PathBuf::from("/data/train.csv"));
        assert_eq!(train.dataset.image_size, 256);
        assert_eq!(train.dataset.clip_image_size, 224);
        assert!(train.dataset.infinity);
        assert_eq!(
            train.dataset.hf_token.as_ref().map(|t| t.expose_secret()),
            Some("hf_secret")
        );

        let val = &config.val_config;
        assert_eq!(val.seed, Some(7));
        assert!(!val.shuffle);
        assert_eq!(val.dataset.drop_text_prob, 0.0);
        assert_eq!(val.dataset.decode_error_policy, DecodeErrorPolicy::Resample);
    }

    #[test]
    fn test_token_not_serialized() {
        let mut config = DatasetConfig::new("data.csv");
        config.hf_token = Some(SecretString::new("hf_secret"));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hf_secret"));
        assert!(!format!("{config:?}").contains("hf_secret"));
    }

    #[test]
    fn test_missing_df_path_rejected() {
        let yaml = r#"
train_config:
  batch_size: 8
val_config:
  df_path: val.csv
"#;
        assert!(DataModuleConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = DatasetConfig::new("data.csv");
        config.drop_text_prob = 1.5;
        assert!(matches!(config.validate(), Err(UnclipError::Config(_))));

        let mut config = DatasetConfig::new("data.csv");
        config.image_size = 0;
        assert!(config.validate().is_err());

        let mut config = DatasetConfig::new("data.csv");
        config.drop_image_prob = f64::NAN;
        assert!(config.validate().is_err());

        let mut loader = LoaderConfig::new(DatasetConfig::new("data.csv"));
        loader.batch_size = 0;
        assert!(loader.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.yaml");
        std::fs::write(
            &path,
            "train_config:\n  df_path: a.csv\nval_config:\n  df_path: b.csv\n",
        )
        .unwrap();
        let config = DataModuleConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.train_config.batch_size, 4);
        assert_eq!(config.val_config.dataset.df_path, PathBuf::from("b.csv"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let yaml = r#"
train_config:
  df_path: train.csv
  batchsize: 64
  drop_txt_prob: 0.0
val_config:
  df_path: val.csv
"#;
        let err = DataModuleConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, UnclipError::Config(_)));
        let message = err.to_string();
        assert!(message.contains("batchsize"), "unexpected error: {message}");
        assert!(message.contains("drop_txt_prob"), "unexpected error: {message}");

        let yaml = "train_config:\n  df_path: a.csv\nval_config:\n  df_path: b.csv\ntest_config:\n  df_path: c.csv\n";
        assert!(DataModuleConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_ranges_ignores_path() {
        let config = DatasetConfig::default();
        assert!(config.validate().is_err());
        assert!(config.validate_ranges().is_ok());

        let config = DatasetConfig {
            seq_len: 0,
            ..DatasetConfig::default()
        };
        assert!(config.validate_ranges().is_err());
    }
}
