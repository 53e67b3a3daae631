//! Train/validation/test loader adapter for a training loop.

use std::path::Path;
use unclip_core::{DataModule, DataModuleConfig, LoaderConfig, Result};

use crate::dataloader::{create_loader, DataLoader};

/// Data module holding one loader configuration per split.
///
/// The configurations are fixed at construction. Every accessor builds a
/// fresh [`DataLoader`] (and dataset), so loaders never share iteration state.
#[derive(Debug, Clone)]
pub struct TextImageDataModule {
    train_config: LoaderConfig,
    val_config: LoaderConfig,
}

impl TextImageDataModule {
    /// Create a data module from explicit loader configurations.
    pub fn new(train_config: LoaderConfig, val_config: LoaderConfig) -> Self {
        Self {
            train_config,
            val_config,
        }
    }

    /// Create a data module from a parsed configuration.
    pub fn from_config(config: DataModuleConfig) -> Self {
        Self::new(config.train_config, config.val_config)
    }

    /// Load the configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_config(DataModuleConfig::from_yaml_file(path)?))
    }

    /// Training loader configuration.
    pub fn train_config(&self) -> &LoaderConfig {
        &self.train_config
    }

    /// Validation loader configuration, also used for the test split.
    pub fn val_config(&self) -> &LoaderConfig {
        &self.val_config
    }
}

impl DataModule for TextImageDataModule {
    type Loader = DataLoader;

    fn train_dataloader(&self) -> Result<DataLoader> {
        tracing::info!("Building train loader from {}", self.train_config.dataset.df_path.display());
        create_loader(&self.train_config)
    }

    fn val_dataloader(&self) -> Result<DataLoader> {
        tracing::info!("Building val loader from {}", self.val_config.dataset.df_path.display());
        create_loader(&self.val_config)
    }

    // There is no separate test split; it reuses the validation table.
    fn test_dataloader(&self) -> Result<DataLoader> {
        tracing::info!("Building test loader from {}", self.val_config.dataset.df_path.display());
        create_loader(&self.val_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use unclip_core::{DatasetConfig, UnclipError};

    fn fixture_tokenizer() -> String {
        format!("{}/tests/fixtures/tokenizer.json", env!("CARGO_MANIFEST_DIR"))
    }

    fn write_split(dir: &Path, name: &str, rows: usize) -> PathBuf {
        let mut csv = String::from("image_name,caption\n");
        for i in 0..rows {
            let image = dir.join(format!("{name}_{i}.png"));
            image::RgbImage::from_pixel(12, 9, image::Rgb([(i * 7 % 256) as u8, 80, 160]))
                .save(&image)
                .unwrap();
            csv.push_str(&format!("{},a red ball\n", image.display()));
        }
        let path = dir.join(format!("{name}.csv"));
        std::fs::write(&path, csv).unwrap();
        path
    }

    fn loader_config(df_path: PathBuf, batch_size: usize) -> LoaderConfig {
        let mut config = LoaderConfig::new(DatasetConfig {
            tokenizer_name: fixture_tokenizer(),
            clip_image_size: 4,
            image_size: 4,
            seq_len: 8,
            ..DatasetConfig::new(df_path)
        });
        config.batch_size = batch_size;
        config
    }

    #[test]
    fn test_split_loaders() {
        let dir = tempfile::tempdir().unwrap();
        let train = write_split(dir.path(), "train", 5);
        let val = write_split(dir.path(), "val", 2);
        let module = TextImageDataModule::new(loader_config(train, 2), loader_config(val, 2));

        let train_loader = module.train_dataloader().unwrap();
        assert_eq!(train_loader.len(), 5);
        assert_eq!(train_loader.num_batches(), 3);

        let val_loader = module.val_dataloader().unwrap();
        let test_loader = module.test_dataloader().unwrap();
        assert_eq!(val_loader.len(), 2);
        assert_eq!(test_loader.len(), 2);

        let batch = test_loader.into_iter().next().unwrap().unwrap();
        assert_eq!(batch.tokens.shape(), &[2, 8]);
    }

    #[test]
    fn test_loaders_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let val = write_split(dir.path(), "val", 3);
        let module = TextImageDataModule::new(loader_config(val.clone(), 3), loader_config(val, 3));

        let mut first = module.val_dataloader().unwrap();
        assert!(first.next().is_some());
        assert!(first.next().is_none());

        let mut second = module.val_dataloader().unwrap();
        assert!(second.next().is_some());
    }

    fn epoch_outcome(loader: DataLoader) -> Vec<(usize, bool, bool)> {
        loader
            .flat_map(|batch| {
                let batch = batch.unwrap();
                (0..batch.batch_size)
                    .map(|i| {
                        (
                            batch.record_indices[i],
                            batch.text_dropped[i],
                            batch.image_dropped[i],
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn shuffled_config(df_path: PathBuf, seed: Option<u64>) -> LoaderConfig {
        let mut config = loader_config(df_path, 8);
        config.shuffle = true;
        config.seed = seed;
        config.dataset.drop_text_prob = 0.5;
        config.dataset.drop_image_prob = 0.5;
        config
    }

    #[test]
    fn test_unseeded_loaders_differ() {
        let dir = tempfile::tempdir().unwrap();
        let train = write_split(dir.path(), "train", 32);
        let module =
            TextImageDataModule::new(shuffled_config(train.clone(), None), loader_config(train, 8));

        let first = epoch_outcome(module.train_dataloader().unwrap());
        let second = epoch_outcome(module.train_dataloader().unwrap());
        assert_eq!(first.len(), 32);
        assert_ne!(first, second);

        let order = |outcome: &[(usize, bool, bool)]| outcome.iter().map(|o| o.0).collect::<Vec<_>>();
        let text = |outcome: &[(usize, bool, bool)]| outcome.iter().map(|o| o.1).collect::<Vec<_>>();
        assert_ne!(order(&first), order(&second));
        assert_ne!(text(&first), text(&second));
    }

    #[test]
    fn test_seeded_loaders_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let train = write_split(dir.path(), "train", 16);
        let module = TextImageDataModule::new(
            shuffled_config(train.clone(), Some(5)),
            loader_config(train, 8),
        );

        let first = epoch_outcome(module.train_dataloader().unwrap());
        let second = epoch_outcome(module.train_dataloader().unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let train = write_split(dir.path(), "train", 4);
        let val = write_split(dir.path(), "val", 1);
        let yaml = format!(
            "train_config:\n  df_path: {}\n  tokenizer_name: {tok}\n  batch_size: 2\n  image_size: 4\n  clip_image_size: 4\n  seq_len: 8\nval_config:\n  df_path: {}\n  tokenizer_name: {tok}\n  image_size: 4\n  clip_image_size: 4\n  seq_len: 8\n",
            train.display(),
            val.display(),
            tok = fixture_tokenizer(),
        );
        let path = dir.path().join("data.yaml");
        std::fs::write(&path, yaml).unwrap();

        let module = TextImageDataModule::from_yaml_file(&path).unwrap();
        assert_eq!(module.train_config().batch_size, 2);
        assert_eq!(module.val_config().batch_size, 4);
        assert_eq!(module.train_dataloader().unwrap().num_batches(), 2);
    }

    #[test]
    fn test_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        let module = TextImageDataModule::new(
            loader_config(missing.clone(), 1),
            loader_config(missing, 1),
        );
        assert!(matches!(
            module.train_dataloader(),
            Err(UnclipError::Table(_))
        ));
    }
}
