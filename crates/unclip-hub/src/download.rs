//! Tokenizer asset resolution and download.

use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use unclip_core::{Result, SecretString, UnclipError};

/// File name of a serialized `tokenizers` tokenizer.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Build API with optional token authentication.
fn build_api(token: Option<&SecretString>) -> Result<Api> {
    let mut builder = ApiBuilder::new();

    if let Some(secret) = token {
        builder = builder.with_token(Some(secret.expose_secret().to_string()));
    }

    builder
        .build()
        .map_err(|e| UnclipError::Hub(e.to_string()))
}

/// Download a specific file from a model repository.
///
/// Files already present in the local Hub cache are not fetched again.
pub fn download_file(
    model_id: &str,
    filename: &str,
    revision: Option<&str>,
    token: Option<&SecretString>,
) -> Result<PathBuf> {
    let api = build_api(token)?;

    let repo = match revision {
        Some(rev) => api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            rev.to_string(),
        )),
        None => api.model(model_id.to_string()),
    };

    repo.get(filename)
        .map_err(|e| UnclipError::Hub(format!("{model_id}/{filename}: {e}")))
}

/// Resolve a tokenizer identifier to a local `tokenizer.json`.
///
/// * an existing file is returned as is
/// * an existing directory must contain `tokenizer.json`
/// * anything else is treated as a Hub repo id
pub fn resolve_tokenizer(
    name: &str,
    revision: Option<&str>,
    token: Option<&SecretString>,
) -> Result<PathBuf> {
    if let Some(path) = resolve_local(Path::new(name))? {
        tracing::debug!("Using local tokenizer {}", path.display());
        return Ok(path);
    }

    tracing::info!("Fetching {} for {} from the Hub...", TOKENIZER_FILE, name);
    download_file(name, TOKENIZER_FILE, revision, token)
}

fn resolve_local(path: &Path) -> Result<Option<PathBuf>> {
    if path.is_file() {
        return Ok(Some(path.to_path_buf()));
    }
    if path.is_dir() {
        let candidate = path.join(TOKENIZER_FILE);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
        return Err(UnclipError::Tokenizer(format!(
            "Directory {} does not contain {}",
            path.display(),
            TOKENIZER_FILE
        )));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.json");
        std::fs::write(&file, "{}").unwrap();

        let resolved = resolve_tokenizer(file.to_str().unwrap(), None, None).unwrap();
        assert_eq!(resolved, file);
    }

    #[test]
    fn test_resolve_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), "{}").unwrap();

        let resolved = resolve_tokenizer(dir.path().to_str().unwrap(), None, None).unwrap();
        assert_eq!(resolved, dir.path().join(TOKENIZER_FILE));
    }

    #[test]
    fn test_directory_without_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_tokenizer(dir.path().to_str().unwrap(), None, None).unwrap_err();
        assert!(err.to_string().contains(TOKENIZER_FILE));
    }
}
