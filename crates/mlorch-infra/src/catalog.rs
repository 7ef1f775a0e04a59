//! Workflow catalog loading.
//!
//! The catalog comes from the YAML file named by `catalog_path`, or from the
//! built-in default when no path is configured. Unlike the config file, a
//! configured catalog that cannot be read or validated is a startup error.

use std::path::{Path, PathBuf};

use mlorch_core::workflow::{CatalogError, default_catalog, parse_catalog};
use mlorch_types::config::OrchestratorConfig;
use mlorch_types::workflow::Catalog;

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },

    #[error("built-in catalog is invalid: {0}")]
    Builtin(#[source] CatalogError),
}

/// Read and validate a catalog file.
pub async fn read_catalog_file(path: &Path) -> Result<Catalog, CatalogLoadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_catalog(&content).map_err(|source| CatalogLoadError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the catalog selected by `config`.
pub async fn load_catalog(config: &OrchestratorConfig) -> Result<Catalog, CatalogLoadError> {
    let catalog = match &config.catalog_path {
        Some(path) => read_catalog_file(path).await?,
        None => default_catalog().map_err(CatalogLoadError::Builtin)?,
    };

    tracing::info!(
        source = config
            .catalog_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string()),
        workflows = catalog.len(),
        "workflow catalog loaded"
    );
    Ok(catalog)
}
