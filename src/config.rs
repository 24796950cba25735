//! Configuration module for the corpus search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CS_` and use double underscores
//! to separate nested levels:
//! - `CS_INGEST__WORKER_THREADS=8` sets `ingest.worker_threads`
//! - `CS_INDEX__KIND=ivf` sets `index.kind`
//! - `CS_WEIGHTING__KIND=citations` sets `weighting.kind`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aggregate::{RelevanceShaping, WeightingKind};
use crate::records::ReplacePolicy;
use crate::vector::{IndexKind, IvfParams, VECTOR_DIMENSION_384, VectorDimension, VectorError};

/// Directory holding the settings file, searched upwards from the cwd.
pub const CONFIG_DIR: &str = ".corpus-search";

const ENV_PREFIX: &str = "CS_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding one JSON file per author
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub weighting: WeightingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// Embedding dimension shared by every vector in the store
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// "flat" (exact) or "ivf" (approximate)
    #[serde(default)]
    pub kind: IndexKind,

    /// IVF list count; unset picks ceil(sqrt(n))
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlist: Option<usize>,

    /// IVF lists scanned per query
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// Seed for IVF clustering
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Build the centroid author index
    #[serde(default = "default_true")]
    pub author_index: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IngestConfig {
    /// Number of worker threads for ingestion and enrichment
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Overwrite records with an existing identity instead of rejecting them
    #[serde(default = "default_false")]
    pub replace: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WeightingConfig {
    /// "uniform" or "citations"
    #[serde(default)]
    pub kind: WeightingKind,

    /// Similarities below this contribute nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f32>,

    /// Power applied to each similarity
    #[serde(default = "default_exponent")]
    pub exponent: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Model to use for query embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".corpus-search/records")
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_384
}
fn default_nprobe() -> usize {
    IvfParams::default().nprobe
}
fn default_seed() -> u64 {
    IvfParams::default().seed
}
fn default_worker_threads() -> usize {
    num_cpus::get()
}
fn default_exponent() -> i32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            debug: false,
            index: IndexConfig::default(),
            ingest: IngestConfig::default(),
            weighting: WeightingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            kind: IndexKind::default(),
            nlist: None,
            nprobe: default_nprobe(),
            seed: default_seed(),
            author_index: true,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            replace: false,
        }
    }
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            kind: WeightingKind::default(),
            min_similarity: None,
            exponent: default_exponent(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            show_download_progress: false,
        }
    }
}

impl IndexConfig {
    pub fn vector_dimension(&self) -> Result<VectorDimension, VectorError> {
        VectorDimension::new(self.dimension)
    }

    #[must_use]
    pub fn ivf_params(&self) -> IvfParams {
        IvfParams {
            nlist: self.nlist,
            nprobe: self.nprobe,
            seed: self.seed,
        }
    }
}

impl IngestConfig {
    #[must_use]
    pub fn policy(&self) -> ReplacePolicy {
        if self.replace {
            ReplacePolicy::Replace
        } else {
            ReplacePolicy::Reject
        }
    }
}

impl WeightingConfig {
    #[must_use]
    pub fn shaping(&self) -> RelevanceShaping {
        RelevanceShaping {
            min_similarity: self.min_similarity,
            exponent: self.exponent,
        }
    }
}

fn env_provider() -> Env {
    // Double underscore separates nested levels; single underscores stay
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for the config directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Create a default settings file with helpful comments under `root`
    pub fn init_config_file(
        root: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.as_ref().join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# corpus-search configuration

# Version of the configuration schema
version = 1

# Directory with one <author_id>.json file per author
data_dir = ".corpus-search/records"

# Global debug mode
debug = false

[index]
# Embedding dimension; every stored and query vector must match it
dimension = {VECTOR_DIMENSION_384}

# "flat" scans everything, "ivf" scans the nprobe closest k-means lists
kind = "flat"

# Number of IVF lists (defaults to ceil(sqrt(number of vectors)))
# nlist = 32

# IVF lists scanned per query; nprobe >= nlist is exact
nprobe = 4

# Seed for IVF clustering
seed = 24301

# Build the centroid author index used by author search
author_index = true

[ingest]
# Number of worker threads (defaults to CPU count)
# worker_threads = {}

# Overwrite records whose identity already exists
replace = false

[weighting]
# Article weight for weighted author search: "uniform" or "citations"
kind = "uniform"

# Ignore articles less similar than this to the query
# min_similarity = 0.3

# Raise each similarity to this power before summing
exponent = 1

[embedding]
# Model used to embed text queries
model = "AllMiniLML6V2"
show_download_progress = false
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}
