//! Configuration: `.config/<app>.yaml` loading with documented defaults (§6, §4.12).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

fn default_tab_width() -> u32 { 0 }
fn default_max_token_len() -> usize { 128 }
fn default_max_block_lines() -> usize { 200 }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub tab_width: u32,
    pub max_token_len: usize,
    pub max_block_lines: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tab_width: default_tab_width(),
            max_token_len: default_max_token_len(),
            max_block_lines: default_max_block_lines(),
        }
    }
}

fn default_cooc_window() -> usize { 5 }
fn default_salience_percent() -> f64 { 0.30 }
fn default_salience_min() -> usize { 8 }
fn default_salience_max() -> usize { 64 }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub cooc_window_size: usize,
    pub salience_percent: f64,
    pub salience_min: usize,
    pub salience_max: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            cooc_window_size: default_cooc_window(),
            salience_percent: default_salience_percent(),
            salience_min: default_salience_min(),
            salience_max: default_salience_max(),
        }
    }
}

fn default_top_k() -> usize { 20 }
fn default_max_candidates() -> usize { 1000 }
fn default_expansion_top_k() -> usize { 8 }
fn default_min_similarity() -> f64 { 0.25 }
fn default_max_df_percent() -> f64 { 22.0 }
fn default_cluster_mode() -> String { "centroid".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    pub max_candidates: usize,
    pub expansion_top_k: usize,
    pub min_similarity: f64,
    pub max_df_percent: f64,
    pub cluster_mode: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_candidates: default_max_candidates(),
            expansion_top_k: default_expansion_top_k(),
            min_similarity: default_min_similarity(),
            max_df_percent: default_max_df_percent(),
            cluster_mode: default_cluster_mode(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub train: TrainConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Load `<root>/.config/<app>.yaml` if present; missing file is not an
    /// error (falls back to defaults). Malformed YAML is `Error::Config`.
    pub fn load(root: &Path, app_name: &str) -> Result<Self, Error> {
        let path = root.join(".config").join(format!("{app_name}.yaml"));
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.query.top_k == 0 {
            return Err(Error::Config("query.top_k must be positive".into()));
        }
        if self.train.cooc_window_size == 0 {
            return Err(Error::Config("train.cooc_window_size must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.query.max_df_percent) {
            return Err(Error::Config("query.max_df_percent must be in [0, 100]".into()));
        }
        if self.query.cluster_mode != "centroid" && self.query.cluster_mode != "concentration" {
            return Err(Error::Config("query.cluster_mode must be \"centroid\" or \"concentration\"".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::load(tmp.path(), "scopesearch").unwrap();
        assert_eq!(cfg.query.top_k, 20);
        assert_eq!(cfg.index.tab_width, 0);
    }

    #[test]
    fn partial_config_merges_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".config")).unwrap();
        std::fs::write(tmp.path().join(".config/scopesearch.yaml"), "query:\n  top_k: 5\n").unwrap();
        let cfg = Config::load(tmp.path(), "scopesearch").unwrap();
        assert_eq!(cfg.query.top_k, 5);
        assert_eq!(cfg.query.expansion_top_k, 8);
    }

    #[test]
    fn invalid_top_k_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".config")).unwrap();
        std::fs::write(tmp.path().join(".config/scopesearch.yaml"), "query:\n  top_k: 0\n").unwrap();
        assert!(matches!(Config::load(tmp.path(), "scopesearch"), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_cluster_mode_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".config")).unwrap();
        std::fs::write(tmp.path().join(".config/scopesearch.yaml"), "query:\n  cluster_mode: bogus\n").unwrap();
        assert!(matches!(Config::load(tmp.path(), "scopesearch"), Err(Error::Config(_))));
    }
}
