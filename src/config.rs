use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::{
    semantic::{Category, CategoryModel, Cutoff},
    storage::{self, StorageManager},
};

const CONFIG_FILE: &str = "config.yaml";

/// Default embedding model (multilingual, handles the Portuguese vocabulary)
const DEFAULT_MODEL: &str = "multilingual-e5-small";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Embedding provider settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Model name, e.g. "multilingual-e5-small" or "bge-small-en-v1.5"
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

/// Thresholds for the flat result list
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    pub primary_threshold: f64,
    pub primary_top_k: usize,
    /// Used when nothing passes the primary threshold
    pub fallback_threshold: f64,
    pub fallback_top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            primary_threshold: 0.50,
            primary_top_k: 12,
            fallback_threshold: 0.30,
            fallback_top_k: 10,
        }
    }
}

impl RankingConfig {
    pub fn primary(&self) -> Cutoff {
        Cutoff::new(self.primary_threshold, self.primary_top_k)
    }

    pub fn fallback(&self) -> Cutoff {
        Cutoff::new(self.fallback_threshold, self.fallback_top_k)
    }
}

/// Neighbor graph limits
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    pub first_level_size: usize,
    /// How many first-level nodes get their own neighbors
    pub expanded_parents: usize,
    pub second_level_threshold: f64,
    pub second_level_top_k: usize,
    pub second_level_max_candidates: usize,
    pub second_level_batch_size: usize,
    /// Multiplier applied to second-level edge strength
    pub second_level_strength_factor: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            first_level_size: 8,
            expanded_parents: 2,
            second_level_threshold: 0.55,
            second_level_top_k: 3,
            second_level_max_candidates: 60,
            second_level_batch_size: 15,
            second_level_strength_factor: 0.8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Words embedded concurrently per batch
    pub batch_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { batch_size: 25 }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// gpu if available, otherwise the parallel cpu backend
    #[default]
    Auto,
    Parallel,
    Gpu,
    Sequential,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComputeConfig {
    pub backend: BackendKind,
    /// Work-group width, power of two
    pub workgroup_size: usize,
    /// Worker threads for the parallel backend, 0 = one per core
    pub threads: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            workgroup_size: 64,
            threads: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub listen: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Replaces the built-in category table when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

/// `SEMEX_BASE_PATH`, or `~/.local/share/semex`.
pub fn base_path() -> String {
    std::env::var("SEMEX_BASE_PATH").unwrap_or_else(|_| {
        let home = my_home()
            .expect("could not determine home directory")
            .expect("home directory path is empty");
        format!("{}/.local/share/semex", home.to_string_lossy())
    })
}

fn check_threshold(name: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        panic!("{name} must be between 0.0 and 1.0, got {value}");
    }
}

fn check_positive(name: &str, value: usize) {
    if value == 0 {
        panic!("{name} must be at least 1");
    }
}

impl Config {
    pub fn validate(&self) {
        if self.embedding.download_timeout_secs == 0 {
            panic!("embedding.download_timeout_secs must be greater than 0");
        }

        let ranking = &self.ranking;
        check_threshold("ranking.primary_threshold", ranking.primary_threshold);
        check_threshold("ranking.fallback_threshold", ranking.fallback_threshold);
        check_positive("ranking.primary_top_k", ranking.primary_top_k);
        check_positive("ranking.fallback_top_k", ranking.fallback_top_k);

        let graph = &self.graph;
        check_threshold("graph.second_level_threshold", graph.second_level_threshold);
        check_threshold(
            "graph.second_level_strength_factor",
            graph.second_level_strength_factor,
        );
        check_positive("graph.first_level_size", graph.first_level_size);
        check_positive("graph.second_level_top_k", graph.second_level_top_k);
        check_positive(
            "graph.second_level_max_candidates",
            graph.second_level_max_candidates,
        );
        check_positive("graph.second_level_batch_size", graph.second_level_batch_size);

        check_positive("resolver.batch_size", self.resolver.batch_size);

        let width = self.compute.workgroup_size;
        if !width.is_power_of_two() || width > 1024 {
            panic!("compute.workgroup_size must be a power of two between 1 and 1024, got {width}");
        }

        if let Err(err) = self.category_model() {
            panic!("invalid categories: {err}");
        }
    }

    /// The configured category table, or the built-in one.
    pub fn category_model(&self) -> Result<CategoryModel, crate::semantic::CategoryError> {
        if self.categories.is_empty() {
            Ok(CategoryModel::builtin())
        } else {
            CategoryModel::new(self.categories.clone())
        }
    }

    pub fn load() -> Self {
        Self::load_with(&base_path())
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("failed to create base directory");

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store
                .write(
                    CONFIG_FILE,
                    serde_yml::to_string(&Self::default())
                        .expect("default config serializes")
                        .as_bytes(),
                )
                .expect("failed to write default config");
        }

        let config_bytes = store.read(CONFIG_FILE).expect("failed to read config");
        let config_str = String::from_utf8(config_bytes).expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        match serde_yml::to_string(&config) {
            Ok(current) if current != config_str => {
                if let Err(err) = config.save() {
                    log::warn!("failed to upgrade config file: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => log::warn!("failed to serialize config: {err}"),
        }

        config
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        (dir, path)
    }

    #[test]
    fn test_defaults_written_on_first_load() {
        let (_dir, path) = temp_base();
        let config = Config::load_with(&path);

        assert_eq!(config.embedding.model, "multilingual-e5-small");
        assert_eq!(config.ranking, RankingConfig::default());
        assert_eq!(config.graph.second_level_max_candidates, 60);
        assert_eq!(config.resolver.batch_size, 25);
        assert_eq!(config.compute.workgroup_size, 64);
        assert_eq!(config.daemon.listen, "127.0.0.1:8080");
        assert!(std::path::Path::new(&path).join("config.yaml").exists());
    }

    #[test]
    fn test_partial_file_upgraded() {
        let (_dir, path) = temp_base();
        std::fs::write(
            format!("{path}/config.yaml"),
            "ranking:\n  primary_threshold: 0.6\ncompute:\n  backend: sequential\n",
        )
        .unwrap();

        let config = Config::load_with(&path);
        assert_eq!(config.ranking.primary_threshold, 0.6);
        assert_eq!(config.ranking.primary_top_k, 12);
        assert_eq!(config.compute.backend, BackendKind::Sequential);

        let saved = std::fs::read_to_string(format!("{path}/config.yaml")).unwrap();
        assert!(saved.contains("second_level_batch_size"));
    }

    #[test]
    fn test_custom_categories() {
        let (_dir, path) = temp_base();
        std::fs::write(
            format!("{path}/config.yaml"),
            "categories:\n  - name: cores\n    words: [vermelho, azul]\n",
        )
        .unwrap();

        let config = Config::load_with(&path);
        let model = config.category_model().unwrap();
        assert_eq!(model.category_of("azul").name, "cores");
        assert_eq!(model.category_of("rei").name, "general");
    }

    #[test]
    #[should_panic(expected = "ranking.primary_threshold")]
    fn test_threshold_out_of_range() {
        let mut config = Config::default();
        config.ranking.primary_threshold = 1.5;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "compute.workgroup_size")]
    fn test_workgroup_not_power_of_two() {
        let mut config = Config::default();
        config.compute.workgroup_size = 48;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "resolver.batch_size")]
    fn test_zero_batch_size() {
        let mut config = Config::default();
        config.resolver.batch_size = 0;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn test_reserved_category_name() {
        let mut config = Config::default();
        config.categories = vec![Category {
            name: "general".into(),
            weight: 1.0,
            color: "#000000".into(),
            words: vec!["x".into()],
            related: vec![],
        }];
        config.validate();
    }
}
