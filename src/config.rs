//! Extraction profiles and server settings.
//!
//! A profile carries the watermark vocabulary of one exam board's letterhead
//! plus segmentation tuning. Profiles are loaded from the `configs/` directory;
//! the built-in `default` profile is used when that directory is absent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::study::DEFAULT_DAYS_UNTIL_EXAM;

pub const DEFAULT_PROFILE: &str = "default";

/// Tuning for one family of exam papers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub watermarks: WatermarkConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE.to_string(),
            description: "AKU-EB style papers with institutional footers".to_string(),
            watermarks: WatermarkConfig::default(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

/// Boilerplate vocabulary stripped before and after segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Case-insensitive substrings; a line containing any of them is dropped.
    pub keywords: Vec<String>,
    /// Keywords that only drop a line when their pattern matches it too.
    pub guarded_keywords: Vec<GuardedKeyword>,
    /// Regexes removed from question text wherever they occur.
    pub fragment_patterns: Vec<String>,
    /// Lines must be longer than this to be considered an all-caps banner.
    pub banner_min_chars: usize,
    /// Uppercase share of alphanumerics above which a banner line is dropped.
    pub banner_upper_ratio: f64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            keywords: vec![
                "aku-eb".to_string(),
                "examinations".to_string(),
                "teaching & learning".to_string(),
                "for teaching".to_string(),
            ],
            guarded_keywords: vec![GuardedKeyword {
                keyword: "page".to_string(),
                pattern: r"(?i)page\s*\d+\s*(?:of|/)\s*\d+".to_string(),
            }],
            fragment_patterns: vec![
                r"(?i)\d{4}only\b".to_string(),
                r"(?i)\bAKU-EB\b".to_string(),
                r"(?i)\bExaminations\s+\d{4}\b".to_string(),
            ],
            banner_min_chars: 20,
            banner_upper_ratio: 0.8,
        }
    }
}

/// A keyword whose presence alone is not enough to drop a line.
///
/// `page` is the usual case: "Turn the page" is content, "Page 3 of 10" is a footer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardedKeyword {
    pub keyword: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Highest number accepted as a question marker (lowest is always 1).
    pub max_question_number: u32,
    /// Questions whose text is not longer than this are discarded as noise.
    pub min_question_chars: usize,
    /// Paragraphs must be longer than this to become fallback questions.
    pub min_paragraph_chars: usize,
    /// How far ahead of the open question a stray numbered line may jump.
    pub numbering_window: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_question_number: 50,
            min_question_chars: 15,
            min_paragraph_chars: 20,
            numbering_window: 2,
        }
    }
}

/// In-memory store for all loaded profiles.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    configs: Arc<RwLock<HashMap<String, ExtractionConfig>>>,
    default_config: String,
}

impl ConfigStore {
    /// Load all `*.json` profiles from the specified directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        if !dir.exists() {
            return Err(ConfigError::MissingDirectory {
                path: dir.display().to_string(),
            });
        }

        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Read {
            path: dir.display().to_string(),
            source,
        })?;

        let mut configs = HashMap::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ConfigError::Read {
                    path: dir.display().to_string(),
                    source,
                })?
                .path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let config = read_profile(&path)?;
                info!("Loaded profile: {} from {:?}", config.name, path);
                configs.insert(config.name.clone(), config);
            }
        }

        if configs.is_empty() {
            return Err(ConfigError::Empty {
                path: dir.display().to_string(),
            });
        }

        Ok(Self::from_map(configs))
    }

    /// Load from `dir`, or fall back to the built-in profile when the
    /// directory is missing or holds no profiles. Broken profile files are
    /// still reported.
    pub fn load_or_builtin(dir: &Path) -> Result<Self, ConfigError> {
        match Self::load_from_dir(dir) {
            Ok(store) => Ok(store),
            Err(ConfigError::MissingDirectory { path }) | Err(ConfigError::Empty { path }) => {
                warn!("No profiles in {}, using built-in default", path);
                Ok(Self::builtin())
            }
            Err(e) => Err(e),
        }
    }

    /// Store holding only the built-in default profile.
    pub fn builtin() -> Self {
        Self::from_configs(vec![ExtractionConfig::default()])
    }

    pub fn from_configs(configs: Vec<ExtractionConfig>) -> Self {
        let map = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self::from_map(map)
    }

    fn from_map(mut configs: HashMap<String, ExtractionConfig>) -> Self {
        let default_config = Self::pick_default(&configs);
        if !configs.contains_key(&default_config) {
            configs.insert(default_config.clone(), ExtractionConfig::default());
        }
        Self {
            configs: Arc::new(RwLock::new(configs)),
            default_config,
        }
    }

    /// Get a profile by name (returns clone).
    pub fn get(&self, name: &str) -> Option<ExtractionConfig> {
        self.read().get(name).cloned()
    }

    /// Get the default profile (returns clone).
    pub fn default_config(&self) -> ExtractionConfig {
        self.get(&self.default_config).unwrap_or_default()
    }

    /// Resolve an optional profile name, falling back to the default.
    pub fn resolve(&self, name: Option<&str>) -> Option<ExtractionConfig> {
        match name {
            Some(name) => self.get(name),
            None => Some(self.default_config()),
        }
    }

    /// List all available profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ExtractionConfig>> {
        self.configs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pick_default(configs: &HashMap<String, ExtractionConfig>) -> String {
        if configs.contains_key(DEFAULT_PROFILE) {
            return DEFAULT_PROFILE.to_string();
        }
        let mut names: Vec<&String> = configs.keys().collect();
        names.sort();
        names
            .first()
            .map(|name| name.to_string())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }
}

fn read_profile(path: &Path) -> Result<ExtractionConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub config_dir: PathBuf,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: Option<String>,
    pub docling_url: Option<String>,
    /// Shown on the dashboard.
    pub days_until_exam: u32,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            config_dir: non_empty("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("configs")),
            openrouter_api_key: non_empty("OPENROUTER_API_KEY"),
            openrouter_model: non_empty("OPENROUTER_MODEL"),
            docling_url: non_empty("DOCLING_URL"),
            days_until_exam: non_empty("DAYS_UNTIL_EXAM")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_DAYS_UNTIL_EXAM),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_profile_uses_defaults() {
        let json = r#"{
            "name": "cambridge",
            "watermarks": { "keywords": ["cambridge assessment"] }
        }"#;
        let config: ExtractionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.name, "cambridge");
        assert_eq!(config.watermarks.keywords, vec!["cambridge assessment"]);
        assert_eq!(config.watermarks.banner_min_chars, 20);
        assert_eq!(config.segmentation.max_question_number, 50);
        assert_eq!(config.segmentation.min_question_chars, 15);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("board.json")).unwrap();
        file.write_all(br#"{"name": "board", "description": "test board"}"#)
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = ConfigStore::load_from_dir(dir.path()).unwrap();

        assert_eq!(store.list(), vec!["board".to_string()]);
        assert_eq!(store.default_config().name, "board");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_missing_dir_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        assert!(matches!(
            ConfigStore::load_from_dir(&missing),
            Err(ConfigError::MissingDirectory { .. })
        ));

        let store = ConfigStore::load_or_builtin(&missing).unwrap();
        assert_eq!(store.list(), vec![DEFAULT_PROFILE.to_string()]);
        assert_eq!(store.resolve(None).unwrap().name, DEFAULT_PROFILE);
    }

    #[test]
    fn test_shipped_profiles_load() {
        use crate::extraction::watermark::WatermarkFilter;

        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");
        let store = ConfigStore::load_from_dir(&dir).unwrap();
        assert_eq!(store.list(), vec!["cambridge".to_string(), DEFAULT_PROFILE.to_string()]);
        assert_eq!(store.default_config().name, DEFAULT_PROFILE);

        let cambridge = store.get("cambridge").unwrap();
        assert_eq!(cambridge.segmentation.max_question_number, 40);
        let filter = WatermarkFilter::compile(&cambridge.watermarks);
        assert!(filter.is_watermark("[Turn over]"));
        assert!(filter.is_watermark("© UCLES 2024 0625/21/M/J/24"));
        assert!(!filter.is_watermark("Turn over the page and continue."));
    }

    #[test]
    fn test_broken_profile_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let result = ConfigStore::load_or_builtin(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
