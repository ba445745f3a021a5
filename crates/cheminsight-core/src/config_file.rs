use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub search: Option<SearchConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub ncbi_api_key: Option<String>,
    pub entrez_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    pub max_synonyms_per_compound: Option<usize>,
    pub max_results_per_query: Option<usize>,
    pub date_from: Option<u16>,
    pub date_to: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub concurrency_limit: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub retry_backoff_ms: Option<Vec<u64>>,
}

/// Platform config directory path: `<config_dir>/cheminsight/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cheminsight").join("config.toml"))
}

/// Load config by cascading CWD `.cheminsight.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".cheminsight.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            ncbi_api_key: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.ncbi_api_key.clone())
                .or_else(|| base.api_keys.as_ref().and_then(|a| a.ncbi_api_key.clone())),
            entrez_email: overlay
                .api_keys
                .as_ref()
                .and_then(|a| a.entrez_email.clone())
                .or_else(|| base.api_keys.as_ref().and_then(|a| a.entrez_email.clone())),
        }),
        search: Some(SearchConfig {
            max_synonyms_per_compound: overlay
                .search
                .as_ref()
                .and_then(|s| s.max_synonyms_per_compound)
                .or_else(|| {
                    base.search
                        .as_ref()
                        .and_then(|s| s.max_synonyms_per_compound)
                }),
            max_results_per_query: overlay
                .search
                .as_ref()
                .and_then(|s| s.max_results_per_query)
                .or_else(|| base.search.as_ref().and_then(|s| s.max_results_per_query)),
            date_from: overlay
                .search
                .as_ref()
                .and_then(|s| s.date_from)
                .or_else(|| base.search.as_ref().and_then(|s| s.date_from)),
            date_to: overlay
                .search
                .as_ref()
                .and_then(|s| s.date_to)
                .or_else(|| base.search.as_ref().and_then(|s| s.date_to)),
        }),
        concurrency: Some(ConcurrencyConfig {
            concurrency_limit: overlay
                .concurrency
                .as_ref()
                .and_then(|c| c.concurrency_limit)
                .or_else(|| base.concurrency.as_ref().and_then(|c| c.concurrency_limit)),
            request_timeout_secs: overlay
                .concurrency
                .as_ref()
                .and_then(|c| c.request_timeout_secs)
                .or_else(|| {
                    base.concurrency
                        .as_ref()
                        .and_then(|c| c.request_timeout_secs)
                }),
            retry_backoff_ms: overlay
                .concurrency
                .as_ref()
                .and_then(|c| c.retry_backoff_ms.clone())
                .or_else(|| {
                    base.concurrency
                        .as_ref()
                        .and_then(|c| c.retry_backoff_ms.clone())
                }),
        }),
    }
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}

impl ConfigFile {
    /// Fold file values into a runtime [`crate::Config`]; unset fields keep
    /// the current value.
    pub fn apply_to(&self, config: &mut crate::Config) {
        if let Some(ref api_keys) = self.api_keys {
            if api_keys.ncbi_api_key.is_some() {
                config.ncbi_api_key = api_keys.ncbi_api_key.clone();
            }
            if api_keys.entrez_email.is_some() {
                config.entrez_email = api_keys.entrez_email.clone();
            }
        }
        if let Some(ref search) = self.search {
            if let Some(n) = search.max_synonyms_per_compound {
                config.max_synonyms = n;
            }
            if let Some(n) = search.max_results_per_query {
                config.max_results_per_query = n;
            }
        }
        if let Some(ref concurrency) = self.concurrency {
            if let Some(n) = concurrency.concurrency_limit {
                config.concurrency_limit = n;
            }
            if let Some(n) = concurrency.request_timeout_secs {
                config.request_timeout_secs = n;
            }
            if let Some(ref schedule) = concurrency.retry_backoff_ms {
                config.retry_backoff_ms = schedule.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_toml() {
        let config = ConfigFile {
            search: Some(SearchConfig {
                max_synonyms_per_compound: Some(5),
                date_from: Some(2015),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let search = parsed.search.unwrap();
        assert_eq!(search.max_synonyms_per_compound, Some(5));
        assert_eq!(search.date_from, Some(2015));
    }

    #[test]
    fn absent_fields_deserialize_as_none() {
        let toml_str = "[api_keys]\nncbi_api_key = \"abc123\"\n";
        let parsed: ConfigFile = toml_from(toml_str);
        let api_keys = parsed.api_keys.unwrap();
        assert_eq!(api_keys.ncbi_api_key.as_deref(), Some("abc123"));
        assert!(api_keys.entrez_email.is_none());
        assert!(parsed.search.is_none());
    }

    fn toml_from(s: &str) -> ConfigFile {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            concurrency: Some(ConcurrencyConfig {
                concurrency_limit: Some(2),
                request_timeout_secs: Some(30),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            concurrency: Some(ConcurrencyConfig {
                concurrency_limit: Some(8),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let concurrency = merged.concurrency.unwrap();
        assert_eq!(concurrency.concurrency_limit, Some(8));
        // Base value preserved when the overlay leaves it unset
        assert_eq!(concurrency.request_timeout_secs, Some(30));
    }

    #[test]
    fn apply_to_updates_only_set_fields() {
        let mut config = crate::Config::default();
        let file = ConfigFile {
            search: Some(SearchConfig {
                max_synonyms_per_compound: Some(7),
                ..Default::default()
            }),
            ..Default::default()
        };
        file.apply_to(&mut config);
        assert_eq!(config.max_synonyms, 7);
        // Untouched by the file
        assert_eq!(config.concurrency_limit, 4);
    }

    #[test]
    fn load_from_missing_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(load_from_path(&path).is_none());
    }
}
