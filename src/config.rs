use std::env;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub worker: WorkerConfig,
    pub adaptive: AdaptiveEnvConfig,
    pub material_search: MaterialSearchConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_due_digest: bool,
}

#[derive(Debug, Clone)]
pub struct AdaptiveEnvConfig {
    pub target_retention: f64,
    pub default_mode: String,
}

#[derive(Clone)]
pub struct MaterialSearchConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for MaterialSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterialSearchConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/adaptive-review.sled"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_due_digest: env_or_bool("ENABLE_DUE_DIGEST_WORKER", true),
            },
            adaptive: AdaptiveEnvConfig {
                target_retention: env_or_parse("ADAPTIVE_TARGET_RETENTION", 0.9_f64),
                default_mode: env_or("ADAPTIVE_DEFAULT_MODE", "balanced"),
            },
            material_search: MaterialSearchConfig {
                enabled: env_or_bool("MATERIAL_SEARCH_ENABLED", false),
                mock: env_or_bool("MATERIAL_SEARCH_MOCK", true),
                api_url: env_or("MATERIAL_SEARCH_URL", ""),
                api_key: env_or("MATERIAL_SEARCH_API_KEY", ""),
                timeout_secs: env_or_parse("MATERIAL_SEARCH_TIMEOUT_SECS", 10_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "RUST_LOG",
            "SLED_PATH",
            "ADAPTIVE_TARGET_RETENTION",
            "ADAPTIVE_DEFAULT_MODE",
            "MATERIAL_SEARCH_ENABLED",
            "MATERIAL_SEARCH_MOCK",
            "MATERIAL_SEARCH_TIMEOUT_SECS",
            "MATERIAL_SEARCH_API_KEY",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.adaptive.target_retention, 0.9);
        assert_eq!(cfg.adaptive.default_mode, "balanced");
        assert!(!cfg.material_search.enabled);
        assert!(cfg.worker.is_leader);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("ADAPTIVE_TARGET_RETENTION", "0.85");
        env::set_var("MATERIAL_SEARCH_TIMEOUT_SECS", "42");

        let cfg = Config::from_env();
        assert_eq!(cfg.adaptive.target_retention, 0.85);
        assert_eq!(cfg.material_search.timeout_secs, 42);
        clear_keys(managed_keys());
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("ADAPTIVE_TARGET_RETENTION", "high");
        env::set_var("MATERIAL_SEARCH_TIMEOUT_SECS", "x");

        let cfg = Config::from_env();
        assert_eq!(cfg.adaptive.target_retention, 0.9);
        assert_eq!(cfg.material_search.timeout_secs, 10);
        clear_keys(managed_keys());
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("MATERIAL_SEARCH_API_KEY", "super-secret");
        let cfg = Config::from_env();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
        clear_keys(managed_keys());
    }
}
