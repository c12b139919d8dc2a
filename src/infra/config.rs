use crate::error::*;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_QUOTE_DEPTH: u8 = 1;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 300;

#[derive(Debug)]
pub enum ConfigError {
    InvalidFile,
}

impl IServiceError for ConfigError {
    fn error_type(&self) -> String {
        use ConfigError::*;

        match self {
            InvalidFile => "invalid_config",
        }
        .to_string()
    }

    fn status_code(&self) -> http::StatusCode {
        use ConfigError::*;

        match self {
            InvalidFile => http::StatusCode::BAD_REQUEST,
        }
    }
}

/// one layer of settings; also the schema of config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayer {
    pub auth_token: Option<String>,
    pub ct0: Option<String>,
    pub cookie_header: Option<String>,
    pub timeout_ms: Option<u64>,
    pub quote_depth: Option<u8>,
    pub page_delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth_token: String,
    pub ct0: String,
    pub cookie_header: Option<String>,
    /// None disables the request timeout entirely
    pub timeout_ms: Option<u64>,
    pub quote_depth: u8,
    pub page_delay_ms: u64,
}

impl AppConfig {
    /// precedence: command flags > environment > user config file > defaults
    pub fn load(flags: ConfigLayer) -> Result<AppConfig> {
        let file = read_file_config(&config_file_path())?;
        let env = env_config();
        Ok(AppConfig::merge(flags, env, file))
    }

    fn merge(flags: ConfigLayer, env: ConfigLayer, file: ConfigLayer) -> AppConfig {
        let timeout_ms = flags
            .timeout_ms
            .or(env.timeout_ms)
            .or(file.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        AppConfig {
            auth_token: flags
                .auth_token
                .or(env.auth_token)
                .or(file.auth_token)
                .unwrap_or_default(),
            ct0: flags.ct0.or(env.ct0).or(file.ct0).unwrap_or_default(),
            cookie_header: flags
                .cookie_header
                .or(env.cookie_header)
                .or(file.cookie_header),
            // 0 means "no timeout"
            timeout_ms: (timeout_ms > 0).then_some(timeout_ms),
            quote_depth: flags
                .quote_depth
                .or(env.quote_depth)
                .or(file.quote_depth)
                .unwrap_or(DEFAULT_QUOTE_DEPTH),
            page_delay_ms: flags
                .page_delay_ms
                .or(env.page_delay_ms)
                .or(file.page_delay_ms)
                .unwrap_or(DEFAULT_PAGE_DELAY_MS),
        }
    }
}

fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
}

fn env_config() -> ConfigLayer {
    ConfigLayer {
        auth_token: env_var(&["TORIKAGO_AUTH_TOKEN", "AUTH_TOKEN"]),
        ct0: env_var(&["TORIKAGO_CT0", "CT0"]),
        cookie_header: env_var(&["TORIKAGO_COOKIE_HEADER"]),
        timeout_ms: env_var(&["TORIKAGO_TIMEOUT_MS"]).and_then(|v| v.parse().ok()),
        quote_depth: env_var(&["TORIKAGO_QUOTE_DEPTH"]).and_then(|v| v.parse().ok()),
        page_delay_ms: env_var(&["TORIKAGO_PAGE_DELAY_MS"]).and_then(|v| v.parse().ok()),
    }
}

pub fn config_file_path() -> PathBuf {
    if let Some(path) = env_var(&["TORIKAGO_CONFIG"]) {
        return PathBuf::from(path);
    }
    match directories::ProjectDirs::from("com", "torikago", "torikago") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("torikago.toml"),
    }
}

fn read_file_config(path: &std::path::Path) -> Result<ConfigLayer> {
    if !path.exists() {
        return Ok(ConfigLayer::default());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| ServiceError::new(ConfigError::InvalidFile, e))?;
    toml::from_str(&text).map_err(|e| ServiceError::new(ConfigError::InvalidFile, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(token: &str, timeout: Option<u64>) -> ConfigLayer {
        ConfigLayer {
            auth_token: Some(token.to_string()),
            timeout_ms: timeout,
            ..Default::default()
        }
    }

    #[test]
    fn it_should_prefer_flags_over_env_over_file() {
        let merged = AppConfig::merge(
            layer("from-flags", None),
            layer("from-env", Some(5_000)),
            layer("from-file", Some(9_000)),
        );
        assert_eq!(merged.auth_token, "from-flags");
        assert_eq!(merged.timeout_ms, Some(5_000));
    }

    #[test]
    fn it_should_fall_back_to_defaults() {
        let merged = AppConfig::merge(
            ConfigLayer::default(),
            ConfigLayer::default(),
            ConfigLayer::default(),
        );
        assert_eq!(merged.auth_token, "");
        assert_eq!(merged.timeout_ms, Some(DEFAULT_TIMEOUT_MS));
        assert_eq!(merged.quote_depth, DEFAULT_QUOTE_DEPTH);
        assert_eq!(merged.page_delay_ms, DEFAULT_PAGE_DELAY_MS);
    }

    #[test]
    fn it_should_treat_a_zero_timeout_as_disabled() {
        let merged = AppConfig::merge(
            layer("t", Some(0)),
            ConfigLayer::default(),
            ConfigLayer::default(),
        );
        assert_eq!(merged.timeout_ms, None);
    }

    #[test]
    fn it_should_parse_a_toml_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "quote_depth = 2\npage_delay_ms = 50\n").unwrap();

        let parsed = read_file_config(&path).unwrap();
        assert_eq!(parsed.quote_depth, Some(2));
        assert_eq!(parsed.page_delay_ms, Some(50));

        std::fs::write(&path, "quote_depth = \"deep\"").unwrap();
        assert!(read_file_config(&path).is_err());
    }
}
