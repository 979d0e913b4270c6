use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::RetrieveError;

pub const CONFIG_FILE_NAME: &str = "meta-retrieve.json";
pub const ENV_HOST: &str = "META_RETRIEVE_HOST";
pub const ENV_ACCESS_TOKEN: &str = "META_RETRIEVE_ACCESS_TOKEN";
pub const ENV_JWT: &str = "META_RETRIEVE_JWT";

/// Top-level directories a retrieve owns. They are wiped before every run.
pub const METADATA_DIRS: &[&str] = &[
    "apps",
    "authproviders",
    "componentpacks",
    "dataservices",
    "datasources",
    "designsystems",
    "files",
    "pages",
    "permissionsets",
    "site",
    "themes",
    "variables",
];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub target_dir: Option<String>,
    #[serde(default)]
    pub metadata_dirs: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Where downloaded archives are spooled before extraction.
    #[serde(default)]
    pub spool_dir: Option<String>,
}

/// Values supplied on the command line; they win over everything else.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub api_version: Option<String>,
    pub target_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub host: String,
    pub api_version: String,
    pub target_dir: Utf8PathBuf,
    pub metadata_dirs: Vec<String>,
    pub timeout_secs: u64,
    pub spool_dir: Option<Utf8PathBuf>,
    pub access_token: Option<String>,
    pub jwt: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or the first config file found in the working directory
    /// or the user config directory, then applies environment and CLI values.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, RetrieveError> {
        let config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => match Self::discover() {
                Some(found) => Self::read(found)?,
                None => Config::default(),
            },
        };
        let env = EnvSettings::from_env();
        Self::resolve_config(config, env, overrides)
    }

    pub fn resolve_config(
        config: Config,
        env: EnvSettings,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, RetrieveError> {
        let host = overrides
            .host
            .or(env.host)
            .or(config.host)
            .map(|host| host.trim().trim_end_matches('/').to_string())
            .filter(|host| !host.is_empty())
            .ok_or(RetrieveError::MissingSetting("host"))?;

        let target_dir = overrides
            .target_dir
            .or(config.target_dir)
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| ".".to_string());

        Ok(ResolvedConfig {
            host,
            api_version: overrides
                .api_version
                .or(config.api_version)
                .unwrap_or_else(|| "2".to_string()),
            target_dir: Utf8PathBuf::from(target_dir),
            metadata_dirs: config.metadata_dirs.unwrap_or_else(default_metadata_dirs),
            timeout_secs: config.timeout_secs.unwrap_or(60),
            spool_dir: config
                .spool_dir
                .filter(|dir| !dir.trim().is_empty())
                .map(Utf8PathBuf::from),
            access_token: env.access_token,
            jwt: env.jwt,
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "meta-retrieve")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn read(path: PathBuf) -> Result<Config, RetrieveError> {
        let content = fs::read_to_string(&path).map_err(|_| RetrieveError::ConfigRead(path))?;
        serde_json::from_str(&content).map_err(|err| RetrieveError::ConfigParse(err.to_string()))
    }
}

/// Settings read from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvSettings {
    pub host: Option<String>,
    pub access_token: Option<String>,
    pub jwt: Option<String>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self {
            host: non_empty_var(ENV_HOST),
            access_token: non_empty_var(ENV_ACCESS_TOKEN),
            jwt: non_empty_var(ENV_JWT),
        }
    }
}

pub fn default_metadata_dirs() -> Vec<String> {
    METADATA_DIRS.iter().map(|dir| dir.to_string()).collect()
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config {
            host: Some("https://site.example.com/".to_string()),
            ..Config::default()
        };
        let resolved =
            ConfigLoader::resolve_config(config, EnvSettings::default(), ConfigOverrides::default())
                .unwrap();
        assert_eq!(resolved.host, "https://site.example.com");
        assert_eq!(resolved.api_version, "2");
        assert_eq!(resolved.target_dir, Utf8PathBuf::from("."));
        assert_eq!(resolved.metadata_dirs, default_metadata_dirs());
        assert_eq!(resolved.timeout_secs, 60);
        assert_eq!(resolved.spool_dir, None);
    }
}
