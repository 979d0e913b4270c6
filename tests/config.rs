use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use meta_retrieve::config::{Config, ConfigLoader, ConfigOverrides, EnvSettings};
use meta_retrieve::error::RetrieveError;

#[test]
fn cli_overrides_env_and_file() {
    let config: Config = serde_json::from_str(
        r#"{"host":"https://file.example.com","target_dir":"from-file","metadata_dirs":["pages"],"timeout_secs":5}"#,
    )
    .unwrap();
    let env = EnvSettings {
        host: Some("https://env.example.com".to_string()),
        access_token: Some("token".to_string()),
        jwt: None,
    };
    let overrides = ConfigOverrides {
        host: Some("https://cli.example.com".to_string()),
        api_version: None,
        target_dir: Some("from-cli".to_string()),
    };

    let resolved = ConfigLoader::resolve_config(config, env, overrides).unwrap();
    assert_eq!(resolved.host, "https://cli.example.com");
    assert_eq!(resolved.target_dir, Utf8PathBuf::from("from-cli"));
    assert_eq!(resolved.metadata_dirs, vec!["pages".to_string()]);
    assert_eq!(resolved.timeout_secs, 5);
    assert_eq!(resolved.access_token.as_deref(), Some("token"));
}

#[test]
fn env_host_beats_file_host() {
    let config = Config {
        host: Some("https://file.example.com".to_string()),
        ..Config::default()
    };
    let env = EnvSettings {
        host: Some("https://env.example.com".to_string()),
        ..EnvSettings::default()
    };
    let resolved =
        ConfigLoader::resolve_config(config, env, ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.host, "https://env.example.com");
}

#[test]
fn missing_host_is_reported() {
    let err = ConfigLoader::resolve_config(
        Config::default(),
        EnvSettings::default(),
        ConfigOverrides::default(),
    )
    .unwrap_err();
    assert_matches!(err, RetrieveError::MissingSetting("host"));
}

#[test]
fn unreadable_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(path.to_str(), ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, RetrieveError::ConfigRead(_));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("meta-retrieve.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str(), ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, RetrieveError::ConfigParse(_));
}
