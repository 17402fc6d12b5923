// tests/config_env.rs
//
// Config loading from ANALYZER_CONFIG_PATH plus env overrides.
// These tests mutate process env, so they run serially.

use std::{env, fs};

use comment_analyzer::analyze::AdapterSet;
use comment_analyzer::config::analyzer::{
    ENV_ANALYZER_API_KEY, ENV_ANALYZER_CONFIG_PATH, ENV_BATCH_SIZE, ENV_CHUNK_SIZE, ENV_DELAY_MS,
    ENV_MAX_WORKERS, ENV_MODE,
};
use comment_analyzer::config::{AnalysisMode, AnalyzerConfig, ProviderKind};
use comment_analyzer::model::Task;

fn clear_env() {
    for key in [
        ENV_ANALYZER_CONFIG_PATH,
        ENV_ANALYZER_API_KEY,
        ENV_BATCH_SIZE,
        ENV_CHUNK_SIZE,
        ENV_MAX_WORKERS,
        ENV_DELAY_MS,
        ENV_MODE,
    ] {
        env::remove_var(key);
    }
}

#[serial_test::serial]
#[test]
fn missing_file_yields_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    env::set_var(ENV_ANALYZER_CONFIG_PATH, dir.path().join("nope.toml"));

    let cfg = AnalyzerConfig::from_env().expect("defaults");
    assert_eq!(cfg, AnalyzerConfig::default());
    clear_env();
}

#[serial_test::serial]
#[test]
fn file_then_env_overrides() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analyzer.toml");
    fs::write(
        &path,
        r#"
batch_size = 64
chunk_size = 16
inter_batch_delay_ms = 5

[adapters.sentiment]
provider = "http"
endpoint = "http://127.0.0.1:9/classify"
api_key = "ENV"

[adapters.quality]
provider = "disabled"
"#,
    )
    .unwrap();

    env::set_var(ENV_ANALYZER_CONFIG_PATH, &path);
    env::set_var(ENV_ANALYZER_API_KEY, "sk-test");
    env::set_var(ENV_CHUNK_SIZE, "8");
    env::set_var(ENV_MAX_WORKERS, "0");
    env::set_var(ENV_DELAY_MS, "not a number");

    let cfg = AnalyzerConfig::from_env().expect("load");
    assert_eq!(cfg.batch_size, 64);
    assert_eq!(cfg.chunk_size, 8, "env beats file");
    assert_eq!(cfg.max_workers, 1, "zero is raised to one");
    assert_eq!(cfg.inter_batch_delay_ms, 5, "garbage env is ignored");

    let sentiment = cfg.adapters.sentiment.clone().expect("sentiment adapter");
    assert_eq!(sentiment.provider, ProviderKind::Http);
    assert_eq!(sentiment.api_key.as_deref(), Some("sk-test"));

    let set = AdapterSet::from_config(&cfg.adapters).expect("adapters build");
    assert_eq!(set.configured(), vec![Task::Sentiment]);
    clear_env();
}

#[serial_test::serial]
#[test]
fn env_api_key_must_be_present() {
    clear_env();
    let err = AnalyzerConfig::from_toml_str(
        r#"
[adapters.spam]
provider = "http"
endpoint = "http://127.0.0.1:9/spam"
api_key = "ENV"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains(ENV_ANALYZER_API_KEY));
}

#[serial_test::serial]
#[test]
fn invalid_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "batch_size = \"lots\"").unwrap();
    env::set_var(ENV_ANALYZER_CONFIG_PATH, &path);
    assert!(AnalyzerConfig::from_env().is_err());
    clear_env();
}

#[serial_test::serial]
#[test]
fn mode_env_override() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analyzer.toml");
    fs::write(&path, "mode = \"fast\"\n").unwrap();
    env::set_var(ENV_ANALYZER_CONFIG_PATH, &path);

    assert_eq!(AnalyzerConfig::from_env().expect("file").mode, AnalysisMode::Fast);

    env::set_var(ENV_MODE, "Accurate");
    let cfg = AnalyzerConfig::from_env().expect("env");
    assert_eq!(cfg.mode, AnalysisMode::Accurate);
    assert_eq!(cfg.profile().batch_size, 4);

    env::set_var(ENV_MODE, "warp speed");
    assert_eq!(
        AnalyzerConfig::from_env().expect("garbage env").mode,
        AnalysisMode::Fast,
        "unknown env mode is ignored"
    );
    clear_env();
}
