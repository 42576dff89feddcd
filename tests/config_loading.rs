use std::io::Write;

use moot_core::config::{AppConfig, BudgetConfig, CheckpointBackend};

fn load(toml_content: &str) -> AppConfig {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");
    AppConfig::load(tmp.path()).expect("load config")
}

#[test]
fn test_load_full_config_from_file() {
    let config = load(
        r#"
[model]
provider = "openai"
model_id = "gpt-4o"
api_key = "sk-test-key"
base_url = "http://localhost:11434/v1"
max_tokens = 4096
temperature = 0.3

[structured_model]
model_id = "gpt-4o-mini"
temperature = 0.0

[retry]
max_attempts = 3
initial_delay_ms = 500
max_delay_ms = 4000
multiplier = 3.0

[budgets]
questions = 5
evidence = 2
focus_rounds = 1

[gateway]
bind = "0.0.0.0:9999"

[checkpoint]
backend = "sqlite"
path = "/tmp/moot-test/checkpoints.db"

[session]
retain_checkpoints = true
"#,
    );

    assert_eq!(config.model.model_id, "gpt-4o");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 4096);
    assert_eq!(config.structured_model().model_id, "gpt-4o-mini");
    assert_eq!(config.structured_model().max_tokens, 2048);

    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.initial_delay_ms, 500);
    assert_eq!(config.retry.max_delay_ms, 4000);

    assert_eq!(
        config.budgets,
        BudgetConfig {
            questions: 5,
            evidence: 2,
            focus_rounds: 1,
        }
    );
    assert_eq!(config.gateway.bind, "0.0.0.0:9999");
    assert_eq!(config.checkpoint.backend, CheckpointBackend::Sqlite);
    assert_eq!(
        config.checkpoint.resolved_path(),
        std::path::PathBuf::from("/tmp/moot-test/checkpoints.db")
    );
    assert!(config.session.retain_checkpoints);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("MOOT_TEST_API_KEY", "expanded-key-value");

    let config = load(
        r#"
[model]
model_id = "test-model"
api_key = "${MOOT_TEST_API_KEY}"
"#,
    );
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("MOOT_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = load(
        r#"
[model]
model_id = "llama3.2"
"#,
    );

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_id, "llama3.2");
    // No structured model: decisions use the main model
    assert_eq!(config.structured_model().model_id, "llama3.2");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.initial_delay_ms, 2000);
    assert_eq!(config.budgets, BudgetConfig::default());
    assert_eq!(config.gateway.bind, "127.0.0.1:8000");
    assert_eq!(config.checkpoint.backend, CheckpointBackend::Memory);
    assert!(!config.session.retain_checkpoints);
}

#[test]
fn test_empty_file_is_valid() {
    let config = load("");
    assert_eq!(config.model.model_id, "gpt-4o-mini");
    assert_eq!(config.budgets.questions, 3);
}

#[test]
fn test_missing_file_is_config_error() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/moot.toml")).unwrap_err();
    assert_eq!(err.code(), "CONFIG_ERROR");
}

#[test]
fn test_bad_backend_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[checkpoint]\nbackend = \"redis\"\n")
        .expect("write toml");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert_eq!(err.code(), "CONFIG_ERROR");
}
