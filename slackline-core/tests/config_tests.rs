// ABOUTME: Tests for config loading - file discovery, environment overrides, and validation.
// ABOUTME: Serialized because they mutate process environment variables.

use serial_test::serial;
use slackline_core::config::Config;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_VARS: &[&str] = &[
    "SLACKLINE_CONFIG",
    "SLACK_BOT_TOKEN",
    "SLACK_API_BASE_URL",
    "SLACK_BOT_USER_ID",
    "SLACKLINE_HOST",
    "SLACKLINE_PORT",
    "SLACKLINE_DATA_DIR",
    "SLACKLINE_DEBOUNCE_MS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_from_env_path() {
    clear_env();
    let file = config_file(
        r#"
        [slack]
        bot_token = "xoxb-from-file"
        unfurl_links = true

        [streaming]
        debounce_ms = 250
        feedback_buttons = false

        [status.tools]
        searchChannels = "is searching..."
    "#,
    );
    std::env::set_var("SLACKLINE_CONFIG", file.path());

    let config = Config::load().unwrap();

    assert_eq!(config.slack.bot_token, "xoxb-from-file");
    assert!(config.slack.unfurl_links);
    assert_eq!(config.streaming.debounce_ms, 250);
    assert!(!config.streaming.feedback_buttons);
    assert_eq!(config.status.tools.get("searchChannels").unwrap(), "is searching...");
    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let file = config_file(
        r#"
        [server]
        port = 4000
    "#,
    );
    std::env::set_var("SLACKLINE_CONFIG", file.path());
    std::env::set_var("SLACKLINE_PORT", "4555");
    std::env::set_var("SLACKLINE_HOST", "0.0.0.0");
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-from-env");
    std::env::set_var("SLACK_API_BASE_URL", "http://127.0.0.1:9999");
    std::env::set_var("SLACKLINE_DATA_DIR", "/tmp/slackline-test");
    std::env::set_var("SLACKLINE_DEBOUNCE_MS", "50");

    let config = Config::load().unwrap();

    assert_eq!(config.server.port, 4555);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.slack.bot_token, "xoxb-from-env");
    assert_eq!(config.slack.api_base_url, "http://127.0.0.1:9999");
    assert_eq!(config.approvals.data_dir, "/tmp/slackline-test");
    assert_eq!(config.streaming.debounce_ms, 50);
    assert!(
        std::env::var("SLACK_BOT_TOKEN").is_err(),
        "token is scrubbed from the environment after loading"
    );
    clear_env();
}

#[test]
#[serial]
fn test_invalid_port_is_an_error() {
    clear_env();
    let file = config_file("");
    std::env::set_var("SLACKLINE_CONFIG", file.path());
    std::env::set_var("SLACKLINE_PORT", "not-a-port");

    let err = Config::load().unwrap_err();
    assert!(format!("{:#}", err).contains("SLACKLINE_PORT"));
    clear_env();
}

#[test]
#[serial]
fn test_invalid_status_map_fails_load() {
    clear_env();
    let file = config_file(
        r#"
        [status.kinds]
        text_end = "wrapping up"
    "#,
    );
    std::env::set_var("SLACKLINE_CONFIG", file.path());

    let err = Config::load().unwrap_err();
    assert!(format!("{:#}", err).contains("text_end"));
    clear_env();
}

#[test]
#[serial]
fn test_malformed_file_reports_path() {
    clear_env();
    let file = config_file("[streaming\ndebounce_ms = ");
    std::env::set_var("SLACKLINE_CONFIG", file.path());

    let err = Config::load().unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse"));
    clear_env();
}

#[test]
#[serial]
fn test_non_http_api_base_is_rejected() {
    clear_env();
    let file = config_file(
        r#"
        [slack]
        api_base_url = "slack.com"
    "#,
    );
    std::env::set_var("SLACKLINE_CONFIG", file.path());

    assert!(Config::load().is_err());
    clear_env();
}

#[test]
#[serial]
fn test_data_dir_tilde_is_expanded() {
    clear_env();
    let file = config_file("");
    std::env::set_var("SLACKLINE_CONFIG", file.path());
    std::env::set_var("SLACKLINE_DATA_DIR", "~/slackline-data");

    let config = Config::load().unwrap();
    let data_dir = config.data_dir();

    assert!(!data_dir.to_string_lossy().starts_with('~'));
    assert!(data_dir.ends_with("slackline-data"));
    clear_env();
}
