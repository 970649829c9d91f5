//! Integration tests for config

#[cfg(test)]
mod tests {
    use dsu_config::*;
    use dsu_types::{ColorChoice, OutputFormat};
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 5] = [
        "DSU_OUTPUT",
        "DSU_COLOR",
        "DSU_CONNECT_TIMEOUT_MS",
        "DSU_POLL_INTERVAL_MS",
        "DSU_CHUNK_SIZE",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.broker.timeout(), Duration::from_secs(20));
        assert_eq!(config.broker.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.install.default_userdata_gib, 4);
        assert_eq!(config.script.tool, "gsi_tool");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
default_output = "plain"
color = "never"

[broker]
connect_timeout_ms = 500
poll_interval_ms = 50

[install]
chunk_size = 4096
image_root = "/tmp/dsu-images"

[script]
tool = "dsu_tool"
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert_eq!(config.broker.timeout(), Duration::from_millis(500));
        assert_eq!(config.broker.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.install.chunk_size, 4096);
        assert_eq!(config.install.default_userdata_gib, 4);
        assert_eq!(config.image_root().to_str(), Some("/tmp/dsu-images"));
        assert_eq!(config.script.tool, "dsu_tool");
        assert_eq!(config.script.shell, fixed_paths::DEFAULT_SHELL);
    }

    #[tokio::test]
    async fn test_parse_error_reported() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[broker\nconnect_timeout_ms = ").unwrap();
        assert!(Config::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("DSU_OUTPUT", "json");
        std::env::set_var("DSU_COLOR", "always");
        std::env::set_var("DSU_CONNECT_TIMEOUT_MS", "1500");
        std::env::set_var("DSU_POLL_INTERVAL_MS", "10");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.general.default_output, OutputFormat::Json);
        assert_eq!(config.general.color, ColorChoice::Always);
        assert_eq!(config.broker.connect_timeout_ms, 1500);
        assert_eq!(config.broker.poll_interval_ms, 10);

        clear_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("DSU_CHUNK_SIZE", "lots");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.broker.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
