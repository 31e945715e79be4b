use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for environment overrides, e.g. `MARQUEE__LIMITER__ENABLED=false`.
pub const ENV_PREFIX: &str = "MARQUEE";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::MailerKind;

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:4000"
env = "staging"

[limiter]
enabled = true
rps = 5.0
burst = 10

[cors]
trusted_origins = ["https://marquee.example"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.env, "staging");
        assert_eq!(config.limiter.burst, 10);
        assert_eq!(config.limiter.idle_retention, "3m");
        assert_eq!(config.cors.trusted_origins, vec!["https://marquee.example"]);
        assert_eq!(config.mailer.kind, MailerKind::Log);
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
limiter:
  enabled: false
mailer:
  kind: webhook
  url: "http://mail.internal/send"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert!(!config.limiter.enabled);
        assert_eq!(config.mailer.kind, MailerKind::Webhook);
        assert_eq!(config.mailer.url.as_deref(), Some("http://mail.internal/send"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = load_config("/definitely/not/here/marquee.toml").await;
        assert!(result.is_err());
    }
}
