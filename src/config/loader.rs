use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::{Config, ProviderKind};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            anyhow::bail!("at least one tenant must be defined");
        }

        for (key, tenant) in &self.tenants {
            if key.trim().is_empty() {
                anyhow::bail!("tenant subscription key must not be empty");
            }

            if tenant.http.is_none() && tenant.smpp.is_none() {
                anyhow::bail!(
                    "tenant '{}' must have at least one channel configured",
                    tenant.name
                );
            }

            if let Some(http) = &tenant.http {
                if http.endpoint.trim().is_empty() {
                    anyhow::bail!("tenant '{}': HTTP endpoint must not be empty", tenant.name);
                }

                if http.provider == ProviderKind::Custom && http.payload_template.is_none() {
                    anyhow::bail!(
                        "tenant '{}': custom provider requires a payload template",
                        tenant.name
                    );
                }

                if http.max_requests_per_second == 0 {
                    anyhow::bail!(
                        "tenant '{}': max_requests_per_second must be positive",
                        tenant.name
                    );
                }
            }

            if let Some(smpp) = &tenant.smpp {
                if smpp.host.trim().is_empty() {
                    anyhow::bail!("tenant '{}': SMPP host must not be empty", tenant.name);
                }

                if smpp.pool.max_connections == 0 {
                    anyhow::bail!(
                        "tenant '{}': SMPP pool must allow at least one connection",
                        tenant.name
                    );
                }

                if smpp.pool.min_connections > smpp.pool.max_connections {
                    anyhow::bail!(
                        "tenant '{}': SMPP pool min_connections exceeds max_connections",
                        tenant.name
                    );
                }

                if smpp.rate.max_messages_per_second == 0 {
                    anyhow::bail!(
                        "tenant '{}': SMPP max_messages_per_second must be positive",
                        tenant.name
                    );
                }
            }
        }

        if self.worker.concurrency == 0 {
            anyhow::bail!("worker concurrency must be positive");
        }

        info!(tenants = self.tenants.len(), "configuration validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let yaml = r#"
tenants:
  demo-key:
    name: Demo
    http:
      endpoint: "https://sms.example.com/send"
      api_key: secret
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.tenants.len(), 1);

        let tenant = &config.tenants["demo-key"];
        assert_eq!(tenant.name, "Demo");
        let http = tenant.http.as_ref().unwrap();
        assert_eq!(http.max_retries, 3);
        assert_eq!(http.timeout.as_secs(), 10);
    }

    #[test]
    fn test_smpp_tenant_config() {
        let yaml = r#"
tenants:
  telco-key:
    name: Telco
    smpp:
      host: smsc.example.com
      port: 2775
      system_id: hub
      password: pass
      source_address: "12345"
      pool:
        min_connections: 2
        max_connections: 8
      rate:
        max_messages_per_second: 100
"#;

        let config = Config::from_yaml(yaml).unwrap();
        let smpp = config.tenants["telco-key"].smpp.as_ref().unwrap();
        assert_eq!(smpp.pool.max_connections, 8);
        assert_eq!(smpp.rate.max_messages_per_second, 100);
        assert!(smpp.delivery_receipts.enabled);
        assert_eq!(smpp.enquire_link_interval.as_secs(), 30);
    }

    #[test]
    fn test_no_tenants_rejected() {
        let result = Config::from_yaml("tenants: {}");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one tenant"));
    }

    #[test]
    fn test_tenant_without_channels_rejected() {
        let yaml = r#"
tenants:
  empty-key:
    name: Empty
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one channel"));
    }

    #[test]
    fn test_custom_provider_requires_template() {
        let yaml = r#"
tenants:
  demo-key:
    name: Demo
    http:
      endpoint: "https://sms.example.com/send"
      api_key: secret
      provider: custom
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("payload template"));
    }

    #[test]
    fn test_pool_min_exceeding_max_rejected() {
        let yaml = r#"
tenants:
  telco-key:
    name: Telco
    smpp:
      host: smsc.example.com
      system_id: hub
      password: pass
      source_address: "12345"
      pool:
        min_connections: 9
        max_connections: 2
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("min_connections exceeds max_connections"));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
tenants:
  demo-key:
    name: Demo
    http:
      endpoint: "https://sms.example.com/send"
      api_key: secret
      timeout: 5s
      max_retries: 1
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        let http = config.tenants["demo-key"].http.as_ref().unwrap();
        assert_eq!(http.timeout.as_secs(), 5);
        assert_eq!(http.max_retries, 1);
    }
}
