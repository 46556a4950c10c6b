mod settings;

pub use settings::*;

use anyhow::Result;
use std::path::Path;

/// Environment and command-line overrides, applied on top of the config file
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// LAPI base URL
    #[arg(long, env = "LAPI_URL")]
    pub lapi_url: Option<String>,

    /// Bouncer API key used for polling
    #[arg(long, env = "LAPI_BOUNCER_API_TOKEN", hide_env_values = true)]
    pub lapi_bouncer_api_token: Option<String>,

    /// Watcher machine id, needed for deleting decisions
    #[arg(long, env = "LAPI_MACHINE_ID")]
    pub lapi_machine_id: Option<String>,

    #[arg(long, env = "LAPI_MACHINE_PASSWORD", hide_env_values = true)]
    pub lapi_machine_password: Option<String>,

    /// Seconds between sync runs
    #[arg(long, env = "LAPI_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Maximum number of stored decisions
    #[arg(long, env = "DECISION_RETENTION_COUNT")]
    pub retention_count: Option<u64>,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Override listen address
    #[arg(long, env = "LISTEN")]
    pub listen: Option<String>,

    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Static bearer token; enables bearer auth on the API
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
}

impl AppConfig {
    /// Load the YAML file when present, then apply overrides and validate.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self> {
        let mut settings = if path.exists() {
            Settings::load(path)?
        } else {
            Settings::default()
        };
        overrides.apply(&mut settings);
        settings.validate()?;
        Ok(Self { settings })
    }
}

impl Overrides {
    pub fn apply(&self, settings: &mut Settings) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        if self.lapi_url.is_some() {
            settings.lapi.url = self.lapi_url.clone();
        }
        if self.lapi_bouncer_api_token.is_some() {
            settings.lapi.bouncer_api_key = self.lapi_bouncer_api_token.clone();
        }
        if self.lapi_machine_id.is_some() {
            settings.lapi.machine_id = self.lapi_machine_id.clone();
        }
        if self.lapi_machine_password.is_some() {
            settings.lapi.machine_password = self.lapi_machine_password.clone();
        }
        set(&mut settings.sync.poll_interval_secs, &self.poll_interval);
        if self.retention_count.is_some() {
            settings.sync.retention_count = self.retention_count;
        }
        set(&mut settings.storage.connection_string, &self.database_url);
        set(&mut settings.http.listen, &self.listen);
        set(&mut settings.observability.log_level, &self.log_level);
        set(&mut settings.observability.log_format, &self.log_format);
        if let Some(token) = &self.api_token {
            settings.http.auth.mode = AuthMode::Bearer;
            settings.http.auth.token = Some(token.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_yaml("").unwrap();
        assert_eq!(settings.sync.poll_interval_secs, 60);
        assert_eq!(settings.sync.batch_size, 500);
        assert_eq!(settings.sync.alert_chunk_size, 10);
        assert_eq!(settings.sync.retention_count, None);
        assert_eq!(settings.lapi.origins.as_deref(), Some("crowdsec,cscli"));
        assert_eq!(settings.http.auth.mode, AuthMode::None);
        assert!(!settings.lapi.is_configured());
        settings.validate().unwrap();
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
http:
  listen: "127.0.0.1:8080"
lapi:
  url: "http://crowdsec:8080"
  bouncer_api_key: "key"
  machine_id: "dashboard"
  machine_password: "secret"
sync:
  poll_interval_secs: 30
  retention_count: 5000
observability:
  log_format: pretty
geoip:
  countries:
    - cidr: "192.0.2.0/24"
      country: "NL"
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.http.listen, "127.0.0.1:8080");
        assert!(settings.lapi.is_configured());
        assert_eq!(
            settings.lapi.watcher_credentials(),
            Some(("dashboard", "secret"))
        );
        assert_eq!(settings.sync.poll_interval_secs, 30);
        assert_eq!(settings.sync.retention_count, Some(5000));
        assert_eq!(settings.sync.batch_size, 500);
        assert_eq!(settings.observability.log_format, LogFormat::Pretty);
        assert_eq!(settings.geoip.countries.len(), 1);
        settings.validate().unwrap();
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut settings = Settings::from_yaml("sync:\n  poll_interval_secs: 30\n").unwrap();
        let overrides = Overrides {
            lapi_url: Some("http://lapi:8080".into()),
            lapi_bouncer_api_token: Some("token".into()),
            poll_interval: Some(15),
            retention_count: Some(100),
            log_format: Some(LogFormat::Pretty),
            api_token: Some("api-secret".into()),
            ..Default::default()
        };
        overrides.apply(&mut settings);

        assert!(settings.lapi.is_configured());
        assert_eq!(settings.sync.poll_interval_secs, 15);
        assert_eq!(settings.sync.retention_count, Some(100));
        assert_eq!(settings.observability.log_format, LogFormat::Pretty);
        assert_eq!(settings.http.auth.mode, AuthMode::Bearer);
        settings.validate().unwrap();
    }

    #[test]
    fn test_blank_lapi_values_are_not_configured() {
        let mut settings = Settings::default();
        settings.lapi.url = Some("http://lapi:8080".into());
        settings.lapi.bouncer_api_key = Some("  ".into());
        assert!(!settings.lapi.is_configured());
        assert_eq!(settings.lapi.watcher_credentials(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.http.auth.mode = AuthMode::Bearer;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sync.batch_size = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.geoip.countries.push(CountryRange {
            cidr: "not-a-cidr".into(),
            country: "NL".into(),
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("dashboard.yaml"), &Overrides::default())
            .unwrap();
        assert_eq!(config.settings.sync.poll_interval_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.yaml");
        std::fs::write(&path, "sync:\n  retention_count: 10\n").unwrap();
        let config = AppConfig::load(&path, &Overrides::default()).unwrap();
        assert_eq!(config.settings.sync.retention_count, Some(10));
    }
}
