use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::labels::{LabelExtractor, DEFAULT_ROUTER_KEY, DEFAULT_RULE_KEY};
use crate::watcher::ReconnectPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub hosts_file: PathBuf,
    pub api_bind: SocketAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_ip: Option<String>,
    pub router_label: String,
    pub rule_label: String,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // The host's /etc/hosts is bind-mounted here
            hosts_file: PathBuf::from("/app/hosts.file"),
            api_bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            bind_ip: None,
            router_label: DEFAULT_ROUTER_KEY.into(),
            rule_label: DEFAULT_RULE_KEY.into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("hostsync.toml"))
            .merge(Json::file("hostsync.json"))
            .merge(Env::prefixed("HOSTSYNC_").split("__"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Plain variable used by existing compose files
        if std::env::var_os("HOSTSYNC_HOSTS_FILE").is_none() {
            if let Some(path) = std::env::var_os("HOST_FILE_PATH") {
                config.hosts_file = PathBuf::from(path);
            }
        }

        // If bind_ip is set, override the IP part of api_bind
        if let Some(ref ip) = config.bind_ip {
            let port = config.api_bind.port();
            config.api_bind = format!("{}:{}", ip, port)
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid bind_ip: {}", e))?;
        }

        if config.reconnect.initial_delay_ms == 0 {
            anyhow::bail!("reconnect.initial_delay_ms must be greater than zero");
        }

        Ok(config)
    }

    pub fn extractor(&self) -> LabelExtractor {
        LabelExtractor::new(&self.router_label, &self.rule_label)
    }

    /// `None` unless reconnection is enabled.
    pub fn reconnect_policy(&self) -> Option<ReconnectPolicy> {
        let r = &self.reconnect;
        r.enabled.then(|| ReconnectPolicy {
            initial_delay: Duration::from_millis(r.initial_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms.max(r.initial_delay_ms)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load().unwrap();
            assert_eq!(config.hosts_file, PathBuf::from("/app/hosts.file"));
            assert_eq!(config.api_bind, "0.0.0.0:8000".parse().unwrap());
            assert_eq!(config.router_label, "traefik.http.routers");
            assert!(config.reconnect_policy().is_none());
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hostsync.toml",
                r#"
                    hosts_file = "/etc/hosts"
                    api_bind = "127.0.0.1:9000"

                    [reconnect]
                    enabled = true
                    initial_delay_ms = 500
                "#,
            )?;
            jail.set_env("HOSTSYNC_API_BIND", "127.0.0.1:9100");
            jail.set_env("HOSTSYNC_RECONNECT__MAX_DELAY_MS", "4000");

            let config = Config::load().unwrap();
            assert_eq!(config.hosts_file, PathBuf::from("/etc/hosts"));
            assert_eq!(config.api_bind, "127.0.0.1:9100".parse().unwrap());
            assert_eq!(
                config.reconnect_policy(),
                Some(ReconnectPolicy {
                    initial_delay: Duration::from_millis(500),
                    max_delay: Duration::from_millis(4000),
                })
            );
            Ok(())
        });
    }

    #[test]
    fn host_file_path_is_honoured_unless_prefixed_var_set() {
        Jail::expect_with(|jail| {
            jail.set_env("HOST_FILE_PATH", "/mnt/hosts");
            assert_eq!(Config::load().unwrap().hosts_file, PathBuf::from("/mnt/hosts"));

            jail.set_env("HOSTSYNC_HOSTS_FILE", "/srv/hosts");
            assert_eq!(Config::load().unwrap().hosts_file, PathBuf::from("/srv/hosts"));
            Ok(())
        });
    }

    #[test]
    fn bind_ip_overrides_address_only() {
        Jail::expect_with(|jail| {
            jail.set_env("HOSTSYNC_BIND_IP", "10.1.2.3");
            let config = Config::load().unwrap();
            assert_eq!(config.api_bind, "10.1.2.3:8000".parse().unwrap());

            jail.set_env("HOSTSYNC_BIND_IP", "not-an-ip");
            assert!(Config::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn zero_initial_delay_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("HOSTSYNC_RECONNECT__INITIAL_DELAY_MS", "0");
            assert!(Config::load().is_err());
            Ok(())
        });
    }
}
