//! # Agent configuration.
//!
//! [`Config`] is the read-only snapshot every other component is handed at
//! construction time. It is assembled once at process start from three
//! layers, highest precedence first:
//!
//! 1. environment variables (upper-snake of the dotted key,
//!    e.g. `provider.poll_interval` → `PROVIDER_POLL_INTERVAL`),
//! 2. an optional YAML file (`--config <path>`; a missing file is
//!    tolerated, a malformed one is fatal),
//! 3. built-in defaults.
//!
//! After [`Config::load`] returns the snapshot is validated and never
//! mutated again.
//!
//! Durations are written as strings (`"3s"`, `"500ms"`, `"1m30s"`); see
//! [`parse_duration`].
//!
//! # Example
//! ```
//! use evacuator::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.provider.poll_interval.as_secs(), 3);
//! assert!(cfg.provider.auto_detect);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SetupError;

/// Root configuration snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Overrides `event.hostname` before dispatch. In orchestrator
    /// deployments the cluster-side node name differs from the cloud
    /// hostname; this lets actions address the correct cluster object.
    pub node_name: String,
    /// Detection settings.
    pub provider: ProviderConfig,
    /// Evacuation action settings.
    pub handler: HandlerConfig,
    /// Logging backend settings.
    pub log: LogConfig,
}

/// Detection settings: which provider, how often, how patient.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Explicit provider tag; empty means use auto-detection.
    pub name: String,
    /// Probe every provider in order when no name is set.
    pub auto_detect: bool,
    /// Cadence of the spot-endpoint probe. Valid range [3s, 10s].
    #[serde(deserialize_with = "duration_str::deserialize")]
    pub poll_interval: Duration,
    /// Per-request timeout for metadata calls. Valid range [1s, 5s].
    #[serde(deserialize_with = "duration_str::deserialize")]
    pub request_timeout: Duration,
    /// Dummy-provider knobs (integration testing only).
    pub dummy: DummyConfig,
}

/// Dummy provider: fires a synthetic event after a fixed wait.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyConfig {
    /// Delay before the synthetic termination event.
    #[serde(deserialize_with = "duration_str::deserialize")]
    pub detection_wait: Duration,
}

/// Evacuation action settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// Wall-clock budget per action once an event arrives. Values above
    /// 75s are rejected: the shortest platform grace period this agent
    /// targets leaves no room for more.
    #[serde(deserialize_with = "duration_str::deserialize")]
    pub processing_timeout: Duration,
    /// Kubernetes drain action. Mutually exclusive with nomad.
    pub kubernetes: KubernetesConfig,
    /// Nomad drain action. Mutually exclusive with kubernetes.
    pub nomad: NomadConfig,
    /// Telegram notification action.
    pub telegram: TelegramConfig,
}

/// Kubernetes drain action settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KubernetesConfig {
    pub enabled: bool,
    /// Leave DaemonSet-managed pods alone during drain.
    pub skip_daemon_sets: bool,
    /// Evict pods using emptyDir volumes (their data is lost).
    pub delete_empty_dir_data: bool,
    /// Path to a kubeconfig; required when not running in-cluster.
    pub kubeconfig: String,
    /// Use the in-cluster service account.
    pub in_cluster: bool,
}

/// Nomad drain action settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NomadConfig {
    pub enabled: bool,
    /// Drain system jobs too.
    pub force: bool,
}

/// Telegram notification action settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Bot token; required when enabled.
    pub bot_token: String,
    /// Target chat: numeric id or `@channelname`; required when enabled.
    pub chat_id: String,
}

/// Logging backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// One of: debug, info, warn, error.
    pub level: String,
    /// One of: json, text.
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            provider: ProviderConfig::default(),
            handler: HandlerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    /// Defaults:
    /// - `name = ""` (auto-detect)
    /// - `auto_detect = true`
    /// - `poll_interval = 3s`
    /// - `request_timeout = 2s`
    fn default() -> Self {
        Self {
            name: String::new(),
            auto_detect: true,
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(2),
            dummy: DummyConfig::default(),
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            detection_wait: Duration::from_secs(10),
        }
    }
}

impl Default for HandlerConfig {
    /// Defaults: `processing_timeout = 75s`, all actions disabled.
    fn default() -> Self {
        Self {
            processing_timeout: Duration::from_secs(75),
            kubernetes: KubernetesConfig::default(),
            nomad: NomadConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            skip_daemon_sets: true,
            delete_empty_dir_data: false,
            kubeconfig: String::new(),
            in_cluster: true,
        }
    }
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            force: false,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Config {
    /// Loads the snapshot: defaults, then the optional YAML file, then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, SetupError> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|e| SetupError::ConfigLoad {
                    path: p.display().to_string(),
                    reason: e.to_string(),
                })?;
                serde_yaml::from_str(&text).map_err(|e| SetupError::ConfigLoad {
                    path: p.display().to_string(),
                    reason: e.to_string(),
                })?
            }
            _ => Config::default(),
        };

        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// Injected lookup keeps this testable without mutating process env.
    /// A present-but-unparsable value is a configuration error, not a
    /// silent fallback.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn set_string(slot: &mut String, val: Option<String>) {
            if let Some(v) = val {
                *slot = v;
            }
        }

        fn set_bool(slot: &mut bool, key: &str, val: Option<String>) -> Result<(), SetupError> {
            if let Some(v) = val {
                *slot = v.parse().map_err(|_| SetupError::ConfigInvalid {
                    reason: format!("{key} must be a boolean, got '{v}'"),
                })?;
            }
            Ok(())
        }

        fn set_duration(
            slot: &mut Duration,
            key: &str,
            val: Option<String>,
        ) -> Result<(), SetupError> {
            if let Some(v) = val {
                *slot = parse_duration(&v).map_err(|e| SetupError::ConfigInvalid {
                    reason: format!("{key} must be a duration: {e}"),
                })?;
            }
            Ok(())
        }

        set_string(&mut self.node_name, lookup("NODE_NAME"));
        set_string(&mut self.provider.name, lookup("PROVIDER_NAME"));
        set_bool(
            &mut self.provider.auto_detect,
            "PROVIDER_AUTO_DETECT",
            lookup("PROVIDER_AUTO_DETECT"),
        )?;
        set_duration(
            &mut self.provider.poll_interval,
            "PROVIDER_POLL_INTERVAL",
            lookup("PROVIDER_POLL_INTERVAL"),
        )?;
        set_duration(
            &mut self.provider.request_timeout,
            "PROVIDER_REQUEST_TIMEOUT",
            lookup("PROVIDER_REQUEST_TIMEOUT"),
        )?;
        set_duration(
            &mut self.provider.dummy.detection_wait,
            "PROVIDER_DUMMY_DETECTION_WAIT",
            lookup("PROVIDER_DUMMY_DETECTION_WAIT"),
        )?;

        set_duration(
            &mut self.handler.processing_timeout,
            "HANDLER_PROCESSING_TIMEOUT",
            lookup("HANDLER_PROCESSING_TIMEOUT"),
        )?;
        set_bool(
            &mut self.handler.kubernetes.enabled,
            "HANDLER_KUBERNETES_ENABLED",
            lookup("HANDLER_KUBERNETES_ENABLED"),
        )?;
        set_bool(
            &mut self.handler.kubernetes.skip_daemon_sets,
            "HANDLER_KUBERNETES_SKIP_DAEMON_SETS",
            lookup("HANDLER_KUBERNETES_SKIP_DAEMON_SETS"),
        )?;
        set_bool(
            &mut self.handler.kubernetes.delete_empty_dir_data,
            "HANDLER_KUBERNETES_DELETE_EMPTY_DIR_DATA",
            lookup("HANDLER_KUBERNETES_DELETE_EMPTY_DIR_DATA"),
        )?;
        set_string(
            &mut self.handler.kubernetes.kubeconfig,
            lookup("HANDLER_KUBERNETES_KUBECONFIG"),
        );
        set_bool(
            &mut self.handler.kubernetes.in_cluster,
            "HANDLER_KUBERNETES_IN_CLUSTER",
            lookup("HANDLER_KUBERNETES_IN_CLUSTER"),
        )?;
        set_bool(
            &mut self.handler.nomad.enabled,
            "HANDLER_NOMAD_ENABLED",
            lookup("HANDLER_NOMAD_ENABLED"),
        )?;
        set_bool(
            &mut self.handler.nomad.force,
            "HANDLER_NOMAD_FORCE",
            lookup("HANDLER_NOMAD_FORCE"),
        )?;
        set_bool(
            &mut self.handler.telegram.enabled,
            "HANDLER_TELEGRAM_ENABLED",
            lookup("HANDLER_TELEGRAM_ENABLED"),
        )?;
        set_string(
            &mut self.handler.telegram.bot_token,
            lookup("HANDLER_TELEGRAM_BOT_TOKEN"),
        );
        set_string(
            &mut self.handler.telegram.chat_id,
            lookup("HANDLER_TELEGRAM_CHAT_ID"),
        );

        set_string(&mut self.log.level, lookup("LOG_LEVEL"));
        set_string(&mut self.log.format, lookup("LOG_FORMAT"));

        Ok(())
    }

    /// Checks every load-time invariant. Called once, after layering.
    pub fn validate(&self) -> Result<(), SetupError> {
        fn invalid(reason: impl Into<String>) -> SetupError {
            SetupError::ConfigInvalid {
                reason: reason.into(),
            }
        }

        if self.provider.name.is_empty() && !self.provider.auto_detect {
            return Err(invalid(
                "provider.name must be set when provider.auto_detect is disabled",
            ));
        }

        let poll = self.provider.poll_interval;
        if !(Duration::from_secs(3)..=Duration::from_secs(10)).contains(&poll) {
            return Err(invalid(format!(
                "provider.poll_interval must be between 3s and 10s, got {poll:?}"
            )));
        }

        let timeout = self.provider.request_timeout;
        if !(Duration::from_secs(1)..=Duration::from_secs(5)).contains(&timeout) {
            return Err(invalid(format!(
                "provider.request_timeout must be between 1s and 5s, got {timeout:?}"
            )));
        }

        if self.handler.processing_timeout > Duration::from_secs(75) {
            return Err(invalid(
                "handler.processing_timeout above 75s is ineffective against platform grace periods",
            ));
        }

        if self.handler.kubernetes.enabled && self.handler.nomad.enabled {
            return Err(invalid(
                "handler.kubernetes and handler.nomad cannot be enabled at the same time",
            ));
        }

        if self.handler.kubernetes.enabled
            && !self.handler.kubernetes.in_cluster
            && self.handler.kubernetes.kubeconfig.is_empty()
        {
            return Err(invalid(
                "handler.kubernetes.kubeconfig must be set when not running in-cluster",
            ));
        }

        if self.handler.telegram.enabled
            && (self.handler.telegram.bot_token.is_empty()
                || self.handler.telegram.chat_id.is_empty())
        {
            return Err(invalid(
                "handler.telegram.bot_token and handler.telegram.chat_id must be set",
            ));
        }

        match self.log.level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => return Err(invalid(format!("invalid log.level: {other}"))),
        }
        match self.log.format.as_str() {
            "json" | "text" => {}
            other => return Err(invalid(format!("invalid log.format: {other}"))),
        }

        Ok(())
    }
}

/// Parses a duration string: one or more `<integer><unit>` segments with
/// units `ms`, `s`, `m`, `h` (`"3s"`, `"500ms"`, `"1m30s"`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in '{input}'"))?;
        if digits_end == 0 {
            return Err(format!("expected a number in '{input}'"));
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("bad number '{digits}' in '{input}'"))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, remaining) = tail.split_at(unit_end);
        total += match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            other => return Err(format!("unknown unit '{other}' in '{input}'")),
        };
        rest = remaining;
    }
    Ok(total)
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(map: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn parses_duration_segments() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("3").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("3x").is_err());
        assert!(parse_duration("-3s").is_err());
    }

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn yaml_overrides_defaults() {
        let cfg: Config = serde_yaml::from_str(
            r#"
node_name: worker-17
provider:
  name: aws
  poll_interval: 5s
handler:
  processing_timeout: 60s
"#,
        )
        .unwrap();
        assert_eq!(cfg.node_name, "worker-17");
        assert_eq!(cfg.provider.name, "aws");
        assert_eq!(cfg.provider.poll_interval, Duration::from_secs(5));
        // untouched keys keep their defaults
        assert_eq!(cfg.provider.request_timeout, Duration::from_secs(2));
        assert_eq!(cfg.handler.processing_timeout, Duration::from_secs(60));
        assert!(!cfg.handler.kubernetes.enabled);
    }

    #[test]
    fn env_wins_over_file_values() {
        let mut cfg: Config = serde_yaml::from_str("provider:\n  poll_interval: 5s\n").unwrap();
        let env = HashMap::from([
            ("PROVIDER_POLL_INTERVAL", "7s"),
            ("NODE_NAME", "worker-17"),
            ("HANDLER_NOMAD_ENABLED", "true"),
        ]);
        cfg.apply_env(lookup_from(&env)).unwrap();
        assert_eq!(cfg.provider.poll_interval, Duration::from_secs(7));
        assert_eq!(cfg.node_name, "worker-17");
        assert!(cfg.handler.nomad.enabled);
    }

    #[test]
    fn unparsable_env_value_is_fatal() {
        let mut cfg = Config::default();
        let env = HashMap::from([("PROVIDER_POLL_INTERVAL", "soon")]);
        assert!(cfg.apply_env(lookup_from(&env)).is_err());

        let mut cfg = Config::default();
        let env = HashMap::from([("HANDLER_KUBERNETES_ENABLED", "yep")]);
        assert!(cfg.apply_env(lookup_from(&env)).is_err());
    }

    #[test]
    fn poll_interval_range_is_enforced() {
        let mut cfg = Config::default();
        cfg.provider.poll_interval = Duration::from_secs(2);
        assert!(cfg.validate().is_err());
        cfg.provider.poll_interval = Duration::from_secs(11);
        assert!(cfg.validate().is_err());
        cfg.provider.poll_interval = Duration::from_secs(10);
        cfg.validate().unwrap();
    }

    #[test]
    fn request_timeout_range_is_enforced() {
        let mut cfg = Config::default();
        cfg.provider.request_timeout = Duration::from_millis(900);
        assert!(cfg.validate().is_err());
        cfg.provider.request_timeout = Duration::from_secs(6);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn processing_timeout_is_capped() {
        let mut cfg = Config::default();
        cfg.handler.processing_timeout = Duration::from_secs(76);
        assert!(cfg.validate().is_err());
        cfg.handler.processing_timeout = Duration::from_secs(75);
        cfg.validate().unwrap();
    }

    #[test]
    fn kubernetes_and_nomad_are_mutually_exclusive() {
        let mut cfg = Config::default();
        cfg.handler.kubernetes.enabled = true;
        cfg.handler.nomad.enabled = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn telegram_requires_both_credentials() {
        let mut cfg = Config::default();
        cfg.handler.telegram.enabled = true;
        cfg.handler.telegram.bot_token = "123:abc".into();
        assert!(cfg.validate().is_err());

        cfg.handler.telegram.chat_id = "-100123".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn kubeconfig_required_outside_cluster() {
        let mut cfg = Config::default();
        cfg.handler.kubernetes.enabled = true;
        cfg.handler.kubernetes.in_cluster = false;
        assert!(cfg.validate().is_err());

        cfg.handler.kubernetes.kubeconfig = "/home/op/.kube/config".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn no_provider_and_no_auto_detect_is_fatal() {
        let mut cfg = Config::default();
        cfg.provider.auto_detect = false;
        assert!(cfg.validate().is_err());
        cfg.provider.name = "gcp".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn log_enums_are_closed() {
        let mut cfg = Config::default();
        cfg.log.level = "verbose".into();
        assert!(cfg.validate().is_err());
        cfg.log.level = "debug".into();
        cfg.log.format = "logfmt".into();
        assert!(cfg.validate().is_err());
    }
}
