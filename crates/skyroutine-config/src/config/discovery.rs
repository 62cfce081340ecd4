use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use skyroutine_utils::error::ConfigError;

use super::model::TomlConfig;
use super::{CliArgs, Config, ConfigSource};

/// Directory searched for upward from the start directory
pub const CONFIG_DIR: &str = ".skyroutine";
/// File name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// Overwrite `slot` when `value` is present and record where it came from.
fn apply<T>(
    slot: &mut T,
    value: Option<T>,
    key: &str,
    source: ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(v) = value {
        *slot = v;
        attribution.insert(key.to_string(), source);
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut config = Config::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "Loading configuration file");
            let file = Self::load_file(path)?;
            config.merge_file(file);
        }

        config.merge_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Walk upward from `start_dir` looking for `.skyroutine/config.toml`.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    fn load_file(path: &Path) -> Result<TomlConfig> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let parsed: TomlConfig = toml::from_str(&text)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))?;
        Ok(parsed)
    }

    fn merge_file(&mut self, file: TomlConfig) {
        let src = ConfigSource::Config;
        let attr = &mut self.source_attribution;

        if let Some(r) = file.routine {
            let c = &mut self.routine;
            apply(&mut c.platform, r.platform, "platform", src, attr);
            apply(&mut c.strategy, r.strategy, "strategy", src, attr);
            apply(&mut c.failure_policy, r.failure_policy, "failure_policy", src, attr);
            apply(&mut c.dump_captures, r.dump_captures, "dump_captures", src, attr);
            apply(
                &mut c.command_timeout_secs,
                r.command_timeout_secs,
                "command_timeout_secs",
                src,
                attr,
            );
            apply(&mut c.wait_mode, r.wait_mode, "wait_mode", src, attr);
            apply(&mut c.poll_interval_ms, r.poll_interval_ms, "poll_interval_ms", src, attr);
            apply(&mut c.verbose, r.verbose, "verbose", src, attr);
        }

        if let Some(s) = file.services {
            let c = &mut self.services;
            apply(&mut c.flight, s.flight, "services.flight", src, attr);
            apply(&mut c.gimbal, s.gimbal, "services.gimbal", src, attr);
            apply(&mut c.camera, s.camera, "services.camera", src, attr);
            apply(&mut c.trace, s.trace, "services.trace", src, attr);
        }

        if let Some(t) = file.transport {
            apply(
                &mut self.transport.default_endpoint,
                t.default_endpoint,
                "default_endpoint",
                src,
                attr,
            );
            apply(&mut self.transport.endpoints, t.endpoints, "endpoints", src, attr);
        }

        if let Some(r) = file.retrieval {
            let c = &mut self.retrieval;
            apply(&mut c.data_endpoint, r.data_endpoint, "data_endpoint", src, attr);
            apply(&mut c.query_descriptor, r.query_descriptor, "query_descriptor", src, attr);
            apply(&mut c.working_image, r.working_image, "working_image", src, attr);
            apply(&mut c.capture_image, r.capture_image.map(Some), "capture_image", src, attr);
            apply(&mut c.positives_dir, r.positives_dir, "positives_dir", src, attr);
            apply(&mut c.negatives_dir, r.negatives_dir, "negatives_dir", src, attr);
            apply(&mut c.file_prefix, r.file_prefix, "file_prefix", src, attr);
            apply(&mut c.file_extension, r.file_extension, "file_extension", src, attr);
            apply(&mut c.max_payloads, r.max_payloads.map(Some), "max_payloads", src, attr);
            apply(
                &mut c.max_payload_bytes,
                r.max_payload_bytes,
                "max_payload_bytes",
                src,
                attr,
            );
            apply(
                &mut c.read_timeout_secs,
                r.read_timeout_secs.map(Some),
                "read_timeout_secs",
                src,
                attr,
            );
        }

        if let Some(k) = file.classifier {
            let c = &mut self.classifier;
            apply(&mut c.program, k.program.map(Some), "classifier.program", src, attr);
            apply(&mut c.args, k.args, "classifier.args", src, attr);
            apply(&mut c.timeout_secs, k.timeout_secs, "classifier.timeout_secs", src, attr);
        }
    }

    fn merge_cli(&mut self, cli: &CliArgs) {
        let src = ConfigSource::Cli;
        let attr = &mut self.source_attribution;
        let c = &mut self.routine;

        apply(&mut c.strategy, cli.strategy, "strategy", src, attr);
        apply(&mut c.failure_policy, cli.failure_policy, "failure_policy", src, attr);
        apply(&mut c.dump_captures, cli.dump_captures, "dump_captures", src, attr);
        apply(
            &mut c.command_timeout_secs,
            cli.command_timeout_secs,
            "command_timeout_secs",
            src,
            attr,
        );
        apply(&mut c.wait_mode, cli.wait_mode, "wait_mode", src, attr);
        apply(&mut c.verbose, cli.verbose, "verbose", src, attr);
        apply(
            &mut self.retrieval.data_endpoint,
            cli.data_endpoint.clone(),
            "data_endpoint",
            src,
            attr,
        );
        apply(
            &mut self.classifier.program,
            cli.classifier_program.clone().map(Some),
            "classifier.program",
            src,
            attr,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyroutine_utils::types::{FailurePolicy, RoutineStrategy};
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let cfg_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&cfg_dir).unwrap();
        let path = cfg_dir.join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();

        assert_eq!(config.routine.strategy, RoutineStrategy::BulkRetrieval);
        assert_eq!(config.routine.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.routine.command_timeout_secs, 30);
        assert_eq!(config.source_of("strategy"), ConfigSource::Default);
    }

    #[test]
    fn test_file_discovered_from_nested_dir() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"
[routine]
strategy = "capture_only"
dump_captures = true

[retrieval]
data_endpoint = "10.0.0.5:9000"
max_payloads = 12
capture_image = "captures/latest.jpg"
"#,
        );
        let nested = temp.path().join("missions").join("day1");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();

        assert_eq!(config.routine.strategy, RoutineStrategy::CaptureOnly);
        assert!(config.routine.dump_captures);
        assert_eq!(config.retrieval.data_endpoint, "10.0.0.5:9000");
        assert_eq!(config.retrieval.max_payloads, Some(12));
        assert_eq!(
            config.retrieval.capture_image,
            Some(PathBuf::from("captures/latest.jpg"))
        );
        assert_eq!(config.source_of("data_endpoint"), ConfigSource::Config);
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "[routine]\ncommand_timeout_secs = 90\nfailure_policy = \"continue\"\n",
        );
        let cli = CliArgs {
            command_timeout_secs: Some(12),
            failure_policy: Some(FailurePolicy::AbortToLanding),
            ..CliArgs::default()
        };

        let config = Config::discover_from(temp.path(), &cli).unwrap();

        assert_eq!(config.routine.command_timeout_secs, 12);
        assert_eq!(config.routine.failure_policy, FailurePolicy::AbortToLanding);
        assert_eq!(config.source_of("command_timeout_secs"), ConfigSource::Cli);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[routine]\naltitude = 40\n");

        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration file"));
    }

    #[test]
    fn test_platform_with_space_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[routine]\nplatform = \"AUAV sim\"\n");

        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::ValidationFailed { errors, .. }) => {
                assert!(errors.iter().any(|e| e.contains("platform 'AUAV sim'")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_missing_path() {
        let temp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };

        let err = Config::discover_from(temp.path(), &cli).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_endpoint_lookup() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"
[transport]
default_endpoint = "http://127.0.0.1:6000"

[transport.endpoints]
"camera-driver" = "http://127.0.0.1:6001"
"#,
        );

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();

        assert_eq!(config.endpoint_for("camera-driver"), "http://127.0.0.1:6001");
        assert_eq!(config.endpoint_for("flight-driver"), "http://127.0.0.1:6000");
    }
}
