//! 应用配置加载
//!
//! 默认值 < 配置文件(TOML) < 环境变量（前缀 `ORCHESTRATOR__`，
//! 层级用双下划线，如 `ORCHESTRATOR__SERVER__PORT=8080`）。

use config::{Config, Environment, File};
use serde::Deserialize;

use orchestrator_errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// tick间隔（秒）
    pub tick_interval_secs: u64,
    pub lock_ttl_secs: u64,
    pub callback_timeout_secs: u64,
    pub max_transient_retries: i32,
    pub retry_backoff_base_secs: u64,
    /// 缺省用主机名加随机后缀
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// 不配置则使用进程内锁（仅单实例部署）
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" 或 "pretty"
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: Option<&str>) -> OrchestratorResult<AppConfig> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")
            .map_err(cfg_err)?
            .set_default("server.port", 8080)
            .map_err(cfg_err)?
            .set_default("scheduler.tick_interval_secs", 30)
            .map_err(cfg_err)?
            .set_default("scheduler.lock_ttl_secs", 60)
            .map_err(cfg_err)?
            .set_default("scheduler.callback_timeout_secs", 7200)
            .map_err(cfg_err)?
            .set_default("scheduler.max_transient_retries", 3)
            .map_err(cfg_err)?
            .set_default("scheduler.retry_backoff_base_secs", 30)
            .map_err(cfg_err)?
            .set_default("redis.url", None::<String>)
            .map_err(cfg_err)?
            .set_default("scheduler.instance_id", None::<String>)
            .map_err(cfg_err)?
            .set_default("logging.level", "info")
            .map_err(cfg_err)?
            .set_default("logging.format", "pretty")
            .map_err(cfg_err)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("ORCHESTRATOR").separator("__"))
            .build()
            .map_err(cfg_err)?;

        settings.try_deserialize::<AppConfig>().map_err(cfg_err)
    }
}

fn cfg_err(e: config::ConfigError) -> OrchestratorError {
    OrchestratorError::config_error(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = ConfigLoader::load(None).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.scheduler.tick_interval_secs, 30);
        assert!(cfg.redis.url.is_none());
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[scheduler]
tick_interval_secs = 5

[redis]
url = "redis://127.0.0.1:6379"
"#
        )
        .unwrap();

        let cfg = ConfigLoader::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.scheduler.tick_interval_secs, 5);
        assert_eq!(cfg.redis.url.as_deref(), Some("redis://127.0.0.1:6379"));
        // 未覆盖的保持默认
        assert_eq!(cfg.scheduler.max_transient_retries, 3);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        assert!(ConfigLoader::load(Some("/nonexistent/orchestrator.toml")).is_err());
    }
}
