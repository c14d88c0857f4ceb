//! Environment parsing for [`PortalConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    AdminBootstrap, HttpSettings, LogOutput, LogSettings, PortalConfig, SessionTtls,
    StorageConfig,
};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
const DEFAULT_IDLE_TTL_SECS: u64 = 1_800;
const DEFAULT_ADMIN_SESSION_TTL_SECS: u64 = 43_200;
const DEFAULT_ADMIN_IDLE_TTL_SECS: u64 = 1_800;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_COUNTRY_HEADER: &str = "cf-ipcountry";
const DEFAULT_LOG_LEVEL: &str = "info";

impl PortalConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// fails validation.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let bind_raw = env.get_or("GATEHOUSE_BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|_| {
            ConfigError::invalid("GATEHOUSE_BIND_ADDR", &bind_raw, "must be host:port")
        })?;

        let storage = parse_storage(&env)?;

        let admin = AdminBootstrap {
            username: non_empty(
                "GATEHOUSE_ADMIN_USERNAME",
                env.get_or("GATEHOUSE_ADMIN_USERNAME", DEFAULT_ADMIN_USERNAME),
            )?,
            password: match env.get("GATEHOUSE_ADMIN_PASSWORD") {
                Some(password) if password.is_empty() => {
                    return Err(ConfigError::invalid(
                        "GATEHOUSE_ADMIN_PASSWORD",
                        "<redacted>",
                        "must not be empty",
                    ));
                }
                other => other,
            },
        };

        let member_sessions = SessionTtls {
            absolute: positive_secs(&env, "GATEHOUSE_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
            idle: optional_secs(&env, "GATEHOUSE_IDLE_TTL_SECS", DEFAULT_IDLE_TTL_SECS)?,
        };
        let admin_sessions = SessionTtls {
            absolute: positive_secs(
                &env,
                "GATEHOUSE_ADMIN_SESSION_TTL_SECS",
                DEFAULT_ADMIN_SESSION_TTL_SECS,
            )?,
            idle: optional_secs(
                &env,
                "GATEHOUSE_ADMIN_IDLE_TTL_SECS",
                DEFAULT_ADMIN_IDLE_TTL_SECS,
            )?,
        };
        let sweep_interval = optional_secs(
            &env,
            "GATEHOUSE_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?;

        let http = HttpSettings {
            cookie_secure: flag(&env, "GATEHOUSE_COOKIE_SECURE")?,
            country_header: header_name(
                env.get_or("GATEHOUSE_COUNTRY_HEADER", DEFAULT_COUNTRY_HEADER),
            )?,
        };

        let logging = LogSettings {
            level: non_empty(
                "GATEHOUSE_LOG_LEVEL",
                env.get_or("GATEHOUSE_LOG_LEVEL", DEFAULT_LOG_LEVEL),
            )?,
            format: env
                .get("GATEHOUSE_LOG_FORMAT")
                .map(|raw| parse_log_output(&raw))
                .transpose()?,
        };

        Ok(Self {
            bind_addr,
            storage,
            admin,
            member_sessions,
            admin_sessions,
            sweep_interval,
            http,
            logging,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).map(|value| value.trim().to_string())
    }

    fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

fn parse_storage<F>(env: &Env<F>) -> ConfigResult<StorageConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = env.get_or("GATEHOUSE_STORAGE", "memory").to_ascii_lowercase();
    match kind.as_str() {
        "memory" => Ok(StorageConfig::Memory),
        "file" => Ok(StorageConfig::File {
            data_dir: PathBuf::from(env.get_or("GATEHOUSE_DATA_DIR", DEFAULT_DATA_DIR)),
        }),
        "postgres" => {
            let database_url = env
                .get("DATABASE_URL")
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingEnv {
                    name: "DATABASE_URL",
                })?;
            let parsed = Url::parse(&database_url).map_err(|_| {
                ConfigError::invalid("DATABASE_URL", "<redacted>", "must be a connection URL")
            })?;
            if !matches!(parsed.scheme(), "postgres" | "postgresql") {
                return Err(ConfigError::invalid(
                    "DATABASE_URL",
                    parsed.scheme(),
                    "must use the postgres scheme",
                ));
            }
            Ok(StorageConfig::Postgres { database_url })
        }
        _ => Err(ConfigError::invalid(
            "GATEHOUSE_STORAGE",
            &kind,
            "must be memory, file, or postgres",
        )),
    }
}

fn parse_secs<F>(env: &Env<F>, name: &'static str, default: u64) -> ConfigResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match env.get(name).filter(|value| !value.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::invalid(name, &raw, "must be a whole number of seconds")),
    }
}

fn positive_secs<F>(env: &Env<F>, name: &'static str, default: u64) -> ConfigResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_secs(env, name, default)? {
        0 => Err(ConfigError::invalid(name, "0", "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn optional_secs<F>(
    env: &Env<F>,
    name: &'static str,
    default: u64,
) -> ConfigResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(match parse_secs(env, name, default)? {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    })
}

fn flag<F>(env: &Env<F>, name: &'static str) -> ConfigResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env.get(name) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::invalid(name, &raw, "must be a boolean flag")),
    }
}

fn non_empty(name: &'static str, value: String) -> ConfigResult<String> {
    if value.is_empty() {
        Err(ConfigError::invalid(name, &value, "must not be empty"))
    } else {
        Ok(value)
    }
}

fn header_name(raw: String) -> ConfigResult<String> {
    let lowered = raw.to_ascii_lowercase();
    if lowered
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
    {
        Ok(lowered)
    } else {
        Err(ConfigError::invalid(
            "GATEHOUSE_COUNTRY_HEADER",
            &raw,
            "must be a valid header name",
        ))
    }
}

fn parse_log_output(raw: &str) -> ConfigResult<LogOutput> {
    match raw.to_ascii_lowercase().as_str() {
        "json" => Ok(LogOutput::Json),
        "pretty" => Ok(LogOutput::Pretty),
        _ => Err(ConfigError::invalid(
            "GATEHOUSE_LOG_FORMAT",
            raw,
            "must be json or pretty",
        )),
    }
}
