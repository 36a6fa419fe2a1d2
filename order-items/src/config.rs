use std::env;
use std::error;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "file::memory:?cache=shared";

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value {:?} for {}!", value, key)
            }
        }
    }
}

impl error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub pool_size: u32,
    pub reader_iterations: usize,
    pub busy_timeout_ms: u32,
    pub query_log: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            pool_size: 4,
            reader_iterations: 10,
            busy_timeout_ms: 5000,
            query_log: true,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Config::default();

        let pool_size = parse_or(&lookup, "STORE_POOL_SIZE", default.pool_size)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STORE_POOL_SIZE",
                value: pool_size.to_string(),
            });
        }

        Ok(Config {
            database_url: lookup("DATABASE_URL").unwrap_or(default.database_url),
            pool_size,
            reader_iterations: parse_or(
                &lookup,
                "STORE_READER_ITERATIONS",
                default.reader_iterations,
            )?,
            busy_timeout_ms: parse_or(&lookup, "STORE_BUSY_TIMEOUT_MS", default.busy_timeout_ms)?,
            query_log: match lookup("STORE_QUERY_LOG") {
                Some(v) => parse_flag("STORE_QUERY_LOG", v)?,
                None => default.query_log,
            },
        })
    }

    /// A private shared-cache in-memory database, visible to every
    /// connection of one pool but not to other pools.
    pub fn in_memory(name: &str) -> Config {
        Config {
            database_url: format!("file:{}?mode=memory&cache=shared", name),
            query_log: false,
            ..Config::default()
        }
    }

    pub fn is_shared_cache(&self) -> bool {
        self.database_url.contains("cache=shared")
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(v) => match v.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::InvalidValue { key, value: v }),
        },
        None => Ok(default),
    }
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
