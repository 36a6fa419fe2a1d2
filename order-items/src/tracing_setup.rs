//! Logging setup. Result lines go to stdout through `println!`; everything
//! here goes to stderr.

use crate::config::Config;
use crate::db::SQL_LOG_TARGET;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub fn default_filter(config: &Config) -> String {
    if config.query_log {
        format!("info,{}=debug", SQL_LOG_TARGET)
    } else {
        "info".to_string()
    }
}

/// `RUST_LOG` wins over the configured defaults.
fn subscriber<W>(config: &Config, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .compact()
        .finish()
}

/// Calling this twice is harmless; the second subscriber is simply not installed.
pub fn init_tracing(config: &Config) {
    let _ = tracing::subscriber::set_global_default(subscriber(config, std::io::stderr));
}
