//! Logging setup for pgrotate
//!
//! ```rust,ignore
//! let _guard = pgrotate_log::init()?;
//! tracing::info!(secret_id = %id, "rotation started");
//! ```
//!
//! | Variable             | Effect                                  |
//! |----------------------|-----------------------------------------|
//! | `PGROTATE_LOG`       | filter directives, e.g. `info,sqlx=warn` |
//! | `RUST_LOG`           | fallback when `PGROTATE_LOG` is unset   |
//! | `PGROTATE_LOG_FORMAT`| `pretty`, `compact` or `json`           |
//! | `NO_COLOR`           | disables ANSI colours when set          |

#![forbid(unsafe_code)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, Format};
pub use error::{LogError, LogResult};

/// Initialize the global subscriber from the environment
pub fn init() -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(Config::from_env()).build()
}

/// Initialize the global subscriber with an explicit configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
