//! Configuration, paths and logging bootstrap for the DevSpark auth tools.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, ProviderOverride, DEFAULT_LOG_LEVEL, DEFAULT_SITE_ORIGIN, DEFAULT_SUPABASE_ANON_KEY,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
