pub mod common;

pub use common::db_env::{DbEnvError, get_database_url, get_db_pool, get_pool_max_size};
pub use common::logging::setup_logging;
