//! CLI command handlers, one per file.

mod config;
mod get;
mod head;
mod md5;
mod put;

pub use config::run_config;
pub use get::run_get;
pub use head::run_head;
pub use md5::run_md5;
pub use put::run_put;
