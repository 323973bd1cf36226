//! Wiring for a crawl run: building the crawler and handling interrupts.

pub mod builder;
pub mod shutdown;

pub use builder::build_crawler;
pub use shutdown::setup_shutdown_handler;
