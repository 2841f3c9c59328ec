pub mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod session;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
