// src/config/mod.rs
pub mod app;

pub use app::{AppConfig, DEFAULT_APP_CONFIG_PATH, ENV_APP_CONFIG_PATH};
