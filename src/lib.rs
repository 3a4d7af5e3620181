pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod db;
pub mod driver;
pub mod favorites;
pub mod fallback;
pub mod features;
pub mod loader;
pub mod matcher;
pub mod normalize;
pub mod resolver;
pub mod source;

/// Application name for XDG paths
pub const APP_NAME: &str = "media-etl";
