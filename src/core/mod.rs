//! Core business logic abstractions

pub mod alert;
pub mod cache;
pub mod config;
pub mod error;
pub mod football;
pub mod log;
pub mod portfolio;
pub mod quote;
pub mod scheduler;
pub mod weather;

// Re-export main types for cleaner imports
pub use error::{ConfigError, FetchError};
pub use football::FootballProvider;
pub use quote::{AssetClass, Quote, QuoteProvider};
pub use scheduler::{DashboardSnapshot, RefreshScheduler, Renderer, Tile};
pub use weather::{WeatherHistoryProvider, WeatherProvider};
