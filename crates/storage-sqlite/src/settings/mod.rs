//! SQLite storage for application settings.

pub mod model;
pub mod repository;

// Re-export for convenience
pub use model::AppSettingDB;
pub use repository::SettingsRepository;
