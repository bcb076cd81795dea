pub mod service;
pub mod settings;
pub mod validation;

pub use service::ConfigService;
pub use settings::Settings;
pub use validation::ConfigError;
