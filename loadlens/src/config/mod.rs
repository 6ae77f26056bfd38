//! Configuration loading, schema and validation.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions, default_config_path};
pub use schema::{DEFAULT_TRIAL_TIMEOUT_MS, DriverConfig, LoadLensConfig, ScenarioConfig};
pub use validation::{ValidationResult, Validator};
