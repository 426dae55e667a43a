pub mod loader;
pub mod types;

pub use loader::{load_config, resolve_state_path};
pub use types::AppConfig;
