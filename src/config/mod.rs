pub mod loader;
pub mod types;

pub use loader::{load_settings, storage_dir, Overrides};
pub use types::{default_scopes, AuthSettings, FileConfig};
