//! Configuration management
//!
//! Two files are involved:
//! - `vista-setup.toml` in the project root: optional installer settings
//! - `.vista/config.json` in the project root: the persisted record read by
//!   the served-content application

pub mod media;
pub mod paths;
pub mod settings;
pub mod store;

pub use media::{MediaRoot, resolve_media_root};
pub use settings::SetupSettings;
pub use store::{ConfigStore, PersistedConfig};
