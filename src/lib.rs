//! # modelpub
//!
//! Converts a locally authored 3D model, packages it and publishes it to a
//! remote fileserver while keeping the shared asset catalog (`index.json`)
//! up to date.

pub mod config;
pub mod convert;
pub mod display;
pub mod error;
pub mod fileserver;
pub mod package;
pub mod publish;
pub mod scene;

pub use error::{PublishError, Result};
