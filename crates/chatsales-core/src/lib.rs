pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use crate::config::*;
pub use error::*;
pub use traits::InferenceCollaborator;
pub use types::*;
