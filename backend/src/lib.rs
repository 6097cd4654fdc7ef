pub mod config;
pub mod error;
pub mod inference;
pub mod routes;

pub use config::EngineConfig;
pub use error::{BackendError, EngineError};
pub use inference::aggregate::Verdict;
pub use inference::Engine;
