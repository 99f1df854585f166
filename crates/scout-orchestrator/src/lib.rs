pub mod config;
pub mod error;
pub mod merge;
pub mod paths;
pub mod prompts;
pub mod runtime;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use config::*;
pub use error::{OrchestratorError, Result};
pub use merge::*;
pub use paths::*;
pub use prompts::*;
pub use runtime::*;
pub use status::*;
pub use store::StateStore;
pub use supervisor::*;
pub use worker::*;
