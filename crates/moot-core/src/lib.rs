pub mod config;
pub mod error;
pub mod event;
pub mod state;
pub mod step;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{MootError, Result};
pub use event::EventBus;
pub use state::*;
pub use step::StepId;
pub use types::*;
