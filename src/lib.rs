pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod process;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use controller::PipelineController;
pub use error::{ControlError, ControlResult};
pub use router::create_router;
pub use state::ServerState;
