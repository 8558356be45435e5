pub mod config;
pub mod core;
pub mod error;
pub mod feasibility;
pub mod log;
pub mod orchestration;
pub mod registry;
pub mod render;
pub mod util;
pub mod workflow;

pub use error::{Error, Result};
