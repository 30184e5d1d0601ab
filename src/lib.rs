pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod generator;
pub mod store;

pub use error::{EngineError, EngineResult};
