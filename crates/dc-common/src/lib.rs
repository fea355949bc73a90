//! # dc-common
//!
//! Shared configuration and error types for the DoorCam ingest service.

pub mod config;
pub mod error;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
