//! Core module - shared infrastructure for Parley
//!
//! This module contains the conversation data model, configuration, and
//! error handling used throughout the application.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, Credentials, Permission, ProviderKind};
pub use error::{ParleyError, Result};
pub use types::*;
