//! # sagemcom-core
//!
//! Core types and utilities for managing port forwards on Sagemcom routers.
//!
//! This crate provides the error taxonomy, HTTP client settings, router
//! configuration, credential sources and the port-forward domain model shared
//! by the router client and the command surfaces built on top of it.
//!
//! ## Modules
//!
//! - [`error`] - Error kinds reported by every router operation
//! - [`address`] - Local address shorthand resolution against a LAN subnet
//! - [`types`] - Port-forward rules and protocols
//! - [`config`] - Router connection configuration
//! - [`client`] - HTTP timeout and retry settings
//! - [`credentials`] - Router password sources

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod address;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use address::{resolve, SubnetPrefix};
pub use error::{Error, OperationContext, Result};
pub use types::{PortForwardRule, Protocol};
