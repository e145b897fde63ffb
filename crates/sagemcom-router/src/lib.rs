//! Port-forward management for Sagemcom routers.
//!
//! Speaks the router's REST dialect and layers session handling and rule
//! management on top of it. Command surfaces bind to [`PortForwardService`].

#![deny(missing_docs)]

pub mod launcher;
pub mod models;
pub mod rules;
pub mod service;
pub mod session;
pub mod transport;

pub use launcher::{AdminLauncher, SystemBrowser};
pub use models::{RouterId, RuleBody, RuleEntry};
pub use rules::RuleRepository;
pub use service::PortForwardService;
pub use session::{Session, SessionManager, SessionState};
pub use transport::{
    HttpTransport, HttpTransportBuilder, Reply, ResponseClass, RouterRequest, Transport,
};

/// Convenient result alias that reuses the shared router error type.
pub type Result<T> = sagemcom_core::Result<T>;
