//! vuln-pkg - a package manager for vulnerable training applications
//!
//! vuln-pkg installs and runs deliberately vulnerable applications for
//! security labs. It provides:
//!
//! - Manifest parsing and validation
//! - Trust-on-first-use for third-party manifests
//! - Image builds from inline, remote and git Dockerfiles
//! - Hostname routing through a Traefik reverse proxy
//! - Application lifecycle and status against the Docker engine

pub mod config;
pub mod container;
pub mod error;
pub mod image;
pub mod lab;
pub mod manifest;
pub mod network;
pub mod prompt;

pub use error::{Result, VulnPkgError};
