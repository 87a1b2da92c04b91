//! Manifest model, trust store and resolution
//!
//! A manifest lists the vulnerable applications that can be installed. This
//! module turns raw YAML from a file or URL into a validated [`Manifest`],
//! gated by trust-on-first-use for anything but the built-in source.

pub mod config;
pub mod fetch;
pub mod parser;
pub mod resolver;
pub mod trust;

pub use config::{AppSpec, DockerfileSource, Manifest, ManifestMeta, PackageSource, SourceKind};
pub use fetch::{FetchError, Fetcher};
pub use parser::{ManifestParser, ValidationIssue};
pub use resolver::{
    ManifestResolver, ManifestSummary, ResolvedManifest, TrustDecision, TrustPrompt, TrustState,
};
pub use trust::{TrustRecord, TrustStore};
