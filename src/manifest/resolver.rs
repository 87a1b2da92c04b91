//! Manifest resolution
//!
//! Fetch, parse, validate, then decide whether the source is trusted. The
//! operator interaction is a [`TrustPrompt`] so the same path serves the
//! terminal, `-y` scripting and tests.

use super::config::{Manifest, ManifestMeta};
use super::fetch::Fetcher;
use super::parser::ManifestParser;
use super::trust::{fingerprint, TrustRecord, TrustStore};
use crate::error::{Result, VulnPkgError};

/// What the operator sees before deciding on an unknown manifest
#[derive(Debug, Clone)]
pub struct ManifestSummary {
    pub source_url: String,
    pub fingerprint: String,
    pub meta: ManifestMeta,
    pub app_names: Vec<String>,
    /// Set when the URL was accepted before with different content
    pub previous: Option<TrustRecord>,
}

/// Operator answer to a trust prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    Accept,
    Reject,
    /// Display the raw manifest, then ask again
    Show,
}

/// Capability that asks the operator about an unknown manifest
pub trait TrustPrompt {
    fn ask(&mut self, summary: &ManifestSummary) -> Result<TrustDecision>;

    fn show(&mut self, raw: &str) -> Result<()>;
}

/// How a manifest came to be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    /// The built-in source, never prompted
    BuiltIn,
    /// Matched an existing record
    Known,
    /// Accepted during this resolution
    Accepted,
}

/// A validated, trusted manifest
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub source_url: String,
    pub fingerprint: String,
    pub trust: TrustState,
    pub manifest: Manifest,
    /// Manifest text as fetched
    pub raw: String,
}

/// Manifest resolver
pub struct ManifestResolver {
    fetcher: Fetcher,
    trust: TrustStore,
    default_source: String,
    active_source: String,
}

impl ManifestResolver {
    pub fn new(
        fetcher: Fetcher,
        trust: TrustStore,
        default_source: &str,
        active_source: &str,
    ) -> Self {
        Self {
            fetcher,
            trust,
            default_source: default_source.to_string(),
            active_source: active_source.to_string(),
        }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    pub fn active_source(&self) -> &str {
        &self.active_source
    }

    pub fn is_default(&self, source: &str) -> bool {
        source == self.default_source
    }

    /// Resolve the configured manifest source
    pub async fn resolve_active(
        &mut self,
        auto_accept: bool,
        prompt: &mut dyn TrustPrompt,
    ) -> Result<ResolvedManifest> {
        let source = self.active_source.clone();
        self.resolve(&source, auto_accept, prompt).await
    }

    /// Fetch, validate and trust-check `source`
    pub async fn resolve(
        &mut self,
        source: &str,
        auto_accept: bool,
        prompt: &mut dyn TrustPrompt,
    ) -> Result<ResolvedManifest> {
        tracing::info!("Resolving manifest {}", source);

        let raw = self
            .fetcher
            .fetch(source)
            .await
            .map_err(VulnPkgError::ManifestFetch)?;
        let manifest = ManifestParser::load(&raw)?;
        let fingerprint = fingerprint(&raw);

        let trust = if self.is_default(source) {
            TrustState::BuiltIn
        } else if self.trust.is_trusted(source, &fingerprint) {
            TrustState::Known
        } else if auto_accept {
            tracing::info!("Auto-accepting manifest {}", source);
            self.trust.accept(source, &fingerprint)?;
            TrustState::Accepted
        } else {
            let summary = ManifestSummary {
                source_url: source.to_string(),
                fingerprint: fingerprint.clone(),
                meta: manifest.meta.clone(),
                app_names: manifest.app_names().into_iter().map(str::to_string).collect(),
                previous: self.trust.lookup(source).cloned(),
            };
            self.ask_operator(&summary, &raw, prompt)?;
            TrustState::Accepted
        };

        Ok(ResolvedManifest {
            source_url: source.to_string(),
            fingerprint,
            trust,
            manifest,
            raw: String::from_utf8_lossy(&raw).into_owned(),
        })
    }

    fn ask_operator(
        &mut self,
        summary: &ManifestSummary,
        raw: &[u8],
        prompt: &mut dyn TrustPrompt,
    ) -> Result<()> {
        loop {
            match prompt.ask(summary)? {
                TrustDecision::Accept => {
                    self.trust.accept(&summary.source_url, &summary.fingerprint)?;
                    return Ok(());
                }
                TrustDecision::Reject => {
                    tracing::warn!("Manifest {} rejected by operator", summary.source_url);
                    return Err(VulnPkgError::ManifestRejected(summary.source_url.clone()));
                }
                TrustDecision::Show => prompt.show(&String::from_utf8_lossy(raw))?,
            }
        }
    }

    /// Forget trust for `url`, or for the active source when `None`
    pub fn forget(&mut self, url: Option<&str>) -> Result<bool> {
        let target = url.unwrap_or(&self.active_source).to_string();
        self.trust.forget(&target)
    }
}
