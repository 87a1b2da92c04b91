//! Terminal trust prompt

use crate::error::Result;
use crate::manifest::{ManifestSummary, TrustDecision, TrustPrompt};
use std::io::{BufRead, Write};

/// Asks on stdout and reads the answer from stdin
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn banner(&mut self, summary: &ManifestSummary) -> std::io::Result<()> {
        let out = &mut self.output;
        let rule = "=".repeat(60);
        let unknown = "(not given)";

        writeln!(out)?;
        writeln!(out, "{}", rule)?;
        if let Some(previous) = &summary.previous {
            writeln!(out, "MANIFEST CHANGED")?;
            writeln!(
                out,
                "Accepted on {} with fingerprint {}",
                previous.accepted_at.format("%Y-%m-%d %H:%M UTC"),
                previous.content_fingerprint
            )?;
        } else {
            writeln!(out, "NEW MANIFEST")?;
        }
        writeln!(out, "{}", rule)?;
        writeln!(out, "URL:         {}", summary.source_url)?;
        writeln!(out, "Fingerprint: {}", summary.fingerprint)?;
        writeln!(out, "Author:      {}", summary.meta.author.as_deref().unwrap_or(unknown))?;
        writeln!(out, "Email:       {}", summary.meta.email.as_deref().unwrap_or(unknown))?;
        writeln!(out, "Website:     {}", summary.meta.url.as_deref().unwrap_or(unknown))?;
        if let Some(description) = &summary.meta.description {
            writeln!(out, "About:       {}", description)?;
        }
        writeln!(out)?;
        writeln!(out, "Applications ({}):", summary.app_names.len())?;
        for name in &summary.app_names {
            writeln!(out, "  - {}", name)?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "Only accept manifests from sources you trust; they decide what runs on this host."
        )?;
        write!(out, "Accept this manifest? [y/N/show]: ")?;
        out.flush()
    }
}

impl<R: BufRead, W: Write> TrustPrompt for TerminalPrompt<R, W> {
    fn ask(&mut self, summary: &ManifestSummary) -> Result<TrustDecision> {
        self.banner(summary)?;

        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Ok(TrustDecision::Reject);
        }
        Ok(parse_answer(&answer))
    }

    fn show(&mut self, raw: &str) -> Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", raw.trim_end())?;
        Ok(())
    }
}

/// Interpret an answer; anything unrecognised rejects
pub fn parse_answer(answer: &str) -> TrustDecision {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => TrustDecision::Accept,
        "s" | "show" => TrustDecision::Show,
        _ => TrustDecision::Reject,
    }
}
