//! vuln-pkg - package manager for vulnerable training applications
//!
//! This is the main CLI entry point for vuln-pkg.

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vuln_pkg::config::{default_data_dir, Settings, DEFAULT_MANIFEST_URL};
use vuln_pkg::container::DockerCli;
use vuln_pkg::error::{ErrorCategory, Result, VulnPkgError};
use vuln_pkg::lab::{rebuildable, ApplicationRuntimeState, Orchestrator, StatusReport};
use vuln_pkg::manifest::{Fetcher, ManifestResolver, ResolvedManifest, TrustState, TrustStore};
use vuln_pkg::network::{DomainConfig, RoutingRule};
use vuln_pkg::prompt::TerminalPrompt;

/// vuln-pkg - vulnerable application package manager
#[derive(Parser)]
#[command(name = "vuln-pkg")]
#[command(version)]
#[command(about = "Install and run vulnerable applications for security labs", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Accept unknown manifests without prompting
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    /// Manifest source (http(s) URL, file:// URL or path)
    #[arg(long, global = true, default_value = DEFAULT_MANIFEST_URL)]
    manifest_url: String,

    /// Address application hostnames resolve to
    #[arg(long, global = true, default_value = "127.0.0.1")]
    resolve_address: IpAddr,

    /// Domain suffix for hostnames (default: <resolve-address>.sslip.io)
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Route applications over HTTPS
    #[arg(long, global = true)]
    https: bool,

    /// Directory for the trust store and build scratch space
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List applications in the manifest
    List,

    /// Search applications by name, description or tag
    Search {
        /// Search query
        query: String,
    },

    /// Pull or build an application's image
    Install {
        /// Application name
        app: String,
    },

    /// Start an application, installing it first if needed
    Run {
        /// Application name
        app: String,
    },

    /// Stop a running application
    Stop {
        /// Application name
        app: String,
    },

    /// Remove an application's container
    Remove {
        /// Application name
        app: String,
        /// Also remove the image
        #[arg(long)]
        purge: bool,
    },

    /// Rebuild a Dockerfile or git application
    Rebuild {
        /// Application name
        app: String,
    },

    /// Show the state of every application
    Status,

    /// Manage manifest trust
    #[command(subcommand)]
    Manifest(ManifestCommands),
}

#[derive(Subcommand)]
enum ManifestCommands {
    /// Show the current manifest
    Show,
    /// List accepted manifest sources
    Accepted,
    /// Forget an accepted manifest source
    Forget {
        /// Source URL (default: the current manifest URL)
        url: Option<String>,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            manifest_url: self.manifest_url.clone(),
            data_dir: self.data_dir.clone().unwrap_or_else(default_data_dir),
            auto_accept: self.yes,
            domain: DomainConfig {
                resolve_address: self.resolve_address,
                domain_suffix: self.domain.clone(),
                use_https: self.https,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Hint: {}", hint(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings();
    let fetcher = Fetcher::new().map_err(VulnPkgError::ManifestFetch)?;
    let trust = TrustStore::in_dir(&settings.data_dir)?;
    let mut resolver = ManifestResolver::new(
        fetcher.clone(),
        trust,
        DEFAULT_MANIFEST_URL,
        &settings.manifest_url,
    );

    // Commands that never touch the manifest contents or the engine
    match &cli.command {
        Commands::Manifest(ManifestCommands::Accepted) => {
            print_accepted(resolver.trust_store());
            return Ok(());
        }
        Commands::Manifest(ManifestCommands::Forget { url }) => {
            let target = url.as_deref().unwrap_or(resolver.active_source()).to_string();
            if resolver.forget(url.as_deref())? {
                println!("Forgot {}", target);
            } else {
                println!("{} was not trusted", target);
            }
            return Ok(());
        }
        _ => {}
    }

    let mut prompt = TerminalPrompt::stdio();
    let resolved = resolver
        .resolve_active(settings.auto_accept, &mut prompt)
        .await?;
    let manifest = &resolved.manifest;

    match cli.command {
        Commands::List => {
            println!(
                "{:<24} {:<10} {:<11} {:<14} TAGS",
                "NAME", "VERSION", "TYPE", "PORTS"
            );
            for app in &manifest.apps {
                println!(
                    "{:<24} {:<10} {:<11} {:<14} {}",
                    app.name,
                    app.version,
                    app.kind().to_string(),
                    join(&app.ports),
                    app.tags.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }
        }

        Commands::Search { query } => {
            let matches = manifest.search(&query);
            if matches.is_empty() {
                println!("No applications match '{}'", query);
            }
            for app in matches {
                println!(
                    "{:<24} {}",
                    app.name,
                    app.description.as_deref().unwrap_or("")
                );
            }
        }

        Commands::Manifest(ManifestCommands::Show) => print_manifest(&resolved),

        Commands::Install { app } => {
            let spec = manifest.find(&app)?;
            let lab = orchestrator(fetcher, settings).await?;
            let image = lab.install(spec).await?;
            println!("Installed {} ({})", app, image);
        }

        Commands::Run { app } => {
            manifest.find(&app)?;
            let lab = orchestrator(fetcher, settings).await?;
            let routes = lab.run(manifest, &app).await?;
            println!("{} is running", app);
            print_routes(&routes);
        }

        Commands::Stop { app } => {
            let spec = manifest.find(&app)?;
            let lab = orchestrator(fetcher, settings).await?;
            lab.stop(spec).await?;
            println!("{} stopped", app);
        }

        Commands::Remove { app, purge } => {
            let spec = manifest.find(&app)?;
            let lab = orchestrator(fetcher, settings).await?;
            lab.remove(spec, purge).await?;
            println!("{} removed", app);
        }

        Commands::Rebuild { app } => {
            rebuildable(manifest.find(&app)?)?;
            let lab = orchestrator(fetcher, settings).await?;
            let image = lab.rebuild(manifest, &app).await?;
            println!("Rebuilt {} ({})", app, image);
        }

        Commands::Status => {
            let lab = orchestrator(fetcher, settings).await?;
            let report = lab.status(manifest).await?;
            print_status(&report);
        }

        Commands::Manifest(_) => {}
    }

    Ok(())
}

async fn orchestrator(fetcher: Fetcher, settings: Settings) -> Result<Orchestrator<DockerCli>> {
    let engine = DockerCli::connect().await?;
    Ok(Orchestrator::new(engine, fetcher, settings))
}

fn hint(error: &VulnPkgError) -> &'static str {
    match error.category() {
        ErrorCategory::Network => "check network access to the manifest, image or repository source",
        ErrorCategory::Engine => "check that Docker is installed, running and reachable by this user",
        ErrorCategory::Configuration => "check the manifest contents and command-line flags",
        ErrorCategory::Operator => "re-run and accept the manifest, or pass -y to accept it",
    }
}

fn join(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn print_routes(routes: &[RoutingRule]) {
    for route in routes {
        println!("  {} -> port {}", route.url(), route.target_port);
    }
}

fn print_manifest(resolved: &ResolvedManifest) {
    let meta = &resolved.manifest.meta;
    let trust = match resolved.trust {
        TrustState::BuiltIn => "built-in",
        TrustState::Known => "accepted",
        TrustState::Accepted => "accepted now",
    };

    println!("URL:          {}", resolved.source_url);
    println!("Fingerprint:  {}", resolved.fingerprint);
    println!("Trust:        {}", trust);
    if let Some(author) = &meta.author {
        println!("Author:       {}", author);
    }
    if let Some(email) = &meta.email {
        println!("Email:        {}", email);
    }
    if let Some(url) = &meta.url {
        println!("Website:      {}", url);
    }
    if let Some(description) = &meta.description {
        println!("About:        {}", description);
    }
    println!("Applications: {}", resolved.manifest.apps.len());
    for app in &resolved.manifest.apps {
        println!("  - {} ({}, {})", app.name, app.kind(), app.version);
    }
    println!();
    println!("{}", resolved.raw.trim_end());
}

fn print_accepted(store: &TrustStore) {
    let mut any = false;
    for record in store.records() {
        any = true;
        println!(
            "{}  {}  {}",
            record.accepted_at.format("%Y-%m-%d %H:%M"),
            record.content_fingerprint,
            record.source_url
        );
    }
    if !any {
        println!("No accepted manifests");
    }
}

fn print_status(report: &StatusReport) {
    println!("{:<24} {:<14} URLS", "NAME", "STATE");
    for app in &report.apps {
        match &app.state {
            Ok(state) => {
                let urls = if *state == ApplicationRuntimeState::Running {
                    app.routes
                        .iter()
                        .map(RoutingRule::url)
                        .collect::<Vec<_>>()
                        .join(" ")
                } else {
                    String::new()
                };
                println!("{:<24} {:<14} {}", app.name, state.to_string(), urls);
            }
            Err(e) => println!("{:<24} {:<14} {}", app.name, "error", e),
        }
    }

    match &report.proxy {
        Some(proxy) => println!("\nProxy: {}", proxy.status),
        None => println!("\nProxy: not created"),
    }

    if !report.orphans.is_empty() {
        println!("\nOrphaned containers (not in the current manifest):");
        for container in &report.orphans {
            println!("  {} ({}, {})", container.name, container.image, container.status);
        }
    }
}
