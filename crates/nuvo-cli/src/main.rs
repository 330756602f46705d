//! Nuvo - package feed explorer
//!
//! Usage:
//!   nuvo sources                 # List configured sources
//!   nuvo resources               # Show what a source offers
//!   nuvo versions <id>           # List versions of a package
//!   nuvo show <id> [version]     # Show one version's metadata

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nuvo_core::config::{ConfigStore, NuvoConfig};
use nuvo_core::registration::{CatalogEntry, RegistrationIndex, RegistrationResource};
use nuvo_core::resource::{PackageSource, ServiceIndexResource, SourceRepository};
use nuvo_core::version::NuGetVersion;

#[derive(Parser)]
#[command(name = "nuvo")]
#[command(about = "Package feed explorer", long_about = None)]
struct Cli {
    /// Path to nuvo.toml (defaults to the user configuration directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured package sources
    Sources {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the resources a source provides
    Resources(SourceArgs),

    /// List the versions of a package
    Versions {
        /// Package id
        id: String,

        /// Include unlisted versions
        #[arg(long)]
        include_unlisted: bool,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show metadata of a package version
    Show {
        /// Package id
        id: String,

        /// Version to show (latest listed if omitted)
        version: Option<String>,

        /// Consider pre-release versions when picking the latest
        #[arg(long)]
        prerelease: bool,

        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Source name or service index URL (defaults to the first enabled source)
    #[arg(long, short)]
    source: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nuvo=info,nuvo_core=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    run_cli(cli.command, &config, &cancel).await
}

fn load_config(path: Option<PathBuf>) -> Result<NuvoConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    let config = store
        .load()
        .with_context(|| format!("Failed to load {}", store.config_path().display()))?;
    config.validate()?;
    Ok(config)
}

async fn run_cli(command: Commands, config: &NuvoConfig, cancel: &CancellationToken) -> Result<()> {
    match command {
        Commands::Sources { format } => print_sources(config, format),
        Commands::Resources(args) => {
            let repository = open_source(config, args.source.as_deref())?;
            run_resources(&repository, args.format, cancel).await
        }
        Commands::Versions {
            id,
            include_unlisted,
            source,
        } => {
            let repository = open_source(config, source.source.as_deref())?;
            let index = load_index(&repository, &id, cancel).await?;
            print_versions(&index, include_unlisted, source.format)
        }
        Commands::Show {
            id,
            version,
            prerelease,
            source,
        } => {
            let version = version.as_deref().map(parse_version).transpose()?;
            let repository = open_source(config, source.source.as_deref())?;
            let index = load_index(&repository, &id, cancel).await?;

            let entry = match &version {
                Some(version) => index
                    .find(version)
                    .with_context(|| format!("{} {} not found", id, version))?,
                None => index
                    .latest(prerelease)
                    .with_context(|| format!("{} has no listed versions", id))?,
            };
            print_entry(entry, source.format)
        }
    }
}

fn open_source(config: &NuvoConfig, requested: Option<&str>) -> Result<SourceRepository> {
    let source: PackageSource = match requested {
        Some(name_or_url) => config
            .find_source(name_or_url)
            .with_context(|| format!("Unknown source '{}'", name_or_url))?,
        None => config
            .enabled_sources()
            .into_iter()
            .next()
            .context("No enabled sources configured")?,
    };
    tracing::debug!("Using source {} ({})", source.name, source.url);
    Ok(SourceRepository::new(source, config.http.clone()))
}

async fn load_index(
    repository: &SourceRepository,
    id: &str,
    cancel: &CancellationToken,
) -> Result<RegistrationIndex> {
    let index = nuvo_core::registration::get_registration_index(repository, id, cancel)
        .await?
        .with_context(|| {
            format!(
                "Package '{}' not found on {}",
                id,
                repository.package_source().name
            )
        })?;

    for gap in index.gaps() {
        eprintln!(
            "{} versions {}..{} unavailable: {}",
            style("warning:").yellow().bold(),
            gap.lower.as_ref().map(ToString::to_string).unwrap_or_default(),
            gap.upper.as_ref().map(ToString::to_string).unwrap_or_default(),
            gap.reason
        );
    }
    Ok(index)
}

// =============================================================================
// Commands
// =============================================================================

fn print_sources(config: &NuvoConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if config.sources.is_empty() {
                println!("No sources configured.");
                return Ok(());
            }
            println!("{:<20} {:<8} URL", "Name", "Enabled");
            println!("{}", "-".repeat(70));
            for (name, entry) in &config.sources {
                let enabled = if entry.enabled { "yes" } else { "no" };
                println!("{:<20} {:<8} {}", truncate(name, 20), enabled, entry.url);
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = config
                .sources
                .iter()
                .map(|(name, entry)| {
                    serde_json::json!({
                        "name": name,
                        "url": entry.url,
                        "enabled": entry.enabled,
                        "authenticated": entry.username.is_some(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn run_resources(
    repository: &SourceRepository,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let index = repository
        .get_resource::<ServiceIndexResource>(cancel)
        .await?
        .with_context(|| {
            format!(
                "{} does not expose a service index",
                repository.package_source().url
            )
        })?;
    let registrations = repository
        .get_resource::<RegistrationResource>(cancel)
        .await?;

    let templates: Vec<&str> = registrations
        .as_deref()
        .map(|r| r.templates().iter().map(|t| t.as_str()).collect())
        .unwrap_or_default();

    match format {
        OutputFormat::Table => {
            println!(
                "{} {} (service index {})",
                style("Source").bold(),
                repository.package_source().name,
                index.version()
            );
            println!();
            println!("{:<40} Endpoints", "Service type");
            println!("{}", "-".repeat(80));
            for service_type in index.service_types() {
                for (i, endpoint) in index.lookup(service_type).iter().enumerate() {
                    let label = if i == 0 { service_type } else { "" };
                    println!("{:<40} {}", truncate(label, 40), endpoint);
                }
            }
            println!();
            if templates.is_empty() {
                println!("Registrations: {}", style("not available").red());
            } else {
                println!("Registrations:");
                for template in &templates {
                    println!("  {}", template);
                }
            }
            println!();
            println!(
                "Resolved: {}",
                repository.cached_capabilities().join(", ")
            );
            println!("Providers: {}", repository.providers().provider_names().join(", "));
        }
        OutputFormat::Json => {
            let services: serde_json::Map<String, serde_json::Value> = index
                .service_types()
                .into_iter()
                .map(|t| (t.to_string(), serde_json::json!(index.lookup(t))))
                .collect();
            let output = serde_json::json!({
                "source": repository.package_source().name,
                "url": index.url(),
                "version": index.version(),
                "services": services,
                "registrationTemplates": templates,
                "resolved": repository.cached_capabilities(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_versions(index: &RegistrationIndex, include_unlisted: bool, format: OutputFormat) -> Result<()> {
    let entries: Vec<&CatalogEntry> = index
        .entries()
        .iter()
        .filter(|entry| include_unlisted || entry.is_listed())
        .collect();

    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No versions of {} found.", index.package_id());
                return Ok(());
            }
            println!("{:<28} {:<12} Published", "Version", "Listed");
            println!("{}", "-".repeat(60));
            for entry in &entries {
                let listed = if entry.is_listed() { "yes" } else { "no" };
                let published = entry
                    .published
                    .map(|p| p.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<28} {:<12} {}",
                    truncate(&entry.version.to_string(), 28),
                    listed,
                    published
                );
            }
            if !index.is_complete() {
                println!();
                println!(
                    "{} {} page(s) could not be loaded",
                    style("incomplete:").yellow(),
                    index.gaps().len()
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "id": index.package_id(),
                "versions": entries.iter().map(|e| e.version.to_string()).collect::<Vec<_>>(),
                "complete": index.is_complete(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_entry(entry: &CatalogEntry, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{} {}", style(&entry.id).bold(), style(&entry.version).green());
            if !entry.is_listed() {
                println!("{}", style("(unlisted)").dim());
            }
            if let Some(description) = &entry.description {
                println!();
                println!("{}", description);
                println!();
            }
            if !entry.authors.is_empty() {
                println!("Authors:   {}", entry.authors.join(", "));
            }
            if let Some(published) = entry.published {
                println!("Published: {}", published.format("%Y-%m-%d %H:%M UTC"));
            }
            if let Some(project_url) = &entry.project_url {
                println!("Project:   {}", project_url);
            }
            if !entry.tags.is_empty() {
                println!("Tags:      {}", entry.tags.join(" "));
            }
            if let Some(content) = &entry.package_content {
                println!("Download:  {}", content);
            }
            if !entry.dependency_groups.is_empty() {
                println!("Dependencies:");
                for group in &entry.dependency_groups {
                    println!("  {}", group.target_framework.as_deref().unwrap_or("(any)"));
                    if group.dependencies.is_empty() {
                        println!("    (none)");
                    }
                    for dependency in &group.dependencies {
                        println!(
                            "    {} {}",
                            dependency.id,
                            dependency.range.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(entry)?);
        }
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_version(input: &str) -> Result<NuGetVersion> {
    NuGetVersion::parse(input).with_context(|| format!("Invalid version '{}'", input))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
