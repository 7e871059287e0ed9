use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use persistence_bridge::domain::ports::{Module, ModuleSource};
use persistence_bridge::utils::{logger, validation::Validate};
use persistence_bridge::{
    discover_modules, ExtenderConfig, LoggingFactory, ModuleId, ModuleRegistry,
    PersistenceTracker, TrackingState,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "persistence-bridge")]
#[command(about = "Discovers persistence units declared by modules on disk")]
struct Args {
    /// Directory holding one sub-directory per module (each with a module.toml)
    #[arg(short, long)]
    modules: PathBuf,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ModuleSummary {
    id: ModuleId,
    name: String,
    state: String,
    tracked_at: Option<DateTime<Utc>>,
    instances: usize,
    units: Vec<UnitSummary>,
}

#[derive(Debug, Serialize)]
struct UnitSummary {
    name: String,
    location: Option<String>,
    provider: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ExtenderConfig::from_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => ExtenderConfig::default(),
    };

    // 初始化日誌
    logger::init_logger(args.verbose, &config.logging);

    tracing::info!("🚀 Starting persistence-bridge");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    config.validate().context("Configuration validation failed")?;

    let modules = discover_modules(&args.modules).with_context(|| {
        format!("Failed to discover modules in '{}'", args.modules.display())
    })?;
    tracing::info!("📁 Found {} module(s) in {}", modules.len(), args.modules.display());

    let registry = Arc::new(ModuleRegistry::new());
    for module in modules {
        tracing::debug!("Installing module {} from {}", module.name(), module.root().display());
        registry.install(Arc::new(module));
    }

    let location_property = config.discovery.location_property.clone();
    let factory = Arc::new(LoggingFactory::new(location_property.as_str()));
    let tracker = Arc::new(PersistenceTracker::new(config, factory.clone()));
    tracker
        .open(registry.clone())
        .context("Failed to open persistence tracker")?;

    let summaries = summarize(&tracker, &registry, &location_property);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_summary(&summaries);
    }

    // 卸載所有模組，觸發釋放流程
    for id in registry.module_ids() {
        registry.uninstall(id);
    }
    tracker.close();

    tracing::info!(
        "✅ Done, {} instance(s) still alive",
        factory.live_instances()
    );
    Ok(())
}

fn summarize(
    tracker: &PersistenceTracker,
    registry: &ModuleRegistry,
    location_property: &str,
) -> Vec<ModuleSummary> {
    registry
        .active_modules()
        .into_iter()
        .map(|module| {
            let state = tracker.state(module.id());
            let persistent = tracker.persistent_module(module.id());
            let units = persistent
                .as_ref()
                .map(|p| {
                    p.sorted_units(location_property)
                        .into_iter()
                        .map(|unit| UnitSummary {
                            name: unit.name.clone(),
                            location: unit.property(location_property).map(str::to_string),
                            provider: unit.provider.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            ModuleSummary {
                id: module.id(),
                name: module.name().to_string(),
                state: state_label(state).to_string(),
                tracked_at: persistent.as_ref().map(|p| p.tracked_at()),
                instances: persistent.as_ref().map_or(0, |p| p.instance_count()),
                units,
            }
        })
        .collect()
}

fn state_label(state: TrackingState) -> &'static str {
    match state {
        TrackingState::Unobserved => "unobserved",
        TrackingState::Resolving => "resolving",
        TrackingState::Tracked => "tracked",
        TrackingState::Ignored => "ignored",
    }
}

fn print_summary(summaries: &[ModuleSummary]) {
    println!("📋 Module summary:");
    for summary in summaries {
        println!("  [{}] {} ({})", summary.id, summary.name, summary.state);
        if let Some(tracked_at) = summary.tracked_at {
            println!(
                "      tracked at {}, {} instance(s)",
                tracked_at.to_rfc3339(),
                summary.instances
            );
        }
        for unit in &summary.units {
            println!(
                "      - {} @ {}{}",
                unit.name,
                unit.location.as_deref().unwrap_or("?"),
                unit.provider
                    .as_deref()
                    .map(|p| format!(" (provider: {})", p))
                    .unwrap_or_default()
            );
        }
    }
}
