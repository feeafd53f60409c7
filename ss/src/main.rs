//! ShellSync CLI entry point

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use shellsync::cli::{Cli, Command, OutputFormat, get_log_path};
use shellsync::config::Config;
use shellsync::{
    BusRegistry, EventKind, FileStore, InMemoryBus, MemoryStore, Node, ParseResult, ShellEvent, StateStore,
    SyncMetrics, TenantSettings, TenantState, codec,
};

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to the log file, not stdout/stderr; stdout carries command output
    let level = match log_level {
        Some(level) => level
            .parse::<tracing::Level>()
            .map_err(|e| eyre::eyre!("Invalid log level '{}': {}", level, e))?,
        None => tracing::Level::INFO,
    };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        "ShellSync loaded config: channel={}, control-tenant={}",
        config.sync.channel, config.sync.control_tenant
    );

    match cli.command {
        Command::Encode { tenant, kind, payload } => cmd_encode(&tenant, kind, payload.as_deref()),
        Command::Decode { raw, format } => cmd_decode(&raw, &format),
        Command::Simulate {
            nodes,
            tenants,
            memory,
            format,
        } => cmd_simulate(&config, nodes, tenants, memory, &format).await,
    }
}

fn cmd_encode(tenant: &str, kind: EventKind, payload: Option<&Path>) -> Result<()> {
    let event = match (kind, payload) {
        (EventKind::Initialize, Some(path)) => {
            warn!(?path, "Initialize events carry no payload, ignoring");
            ShellEvent::initialize(tenant)
        }
        (EventKind::Initialize, None) => ShellEvent::initialize(tenant),
        (EventKind::Reload, None) => ShellEvent::reload(tenant),
        (EventKind::Reload, Some(path)) => {
            let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
            let settings: TenantSettings =
                serde_json::from_str(&content).context(format!("Failed to parse settings from {}", path.display()))?;
            ShellEvent::reload_with(settings)
        }
    };

    let raw = codec::encode(&event).context("Failed to encode event")?;
    println!("{}", raw);
    Ok(())
}

fn cmd_decode(raw: &str, format: &OutputFormat) -> Result<()> {
    let parsed = codec::decode(raw);

    if *format == OutputFormat::Json {
        let value = match &parsed {
            ParseResult::Event(event) => json!({ "result": "event", "event": event_json(event) }),
            ParseResult::Degraded { event, error } => {
                json!({ "result": "degraded", "event": event_json(event), "error": error.to_string() })
            }
            ParseResult::Ignored(reason) => json!({ "result": "ignored", "reason": reason.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match parsed {
        ParseResult::Event(event) => {
            println!("{} {} {}", "event".green().bold(), event.tenant.bold(), event.kind);
            print_payload(event.payload.as_ref())?;
        }
        ParseResult::Degraded { event, error } => {
            println!("{} {} {}", "degraded".yellow().bold(), event.tenant.bold(), event.kind);
            println!("  {} {}", "payload dropped:".yellow(), error);
        }
        ParseResult::Ignored(reason) => {
            println!("{} {}", "ignored".red().bold(), reason);
        }
    }
    Ok(())
}

fn event_json(event: &ShellEvent) -> serde_json::Value {
    json!({
        "tenant": event.tenant,
        "kind": event.kind.as_str(),
        "payload": event.payload,
    })
}

fn print_payload(payload: Option<&TenantSettings>) -> Result<()> {
    if let Some(settings) = payload {
        println!("{}", serde_json::to_string_pretty(settings)?);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct TenantReport {
    name: String,
    state: Option<TenantState>,
    live_matches: bool,
    stored_matches: bool,
}

#[derive(Debug, Serialize)]
struct NodeReport {
    id: String,
    tenants: Vec<TenantReport>,
    metrics: SyncMetrics,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    storage: Option<PathBuf>,
    published: usize,
    converged: bool,
    nodes: Vec<NodeReport>,
}

async fn cmd_simulate(
    config: &Config,
    nodes: Option<usize>,
    tenants: Option<Vec<String>>,
    memory: bool,
    format: &OutputFormat,
) -> Result<()> {
    let node_count = nodes.unwrap_or(config.simulation.nodes).max(1);
    let tenants = tenants.unwrap_or_else(|| config.simulation.tenants.clone());
    let settle = Duration::from_millis(config.simulation.settle_ms);
    info!(node_count, ?tenants, memory, "Starting simulation");

    let bus = Arc::new(InMemoryBus::with_capacity("memory", config.sync.bus_capacity));
    let buses = BusRegistry::single(bus.clone());
    let storage = if memory {
        None
    } else {
        Some(tempfile::tempdir().context("Failed to create simulation storage")?)
    };

    let mut cluster = Vec::with_capacity(node_count);
    for i in 0..node_count {
        let id = format!("node-{}", i);
        let store: Arc<dyn StateStore> = match &storage {
            Some(dir) => Arc::new(FileStore::new(dir.path().join(&id))),
            None => Arc::new(MemoryStore::new()),
        };
        let node = Node::new(id, &config.sync, &buses, store);
        node.start(&tenants).await.context(format!("Failed to start {}", node.id()))?;
        cluster.push(node);
    }

    let origin = &cluster[0];
    for name in &tenants {
        let settings = TenantSettings::new(name)
            .with_state(TenantState::Running)
            .with_value("created-by", origin.id())
            .with_value("revision", 1);
        origin.create_tenant(settings).await?;
    }
    tokio::time::sleep(settle).await;

    if let Some(first) = tenants.first() {
        origin
            .update_tenant(first, |s| {
                s.config.insert("revision".to_string(), 2.into());
            })
            .await?;
        tokio::time::sleep(settle).await;

        origin
            .setup_tenant(first, |s| {
                s.config.insert("setup-complete".to_string(), true.into());
            })
            .await?;
        tokio::time::sleep(settle).await;
    }

    let mut reports = Vec::with_capacity(cluster.len());
    for node in &cluster {
        let mut tenant_reports = Vec::with_capacity(tenants.len());
        for name in &tenants {
            let expected = origin.settings(name);
            let live = node.settings(name);
            let stored = node.stored(name).await?;
            tenant_reports.push(TenantReport {
                name: name.clone(),
                state: live.as_ref().map(|s| s.state),
                live_matches: live.is_some() && live == expected,
                stored_matches: stored.is_some() && stored == expected,
            });
        }
        reports.push(NodeReport {
            id: node.id().to_string(),
            tenants: tenant_reports,
            metrics: node.sync().metrics(),
        });
    }

    let report = SimulationReport {
        storage: storage.as_ref().map(|dir| dir.path().to_path_buf()),
        published: bus.published_count(),
        converged: reports
            .iter()
            .all(|n| n.tenants.iter().all(|t| t.live_matches && t.stored_matches)),
        nodes: reports,
    };
    info!(converged = report.converged, published = report.published, "Simulation finished");

    for node in &cluster {
        node.shutdown();
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_simulation(&report),
    }
    Ok(())
}

fn print_simulation(report: &SimulationReport) {
    match &report.storage {
        Some(dir) => println!("storage: {}", dir.display()),
        None => println!("storage: in-memory"),
    }
    println!("messages published: {}", report.published);
    println!();

    for node in &report.nodes {
        println!("{}", node.id.bold());
        for tenant in &node.tenants {
            let status = if tenant.live_matches && tenant.stored_matches {
                "in sync".green()
            } else if tenant.live_matches {
                "not persisted".yellow()
            } else {
                "diverged".red()
            };
            let state = tenant
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "not loaded".to_string());
            println!("  {:<16} {:<14} {}", tenant.name, state, status);
        }
        let m = &node.metrics;
        println!(
            "  received={} reloads={} adopted={} published={} suppressed={} resubscribes={}",
            m.messages_received,
            m.reloads_applied,
            m.snapshots_adopted,
            m.messages_published,
            m.publishes_suppressed,
            m.resubscribes
        );
    }

    println!();
    if report.converged {
        println!("{}", "cluster converged".green().bold());
    } else {
        println!("{}", "cluster did not converge".red().bold());
    }
}
