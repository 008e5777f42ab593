//! GK - Gatekeeper CLI
//!
//! Command-line interface for the port lease service

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use gatekeeper_core::{ErrorKind, GatekeeperConfig, GatekeeperError};

#[derive(Parser)]
#[command(name = "gk")]
#[command(version = "1.1.2")]
#[command(about = "Gatekeeper port lease service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the gatekeeper home (config, state, spool)
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Manage instances (register, update, deregister, list, show)
    Instance {
        #[command(subcommand)]
        command: InstanceCommands,
    },
    /// Reserve a contiguous run of ports for an instance
    Reserve {
        /// Instance id that will own the binding
        instance_id: String,
        /// Number of contiguous ports to reserve
        #[arg(long, default_value_t = 1)]
        size: u16,
    },
    /// Release a binding by its exact port or exact range
    Release {
        /// Single port of a size-1 binding
        #[arg(long)]
        port: Option<u16>,
        /// Exact bounds of a multi-port binding
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        range: Option<Vec<u16>>,
        /// Expected owner; the release fails if another instance holds the binding
        #[arg(long)]
        instance: Option<String>,
    },
    /// List pool ports with their binding annotations
    Ports {
        /// Show free ports instead of reserved ones
        #[arg(long)]
        free: bool,
        /// Show every port in the pool
        #[arg(long)]
        all: bool,
        /// Output format: table, json, or yaml
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// List bindings recorded in the ledger
    Bindings {
        /// Only bindings owned by this instance
        #[arg(long)]
        instance: Option<String>,
        /// Include released bindings
        #[arg(long)]
        all: bool,
        /// Output format: table, json, or yaml
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Submit a one-shot observation and print the drift report
    Observe {
        /// Instance the observation is about
        instance_id: String,
        /// Ports seen in use, comma separated (omit for an empty observation)
        #[arg(long, value_delimiter = ',')]
        ports: Option<Vec<u16>>,
    },
    /// Run the observer daemon over the report spool
    Daemon {
        /// Spool directory to watch (defaults to <home>/spool)
        #[arg(long)]
        spool: Option<PathBuf>,
        /// Sweep interval in seconds (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// Register a new instance
    Register {
        /// Display name
        name: String,
        /// Instance id (a UUID is generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Metadata entry, KEY=VALUE (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },
    /// Update an instance's name or metadata
    Update {
        /// Instance id
        id: String,
        /// New display name
        #[arg(long)]
        name: Option<String>,
        /// Replacement metadata entry, KEY=VALUE (repeatable, replaces the whole mapping)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },
    /// Deregister an instance and release all of its bindings
    Deregister {
        /// Instance id
        id: String,
    },
    /// List registered instances
    List {
        /// Output format: table, json, or yaml
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Show one instance with its bindings
    Show {
        /// Instance id
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show,
}

fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Duplicate => 4,
        ErrorKind::Exhausted => 5,
        ErrorKind::Conflict => 6,
        ErrorKind::Unavailable => 7,
        ErrorKind::Internal => 1,
    }
}

fn parse_meta(pairs: &[String]) -> Result<std::collections::BTreeMap<String, String>, GatekeeperError> {
    let mut metadata = std::collections::BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                metadata.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(GatekeeperError::Validation(format!(
                    "invalid metadata entry '{}': expected KEY=VALUE",
                    pair
                )));
            }
        }
    }
    Ok(metadata)
}

fn fmt_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn fmt_ports(start: u16, end: u16) -> String {
    if start == end {
        format!("{}", start)
    } else {
        format!("{}-{}", start, end)
    }
}

fn fmt_port_set(ports: &[u16]) -> String {
    if ports.is_empty() {
        "(none)".to_string()
    } else {
        ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if let Some(gk_err) = e.downcast_ref::<GatekeeperError>() {
            eprintln!("{} {}", "✗".red(), gk_err);
            std::process::exit(exit_code(gk_err.kind()));
        }
        eprintln!("{} {}", "✗".red(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init { force } => {
            let config = GatekeeperConfig::resolve()?;
            std::fs::create_dir_all(&config.home)?;

            let config_path = config.config_path();
            if config_path.exists() && !force {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            } else {
                config.save_file()?;
                println!("{} Wrote config to {}", "✓".green(), config_path.display());
            }

            // Opening the service seeds state.json on first run
            use gatekeeper_core::Gatekeeper;
            let gatekeeper = Gatekeeper::open(config.clone())?;
            let snapshot = gatekeeper.snapshot()?;
            std::fs::create_dir_all(config.spool_dir())?;

            println!(
                "{} Pool {} seeded ({} ports, {} reserved)",
                "✓".green(),
                snapshot.pool.range(),
                snapshot.pool.range().len(),
                snapshot.pool.reserved_count()
            );
            println!("{} Spool directory at {}", "✓".green(), config.spool_dir().display());
            println!("\n✓ Gatekeeper home ready at {}", config.home.display());
        }

        Commands::Instance { command } => {
            handle_instance(command).await?;
        }

        Commands::Reserve { instance_id, size } => {
            use gatekeeper_core::{Gatekeeper, ReserveRequest};
            let gatekeeper = Gatekeeper::open(GatekeeperConfig::resolve()?)?;
            let response = gatekeeper.reserve(ReserveRequest {
                instance_id,
                range_size: size,
            })?;
            println!(
                "{} Reserved {} for {} (binding {})",
                "✓".green(),
                fmt_ports(response.start_port, response.end_port),
                response.instance_id,
                response.binding_id
            );
        }

        Commands::Release {
            port,
            range,
            instance,
        } => {
            use gatekeeper_core::{Gatekeeper, ReleaseRequest};
            let (start_port, end_port) = match range {
                Some(bounds) => (bounds.first().copied(), bounds.get(1).copied()),
                None => (None, None),
            };
            let gatekeeper = Gatekeeper::open(GatekeeperConfig::resolve()?)?;
            let response = gatekeeper.release(ReleaseRequest {
                port_number: port,
                start_port,
                end_port,
                instance_id: instance,
            })?;
            println!(
                "{} Released binding {} at {}",
                "✓".green(),
                response.binding_id,
                fmt_timestamp(&response.released_at)
            );
        }

        Commands::Ports { free, all, format } => {
            handle_ports(free, all, &format).await?;
        }

        Commands::Bindings {
            instance,
            all,
            format,
        } => {
            handle_bindings(instance, all, &format).await?;
        }

        Commands::Observe { instance_id, ports } => {
            use gatekeeper_core::{Gatekeeper, ObserveRequest};
            let gatekeeper = Gatekeeper::open(GatekeeperConfig::resolve()?)?;
            let used_ports = ports.unwrap_or_default();
            let observed_count = used_ports.len();
            let response = gatekeeper.observe(ObserveRequest {
                instance_id: instance_id.clone(),
                used_ports,
            })?;

            println!(
                "\nDrift report for {} ({} port(s) observed):",
                instance_id, observed_count
            );
            println!(
                "  {} {}",
                format!("{:<10}", "confirmed").green(),
                fmt_port_set(&response.confirmed)
            );
            println!(
                "  {} {}",
                format!("{:<10}", "leaked").yellow(),
                fmt_port_set(&response.leaked)
            );
            println!(
                "  {} {}",
                format!("{:<10}", "rogue").red(),
                fmt_port_set(&response.rogue)
            );

            if response.leaked.is_empty() && response.rogue.is_empty() {
                println!("\n✓ No drift detected");
            }
        }

        Commands::Daemon { spool, interval } => {
            use gatekeeper_core::{Gatekeeper, ObserverDaemon};
            use std::sync::atomic::AtomicBool;
            use std::sync::Arc;
            use std::time::Duration;

            tracing_subscriber::fmt().with_target(false).init();

            let mut config = GatekeeperConfig::resolve()?;
            if let Some(secs) = interval {
                config.observe_interval_secs = secs;
            }
            config.validate()?;
            let spool_dir = spool.unwrap_or_else(|| config.spool_dir());
            let sweep_interval = Duration::from_secs(config.observe_interval_secs);

            let gatekeeper = Arc::new(Gatekeeper::open(config)?);
            let daemon = ObserverDaemon::new(gatekeeper, spool_dir, sweep_interval)?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let shutdown_clone = shutdown.clone();
            ctrlc::set_handler(move || {
                eprintln!("[Observer] Received SIGTERM/SIGINT, shutting down gracefully...");
                shutdown_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            })?;

            daemon.start(shutdown).await?;
            eprintln!("[Observer] Shutdown complete");
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = GatekeeperConfig::resolve()?;
                println!("home:                {}", config.home.display());
                println!("config file:         {}", config.config_path().display());
                println!("state file:          {}", config.state_path().display());
                println!("ledger file:         {}", config.ledger_path().display());
                println!("spool directory:     {}", config.spool_dir().display());
                println!("port range:          {}-{}", config.port_range_start, config.port_range_end);
                println!("observe interval:    {}s", config.observe_interval_secs);
            }
        },
    }

    Ok(())
}

async fn handle_instance(command: InstanceCommands) -> Result<(), Box<dyn std::error::Error>> {
    use gatekeeper_core::{Gatekeeper, RegisterRequest, UpdateRequest};

    let gatekeeper = Gatekeeper::open(GatekeeperConfig::resolve()?)?;

    match command {
        InstanceCommands::Register { name, id, meta } => {
            let instance_id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let metadata = parse_meta(&meta)?;
            let instance = gatekeeper.register(RegisterRequest {
                instance_id,
                name,
                metadata,
            })?;
            println!(
                "{} Registered instance {} ({})",
                "✓".green(),
                instance.id,
                instance.name
            );
        }

        InstanceCommands::Update { id, name, meta } => {
            let metadata = if meta.is_empty() {
                None
            } else {
                Some(parse_meta(&meta)?)
            };
            let instance = gatekeeper.update(UpdateRequest {
                instance_id: id,
                name,
                metadata,
            })?;
            println!(
                "{} Updated instance {} ({})",
                "✓".green(),
                instance.id,
                instance.name
            );
        }

        InstanceCommands::Deregister { id } => {
            let outcome = gatekeeper.deregister(&id)?;
            println!("{} Deregistered instance {}", "✓".green(), outcome.instance.id);
            if outcome.released.is_empty() {
                println!("  No active bindings to release");
            } else {
                for binding in &outcome.released {
                    println!(
                        "  Released {} (binding {})",
                        fmt_ports(binding.start_port(), binding.end_port()),
                        binding.id
                    );
                }
            }
        }

        InstanceCommands::List { format } => {
            let instances = gatekeeper.instances()?;

            match format.as_str() {
                "json" => {
                    println!("{}", serde_json::to_string_pretty(&instances)?);
                }
                "yaml" => {
                    println!("{}", serde_yaml::to_string(&instances)?);
                }
                "table" => {
                    if instances.is_empty() {
                        println!("No instances registered.");
                        return Ok(());
                    }

                    let snapshot = gatekeeper.snapshot()?;

                    println!(
                        "\n{:<38} {:<20} {:<12} {:<20}",
                        "ID", "NAME", "PORTS", "REGISTERED"
                    );
                    println!("{}", "-".repeat(92));

                    for instance in &instances {
                        let held = snapshot.ledger.active_ports_for_instance(&instance.id);
                        println!(
                            "{:<38} {:<20} {:<12} {:<20}",
                            instance.id,
                            instance.name,
                            held.len(),
                            fmt_timestamp(&instance.registered_at)
                        );
                    }

                    println!("\nTotal: {} instance(s)", instances.len());
                }
                _ => {
                    eprintln!("Error: Unknown format '{}'. Use: table, json, or yaml", format);
                    std::process::exit(1);
                }
            }
        }

        InstanceCommands::Show { id } => {
            let snapshot = gatekeeper.snapshot()?;
            let instance = snapshot.instances.get(&id).ok_or_else(|| {
                GatekeeperError::NotFound(format!("instance {} is not registered", id))
            })?;

            println!("\nInstance: {}", instance.id);
            println!("  Name:       {}", instance.name);
            println!("  Registered: {}", fmt_timestamp(&instance.registered_at));
            if instance.metadata.is_empty() {
                println!("  Metadata:   (none)");
            } else {
                println!("  Metadata:");
                for (key, value) in &instance.metadata {
                    println!("    {}: {}", key, value);
                }
            }

            let bindings: Vec<_> = snapshot.ledger.active_for_instance(&id).collect();
            if bindings.is_empty() {
                println!("  Bindings:   (none active)");
            } else {
                println!("  Bindings:");
                for binding in bindings {
                    println!(
                        "    {} {} (bound {})",
                        binding.id,
                        fmt_ports(binding.start_port(), binding.end_port()),
                        fmt_timestamp(&binding.bound_at)
                    );
                }
            }
        }
    }

    Ok(())
}

async fn handle_ports(free: bool, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    use gatekeeper_core::Gatekeeper;

    let gatekeeper = Gatekeeper::open(GatekeeperConfig::resolve()?)?;
    let ports = gatekeeper.ports()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&ports)?);
            return Ok(());
        }
        "yaml" => {
            println!("{}", serde_yaml::to_string(&ports)?);
            return Ok(());
        }
        "table" => {}
        _ => {
            eprintln!("Error: Unknown format '{}'. Use: table, json, or yaml", format);
            std::process::exit(1);
        }
    }

    let reserved_total = ports.iter().filter(|p| p.is_reserved).count();
    let free_total = ports.len() - reserved_total;

    // The full pool is large; the table defaults to reserved ports only
    let rows: Vec<_> = ports
        .iter()
        .filter(|p| all || (p.is_reserved != free))
        .collect();

    if rows.is_empty() {
        if free {
            println!("No free ports.");
        } else if !all {
            println!("No reserved ports.");
        } else {
            println!("Pool is empty.");
        }
    } else {
        println!("\n{:<8} {:<10} {:<38} {:<14}", "PORT", "STATE", "INSTANCE", "BINDING PORTS");
        println!("{}", "-".repeat(72));

        for view in rows {
            let state = if view.is_reserved {
                format!("{:<10}", "reserved").yellow()
            } else {
                format!("{:<10}", "free").green()
            };
            let active = view.bindings.iter().find(|b| b.is_active());
            let (owner, bound_ports) = match active {
                Some(summary) => (
                    summary.instance_id.clone(),
                    fmt_ports(summary.start_port, summary.end_port),
                ),
                None => ("-".to_string(), "-".to_string()),
            };
            println!(
                "{:<8} {} {:<38} {:<14}",
                view.port_number, state, owner, bound_ports
            );
        }
    }

    println!(
        "\nTotal: {} port(s), {} reserved, {} free",
        ports.len(),
        reserved_total,
        free_total
    );

    Ok(())
}

async fn handle_bindings(
    instance: Option<String>,
    all: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use gatekeeper_core::Gatekeeper;

    let gatekeeper = Gatekeeper::open(GatekeeperConfig::resolve()?)?;
    let bindings = gatekeeper.bindings(instance.as_deref(), all)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&bindings)?);
        }
        "yaml" => {
            println!("{}", serde_yaml::to_string(&bindings)?);
        }
        "table" => {
            if bindings.is_empty() {
                println!("No bindings found.");
                return Ok(());
            }

            println!(
                "\n{:<22} {:<38} {:<14} {:<20} {:<20}",
                "BINDING", "INSTANCE", "PORTS", "BOUND", "RELEASED"
            );
            println!("{}", "-".repeat(116));

            for summary in &bindings {
                let released = match &summary.released_at {
                    Some(at) => fmt_timestamp(at),
                    None => "active".to_string(),
                };
                println!(
                    "{:<22} {:<38} {:<14} {:<20} {:<20}",
                    summary.binding_id,
                    summary.instance_id,
                    fmt_ports(summary.start_port, summary.end_port),
                    fmt_timestamp(&summary.bound_at),
                    released
                );
            }

            println!("\nTotal: {} binding(s)", bindings.len());
        }
        _ => {
            eprintln!("Error: Unknown format '{}'. Use: table, json, or yaml", format);
            std::process::exit(1);
        }
    }

    Ok(())
}
