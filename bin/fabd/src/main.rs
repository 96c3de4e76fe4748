//! ---
//! fab_section: "08-daemon"
//! fab_subsection: "binary"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Binary entrypoint for the factory orchestration daemon."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fab_common::config::{AppConfig, Mode};
use fab_common::{init_tracing, MachineKind, ProcessKind, ReactorHandle, RetryPolicy};
use fab_ledger::{InMemoryLedger, ProcessLedger, RetryingLedger, TaskLedger};
use fab_logging::{log_system_event, SystemEventOutcome};
use fab_machine::{launch_machine_client, spawn_readings_feed, ClientWiring, ReadingsCache};
use fab_msg::{BusClient, InMemoryBroker, TopicRegistry};
use fab_process::{launch_choreographer, ProcessPlan, PROCESS_COMPLETED};
use fab_sim::{spawn_factory_simulator, spawn_sensor_publisher, FactorySimulator, SensorGenerator};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const PROCESS_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("fabd ", env!("CARGO_PKG_VERSION")),
    about = "Factory machine-client orchestration daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the machine clients and process choreographers")]
    Run {
        #[arg(long, default_value_t = 0, help = "Supplying processes to start")]
        supply: usize,
        #[arg(
            long,
            default_value_t = 0,
            help = "Production processes to start once products are supplied"
        )]
        produce: usize,
    },
    #[command(about = "Print the topic map for every machine and exit")]
    Topics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/fabd.toml"));
    candidates.push(PathBuf::from("configs/fabd.example.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    match cli.command.unwrap_or(Commands::Run {
        supply: 0,
        produce: 0,
    }) {
        Commands::Run { supply, produce } => {
            init_tracing("fabd", &config.logging)?;
            info!(config_path = %loaded.source.display(), mode = ?config.mode, "configuration loaded");
            run_daemon(config, supply, produce).await?
        }
        Commands::Topics => render_topics(&config),
    }
    Ok(())
}

struct Daemon {
    shutdown: broadcast::Sender<()>,
    reactors: Vec<ReactorHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        for reactor in self.reactors {
            reactor.join().await;
        }
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "daemon task join error");
            }
        }
    }
}

async fn run_daemon(config: AppConfig, supply: usize, produce: usize) -> Result<()> {
    let broker = InMemoryBroker::new(config.broker.url.clone());
    let connect_policy = RetryPolicy::from(&config.broker.connect_retry);
    let ledger = Arc::new(InMemoryLedger::new());
    for (kind, machine) in config.enabled_machines() {
        ledger.register_machine(kind, machine.address.clone());
    }
    ledger.register_process_contract(
        ProcessKind::Supplying,
        config.processes.supplying_contract.clone(),
    );
    ledger.register_process_contract(
        ProcessKind::Production,
        config.processes.production_contract.clone(),
    );
    let retrying = Arc::new(RetryingLedger::new(
        Arc::clone(&ledger),
        RetryPolicy::from(&config.ledger.retry),
    ));

    let (shutdown, _) = broadcast::channel(4);
    let mut daemon = Daemon {
        shutdown: shutdown.clone(),
        reactors: Vec::new(),
        tasks: Vec::new(),
    };
    let client_id = |name: &str| format!("{}-{}", config.broker.client_prefix, name);

    let readings = ReadingsCache::new();
    let feed_bus = BusClient::connect(&broker, client_id("readings"), connect_policy).await?;
    daemon
        .tasks
        .push(spawn_readings_feed(feed_bus, readings.clone(), shutdown.subscribe()).await?);

    for (kind, machine) in config.enabled_machines() {
        let bus = BusClient::connect(&broker, client_id(kind.client_name()), connect_policy)
            .await
            .with_context(|| format!("connecting {} to the bus", kind.client_name()))?;
        let wiring = ClientWiring {
            address: machine.address.clone(),
            ledger: retrying.clone() as Arc<dyn TaskLedger>,
            bus,
            readings: readings.clone(),
            subscribe_state: config.broker.subscribe_state,
        };
        let runtime = launch_machine_client(kind, wiring, &*ledger, shutdown.subscribe())
            .await
            .with_context(|| format!("starting {} client", kind))?;
        daemon.reactors.push(runtime);
    }

    for plan in [
        ProcessPlan::supplying(config.processes.supplying_contract.clone()),
        ProcessPlan::production(config.processes.production_contract.clone()),
    ] {
        daemon.reactors.push(launch_choreographer(
            plan,
            retrying.clone() as Arc<dyn ProcessLedger>,
            &*ledger,
            shutdown.subscribe(),
        ));
    }

    if config.mode.is_simulation() {
        let sim_bus = BusClient::connect(&broker, client_id("simulator"), connect_policy).await?;
        let simulator = Arc::new(FactorySimulator::new(sim_bus, &config.simulation));
        simulator.subscribe().await?;
        daemon
            .reactors
            .push(spawn_factory_simulator(simulator, shutdown.subscribe()));

        let sensor_bus = BusClient::connect(&broker, client_id("sensors"), connect_policy).await?;
        daemon.reactors.push(spawn_sensor_publisher(
            sensor_bus,
            SensorGenerator::new(config.simulation.seed),
            config.simulation.readings_interval,
            shutdown.subscribe(),
        ));
        info!(
            ack_delay_ms = config.simulation.ack_delay.as_millis() as u64,
            "factory simulator running"
        );
    } else if supply > 0 || produce > 0 {
        warn!("processes are started against live devices");
    }

    if supply > 0 {
        daemon.tasks.push(tokio::spawn(seed_processes(
            Arc::clone(&ledger),
            supply,
            produce,
            shutdown.subscribe(),
        )));
    } else if produce > 0 {
        warn!("production needs supplied products; pass --supply as well");
    }

    log_system_event(
        None,
        "daemon.start",
        "daemon running; waiting for termination signal",
        SystemEventOutcome::Success,
    );
    info!(
        mode = ?config.mode,
        machines = config.enabled_machines().count(),
        "daemon running"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    daemon.stop().await;
    broker.shutdown();
    Ok(())
}

/// Start `supply` supplying processes, then one production process per
/// product whose supply completed, up to `produce`.
async fn seed_processes(
    ledger: Arc<InMemoryLedger>,
    supply: usize,
    produce: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut pending = Vec::with_capacity(supply);
    for _ in 0..supply {
        let product_did = format!("did:fab:{}", uuid::Uuid::new_v4().simple());
        match ledger.start_process(ProcessKind::Supplying, &product_did) {
            Ok(process_id) => {
                info!(process_id, product_did = %product_did, "supplying process started");
                pending.push((process_id, product_did));
            }
            Err(err) => warn!(error = %err, "supplying process not started"),
        }
    }

    let mut produced = 0;
    let mut ticker = tokio::time::interval(PROCESS_POLL);
    while !pending.is_empty() {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {}
        }
        let mut still_running = Vec::with_capacity(pending.len());
        for (process_id, product_did) in pending {
            let result = ledger
                .process(ProcessKind::Supplying, process_id)
                .and_then(|record| record.result);
            match result {
                None => still_running.push((process_id, product_did)),
                Some(PROCESS_COMPLETED) if produced < produce => {
                    info!(process_id, product_did = %product_did, "supplying process completed");
                    match ledger.start_process(ProcessKind::Production, &product_did) {
                        Ok(production_id) => {
                            produced += 1;
                            info!(process_id = production_id, product_did = %product_did, "production process started");
                        }
                        Err(err) => warn!(error = %err, "production process not started"),
                    }
                }
                Some(result) => info!(process_id, result, "supplying process finished"),
            }
        }
        pending = still_running;
    }
    info!(produced, "process seeding complete");
}

fn render_topics(config: &AppConfig) {
    for kind in MachineKind::ALL {
        let topics = TopicRegistry::machine(kind);
        let status = if config.machine(kind).is_some() {
            "enabled"
        } else {
            "disabled"
        };
        println!(
            "{:<4} {:<9} command={} ack={} state={} stock={}",
            kind.symbol(),
            status,
            topics.command,
            topics.ack,
            topics.state.unwrap_or("-"),
            topics.stock.unwrap_or("-"),
        );
    }
    for topic in TopicRegistry::sensors() {
        println!("sensor         {}", topic);
    }
}
