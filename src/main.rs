mod cli;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use cli::{Cli, Command};
use tatkal::captcha::{HttpCaptchaSolver, SharedSolver};
use tatkal::clock::{ServerClock, booking_window_opens};
use tatkal::config::TatkalConfig;
use tatkal::engine::HandlerRegistry;
use tatkal::logging::InstanceLogFiles;
use tatkal::orchestrator::FleetOrchestrator;
use tatkal::plan::{BookingPlan, Credentials};
use tatkal::session::SessionServices;
use tatkal::sim::{SimBehavior, SimulatedLauncher, SimulatedSolver};
use tatkal::status::{ChannelSink, FanOut, JsonFileSink, StatusSink, read_status, status_file};
use ui::FleetProgress;

const DEMO_PLAN: &str = r#"{
    "train": {
        "from_code": "NDLS",
        "to_code": "HWH",
        "date": "25122026",
        "train_no": "12302",
        "class": "AC 3 Tier (3A)",
        "quota": "TATKAL"
    },
    "passengers": [
        { "name": "Asha Rao", "age": "34", "sex": "Female", "berth": "Lower" },
        { "name": "Vikram Rao", "age": "36", "sex": "Male" }
    ],
    "contact": { "phone": "9876543210" },
    "preferences": { "payment": "Pay through BHIM UPI", "upi_id": "asha@upi" }
}"#;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let quiet = matches!(cli.command, Command::Demo { .. });
    let config = TatkalConfig::load(cli.config.as_deref())?;
    init_tracing(cli.verbose, quiet, &config.status_dir);

    match cli.command {
        Command::Demo {
            instances,
            broken,
            kick_out,
            plan,
        } => run_demo(config, instances, broken, kick_out, plan).await,
        Command::Check { plan, network } => check(&config, &plan, network).await,
        Command::Status { instance } => show_status(&config, instance),
    }
}

fn init_tracing(verbose: bool, quiet: bool, log_dir: &Path) {
    let default = match (verbose, quiet) {
        (true, _) => "tatkal=debug",
        (false, true) => "tatkal=warn",
        (false, false) => "tatkal=info",
    };
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()));
    // Session files keep the full story even when the terminal is quiet.
    let files = InstanceLogFiles::new(log_dir).with_filter(EnvFilter::new(if verbose {
        "tatkal=debug"
    } else {
        "tatkal=info"
    }));
    tracing_subscriber::registry().with(console).with(files).init();
}

const DEMO_INSTANCES: usize = 3;

async fn run_demo(
    config: TatkalConfig,
    instances: Option<usize>,
    broken: Option<u32>,
    kick_out: bool,
    plan: Option<PathBuf>,
) -> Result<()> {
    let mut plan = match plan {
        Some(path) => BookingPlan::load(&path).with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let count = instances.unwrap_or(DEMO_INSTANCES);
            let mut plan: BookingPlan = serde_json::from_str(DEMO_PLAN)?;
            plan.logins = (1..=count)
                .map(|n| Credentials {
                    username: format!("demo{n}"),
                    password: format!("secret{n}"),
                })
                .collect();
            plan.template.preferences.browser_count = count;
            plan
        }
    };
    if let Some(count) = instances {
        plan.template.preferences.browser_count = count;
    }
    let clock = if plan.template.preferences.timed {
        ServerClock::synchronize_or_local(&reqwest::Client::new(), &config.clock.server_time_url).await
    } else {
        ServerClock::local()
    };

    let behavior = SimBehavior {
        kick_out_once: kick_out,
        ..SimBehavior::default()
    };
    let mut launcher = SimulatedLauncher::new(behavior.clone());
    if let Some(instance_id) = broken {
        launcher = launcher.with(
            instance_id,
            SimBehavior {
                broken: true,
                ..behavior
            },
        );
    }

    let (channel, mut updates) = ChannelSink::new();
    let sink = FanOut::new(vec![
        Box::new(JsonFileSink::new(&config.status_dir)) as Box<dyn StatusSink>,
        Box::new(channel),
    ]);
    let services = SessionServices {
        config: Arc::new(config),
        launcher: Arc::new(launcher),
        solver: Arc::new(SharedSolver::new(Arc::new(SimulatedSolver::new()))),
        clock,
        sink: Arc::new(sink),
        registry: Arc::new(HandlerRegistry::booking()),
    };

    let fleet = FleetOrchestrator::new(services);
    let stop = fleet.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.set();
        }
    });

    let mut progress = FleetProgress::new();
    let run = fleet.run_plan(&plan);
    tokio::pin!(run);
    let report = loop {
        tokio::select! {
            report = &mut run => break report?,
            Some(update) = updates.recv() => progress.update(&update),
        }
    };
    while let Ok(update) = updates.try_recv() {
        progress.update(&update);
    }
    progress.finish(&report);
    Ok(())
}

async fn check(config: &TatkalConfig, path: &Path, network: bool) -> Result<()> {
    let plan = BookingPlan::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    plan.template.validate()?;

    let train = &plan.template.train;
    let usable = plan.logins.iter().filter(|c| c.is_complete()).count();
    println!(
        "Plan OK: train {} {} -> {} on {}, class {}, {} passenger(s), {usable}/{} usable login(s)",
        train.train_no,
        train.from_code,
        train.to_code,
        train.form_date()?,
        train.class_code()?,
        plan.template.passengers.len(),
        plan.logins.len()
    );
    println!(
        "Config OK: {} observer rule(s), {} landmark(s)",
        config.observer.rules.len(),
        config.landmarks.len()
    );

    if !network {
        return Ok(());
    }

    match &config.captcha.endpoint {
        Some(endpoint) => {
            let solver = HttpCaptchaSolver::new(
                endpoint.clone(),
                config.captcha.health_url.clone(),
                Duration::from_secs(config.captcha.timeout_secs),
            )?;
            SharedSolver::new(Arc::new(solver)).ensure_ready().await?;
            println!("Captcha service OK: {endpoint}");
        }
        None => println!("No captcha endpoint configured"),
    }

    let clock = ServerClock::synchronize(&reqwest::Client::new(), &config.clock.server_time_url).await?;
    println!("Server clock offset: {} ms", clock.offset().num_milliseconds());
    let preferences = &plan.template.preferences;
    if preferences.timed {
        let target = clock.local_instant_for(
            booking_window_opens(preferences.ac),
            config.engine.window_shift_secs,
        );
        println!("Timed search fires at {} local time", target.format("%H:%M:%S%.3f"));
    }
    Ok(())
}

fn show_status(config: &TatkalConfig, instance: Option<u32>) -> Result<()> {
    let progress = FleetProgress::new();
    let dir = &config.status_dir;

    if let Some(instance_id) = instance {
        let path = status_file(dir, instance_id);
        let entries = read_status(&path).with_context(|| format!("no status for bot {instance_id}"))?;
        progress.print_log(instance_id, &entries);
        return Ok(());
    }

    let mut found = Vec::new();
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name();
            let instance_id = name
                .to_str()
                .and_then(|n| n.strip_prefix("bot_"))
                .and_then(|n| n.strip_suffix("_status.json"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(instance_id) = instance_id {
                found.push(instance_id);
            }
        }
    }
    if found.is_empty() {
        println!("No status files in {}", dir.display());
        return Ok(());
    }

    found.sort_unstable();
    for instance_id in found {
        let entries = read_status(&status_file(dir, instance_id))?;
        let latest = entries.len().saturating_sub(1);
        progress.print_log(instance_id, &entries[latest..]);
    }
    Ok(())
}
