// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

use cli::{Args, Command};
use kube_machine::config::{self, Config};
use kube_machine::progress::{MachineEvent, create_spinner};
use kube_machine::{KubeClientFactory, MachineHandle};

/// Initialize logging with file output and optional stderr
fn init_logging(verbose: bool) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    // Create log directory
    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return;
    }

    // Rotate daily or at 10MB, keeping 5 files
    let log_path = log_dir.join("kube-machine.log");
    let condition = RollingConditionBase::new()
        .daily()
        .max_size(10 * 1024 * 1024);

    let file_appender = match RollingFileAppenderBase::new(log_path, condition, 5) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            return;
        }
    };

    let (non_blocking, _guard) = file_appender.get_non_blocking_appender();
    // Leak the guard to keep the background writer alive
    std::mem::forget(_guard);

    let filter = if verbose {
        "kube_machine=debug"
    } else {
        "kube_machine=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    if verbose {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (aws-lc-rs)
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Warning: a rustls crypto provider was already installed");
    }

    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {:#}", e);
        Config::default()
    });

    let machine = build_machine(&args, &config)?;

    match &args.command {
        Command::Servers => {
            let servers = machine.servers().await?;
            println!("{}", serde_json::to_string_pretty(&servers)?);
        }
        Command::Exec { command } => {
            machine.exec(command).await?;
        }
        Command::Wait { timeout } => {
            let minutes = timeout.unwrap_or(config.wait_timeout_minutes);
            run_wait(&machine, minutes).await?;
        }
        Command::Properties => {
            println!("{}", serde_json::to_string_pretty(&machine.properties())?);
        }
    }

    Ok(())
}

fn build_machine(args: &Args, config: &Config) -> Result<MachineHandle> {
    let pod = args.pod.as_deref().context("--pod is required")?;
    let container = args.container.as_deref().context("--container is required")?;
    let namespace = args.namespace.as_deref().unwrap_or(&config.namespace);
    let context = args.context.as_deref().or(config.context.as_deref());

    let factory = KubeClientFactory::new(context)?
        .with_connect_timeout(config.connect_timeout())
        .with_read_timeout(config.read_timeout());

    Ok(MachineHandle::new(Arc::new(factory), namespace, pod, container))
}

async fn run_wait(machine: &MachineHandle, minutes: u64) -> Result<()> {
    let spinner = create_spinner(&format!("Waiting for {}...", machine.name()));
    let mut progress_rx = machine.progress().subscribe();

    let result = {
        let mut wait = Box::pin(machine.wait_running(minutes));
        loop {
            tokio::select! {
                biased;
                progress = progress_rx.recv() => {
                    match progress {
                        Ok(MachineEvent::PhaseObserved { machine, phase }) => {
                            spinner.set_message(format!("{} is {}", machine, phase));
                        }
                        Ok(MachineEvent::Subscribed { machine }) => {
                            spinner.set_message(format!("Watching {}...", machine));
                        }
                        _ => {}
                    }
                }
                result = &mut wait => {
                    break result;
                }
            }
        }
    };

    spinner.finish_and_clear();
    result?;
    println!("{} is running", machine.name());
    Ok(())
}
