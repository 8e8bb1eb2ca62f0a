//! call-observer: print what happens to Telepathy calls

mod args;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use callwatch_infra_common::logging::{log_welcome, setup_logging};
use callwatch_observer_core::{notification_channel, Console, Observer, ObserverConfig};
use callwatch_telepathy::{connect, ObserverRegistration, TelepathyBus};

use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ObserverConfig::load(args.config.clone(), &Args::default_config_candidates())
        .context("Failed to load configuration")?;
    let config = args.apply(config);
    config.validate().context("Invalid configuration")?;

    setup_logging(args.logging(&config)?)?;
    log_welcome("call-observer", env!("CARGO_PKG_VERSION"));

    let connection = connect(config.bus)
        .await
        .with_context(|| format!("Failed to connect to the {:?} bus", config.bus))?;

    let (sink, notifications) = notification_channel();
    let bus_name = ObserverRegistration::new(config.client_name.clone())
        .with_uniquify(config.uniquify)
        .with_recover(config.recover)
        .with_filter(config.filter())
        .register(&connection, sink.clone())
        .await
        .context("Failed to register the observer")?;

    println!("Observing calls as {}", bus_name);
    println!("Ctrl-C to end");

    let observer = Observer::new(
        Arc::new(TelepathyBus::new(connection)),
        Console::stdout(config.colour),
        sink,
    );
    let stats = observer.run(notifications, ctrl_c()).await;
    info!("Observer stopped with {:?}", stats);

    println!();
    println!("Quitting");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
