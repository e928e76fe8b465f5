use std::sync::Arc;

use clap::Parser;
use fleetgate::{
    actors::{
        dispatch::DispatchHandle, ingest::IngestHandle, liveness::LivenessHandle,
        retention::RetentionHandle,
    },
    alerts::AlertEngine,
    api::{ApiState, spawn_api_server},
    config::{Config, read_config_file},
    hub::Hub,
    limiter::RateLimiter,
    mqtt,
    notify::SettingsNotifier,
    store::MemoryStore,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults apply when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetgate", LevelFilter::TRACE),
        ("server", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    dotenv::dotenv().ok();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let store: Arc<dyn fleetgate::store::DeviceStore> = Arc::new(MemoryStore::new());
    let hub = Arc::new(Hub::new());

    let notifier = Arc::new(SettingsNotifier::new(store.clone()));
    let engine = Arc::new(AlertEngine::new(store.clone(), hub.clone(), notifier));

    // Outbound transport first; the inbound event loop starts once both
    // actor handles exist.
    let (transport, eventloop) = mqtt::connect(&config.mqtt).await?;

    let ingest = IngestHandle::spawn(store.clone(), engine, hub.clone());
    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub.clone(),
        Arc::new(transport),
        config.mqtt.topic_prefix.clone(),
    );
    let liveness = LivenessHandle::spawn(store.clone(), hub.clone());
    let retention = RetentionHandle::spawn(store.clone());

    mqtt::spawn_event_loop(eventloop, ingest.clone(), dispatcher.clone());

    let limiter = config.rate_limit.as_ref().map(|rl| {
        let limiter = Arc::new(RateLimiter::new(rl.rate, rl.burst));
        limiter.spawn_eviction_sweep();
        limiter
    });

    let state = ApiState::new(store, hub, dispatcher.clone(), limiter);
    spawn_api_server(config.api.clone(), state).await?;

    info!("fleetgate is up");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    ingest.shutdown().await;
    dispatcher.shutdown().await;
    liveness.shutdown().await;
    retention.shutdown().await;

    Ok(())
}
