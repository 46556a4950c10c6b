use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crowdsec_dashboard::AppState;
use crowdsec_dashboard::api::create_router;
use crowdsec_dashboard::config::{AppConfig, Overrides, Settings, TlsConfig};
use crowdsec_dashboard::db;
use crowdsec_dashboard::lapi::{LapiApi, LapiClient};
use crowdsec_dashboard::observability::{init_metrics, init_tracing};
use crowdsec_dashboard::scheduler::SyncLoop;
use crowdsec_dashboard::sync::{
    CidrCountryTable, CountryLookup, NoCountryLookup, Reconciler, SyncEngine, SyncOptions,
};
use crowdsec_dashboard::ws::Broadcaster;

#[derive(Parser)]
#[command(
    name = "crowdsec-dashboard",
    version,
    about = "CrowdSec decision sync engine and dashboard API"
)]
struct Cli {
    /// Path to the config file; missing file means defaults
    #[arg(short, long, default_value = "/etc/crowdsec-dashboard/dashboard.yaml")]
    config: PathBuf,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = AppConfig::load(&cli.config, &cli.overrides)?;
    let settings = config.settings;

    // Init logging
    init_tracing(
        settings.observability.log_format,
        &settings.observability.log_level,
    );
    init_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "starting crowdsec-dashboard"
    );

    // Init database
    tracing::info!("initializing PostgreSQL database");
    let pool = db::init_postgres_pool(
        &settings.storage.connection_string,
        settings.storage.max_connections,
    )
    .await?;
    let repo: Arc<dyn db::RepositoryTrait> = Arc::new(db::Repository::new(pool.clone()));

    let broadcaster = Arc::new(Broadcaster::new());

    // LAPI client and sync engine, only when LAPI is configured
    let lapi = build_lapi_client(&settings)?;
    let engine = lapi
        .as_ref()
        .map(|lapi| build_engine(&settings, lapi.clone(), repo.clone(), broadcaster.clone()))
        .transpose()?;

    let state = AppState::new(
        settings.clone(),
        repo,
        lapi,
        engine.clone(),
        broadcaster,
        Some(pool),
    );

    // Start sync loop
    if let Some(engine) = engine {
        let sync_loop = SyncLoop::new(engine, settings.sync.poll_interval_secs);
        let shutdown_rx = state.subscribe_shutdown();
        tokio::spawn(async move {
            sync_loop.run(shutdown_rx).await;
        });
    }

    // Start HTTP server
    let router = create_router(state.clone());
    let listen = settings.http.listen.clone();

    if let Some(tls_config) = &settings.http.tls {
        start_tls_server(&listen, router, tls_config, state).await?;
    } else {
        start_plain_server(&listen, router, state).await?;
    }

    Ok(())
}

fn build_lapi_client(settings: &Settings) -> anyhow::Result<Option<Arc<dyn LapiApi>>> {
    let lapi = &settings.lapi;
    let (Some(url), Some(key)) = (lapi.url.as_deref(), lapi.bouncer_api_key.as_deref()) else {
        tracing::warn!("LAPI_URL or LAPI_BOUNCER_API_TOKEN not set, decision polling disabled");
        return Ok(None);
    };
    if !lapi.is_configured() {
        tracing::warn!("LAPI url or bouncer key is empty, decision polling disabled");
        return Ok(None);
    }

    let mut client = LapiClient::new(url, key, Duration::from_secs(lapi.timeout_secs))?;
    match lapi.watcher_credentials() {
        Some((machine_id, password)) => client = client.with_watcher(machine_id, password),
        None => tracing::info!("no watcher credentials, deleting decisions is disabled"),
    }
    tracing::info!(url = %client.base_url(), "LAPI client configured");
    let client: Arc<dyn LapiApi> = Arc::new(client);
    Ok(Some(client))
}

fn build_engine(
    settings: &Settings,
    lapi: Arc<dyn LapiApi>,
    repo: Arc<dyn db::RepositoryTrait>,
    broadcaster: Arc<Broadcaster>,
) -> anyhow::Result<Arc<SyncEngine>> {
    let geo: Arc<dyn CountryLookup> = if settings.geoip.countries.is_empty() {
        Arc::new(NoCountryLookup)
    } else {
        let table = CidrCountryTable::from_ranges(&settings.geoip.countries)?;
        tracing::info!(ranges = table.len(), "loaded country lookup table");
        Arc::new(table)
    };

    let reconciler = Reconciler::new(repo.clone(), geo, settings.sync.batch_size);
    let options = SyncOptions {
        origins: settings.lapi.origins.clone(),
        scopes: settings.lapi.scopes.clone(),
        retention_count: settings.sync.retention_count,
        alert_chunk_size: settings.sync.alert_chunk_size,
    };
    tracing::info!(
        poll_interval_secs = settings.sync.poll_interval_secs,
        retention_count = ?options.retention_count,
        "decision sync configured"
    );

    Ok(Arc::new(SyncEngine::new(
        lapi,
        repo,
        reconciler,
        broadcaster,
        options,
    )))
}

async fn start_plain_server(
    listen: &str,
    router: axum::Router,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(listen).await?;
    tracing::info!(listen = %listen, tls = false, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn start_tls_server(
    listen: &str,
    router: axum::Router,
    tls_config: &TlsConfig,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config =
        RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path).await?;
    let addr: std::net::SocketAddr = listen.parse()?;
    tracing::info!(listen = %listen, tls = true, "HTTPS server starting");

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown_signal(state).await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(30)));
    });

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let drain_timeout = state.settings.shutdown.drain_timeout_seconds;
    tracing::info!(
        drain_timeout_seconds = drain_timeout,
        "shutdown signal received, stopping sync loop"
    );

    state.trigger_shutdown();

    if drain_timeout > 0 {
        tracing::info!(seconds = drain_timeout, "waiting for drain period");
        tokio::time::sleep(Duration::from_secs(drain_timeout as u64)).await;
    }

    tracing::info!("graceful shutdown complete");
}
