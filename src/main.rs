use ringline::application::{CallbackUrls, RoutingResolver, TransferOrchestrator};
use ringline::config::Config;
use ringline::domain::call::CallStore;
use ringline::domain::forwarding::ForwardStore;
use ringline::domain::routing::{NumberStore, RoutingStore};
use ringline::domain::transfer::TransferLogStore;
use ringline::infrastructure::persistence::{
    MemoryCallStore, MemoryForwardStore, MemoryNumberStore, MemoryRoutingStore,
    MemoryTransferLogStore,
};
use ringline::infrastructure::telephony::{HttpTelephonyClient, HttpVoiceAgentClient};
use ringline::interface::api::{build_router, init_metrics, AppState};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber;

#[cfg(feature = "postgres")]
use ringline::infrastructure::persistence::{
    create_pool, run_migrations, DatabaseConfig, PgCallStore, PgForwardStore, PgNumberStore,
    PgRoutingStore, PgTransferLogStore,
};

struct Stores {
    routing: Arc<dyn RoutingStore>,
    forwards: Arc<dyn ForwardStore>,
    transfers: Arc<dyn TransferLogStore>,
    calls: Arc<dyn CallStore>,
    numbers: Arc<dyn NumberStore>,
}

fn memory_stores() -> Stores {
    Stores {
        routing: Arc::new(MemoryRoutingStore::new()),
        forwards: Arc::new(MemoryForwardStore::new()),
        transfers: Arc::new(MemoryTransferLogStore::new()),
        calls: Arc::new(MemoryCallStore::new()),
        numbers: Arc::new(MemoryNumberStore::new()),
    }
}

/// Connect the durable backend, falling back to memory when it is
/// unreachable. Degraded-but-available beats fully down, but the fallback
/// has to be unmissable in the logs.
#[cfg(feature = "postgres")]
async fn init_stores(config: &Config) -> Stores {
    let db_config = DatabaseConfig {
        url: config.database.url.clone(),
        ..Default::default()
    };

    let pool = match create_pool(&db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("FALLING BACK TO IN-MEMORY STORES; ALL STATE IS EPHEMERAL");
            return memory_stores();
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        error!("Failed to run migrations: {}", e);
        error!("FALLING BACK TO IN-MEMORY STORES; ALL STATE IS EPHEMERAL");
        return memory_stores();
    }

    Stores {
        routing: Arc::new(PgRoutingStore::new(pool.clone())),
        forwards: Arc::new(PgForwardStore::new(pool.clone())),
        transfers: Arc::new(PgTransferLogStore::new(pool.clone())),
        calls: Arc::new(PgCallStore::new(pool.clone())),
        numbers: Arc::new(PgNumberStore::new(pool)),
    }
}

#[cfg(not(feature = "postgres"))]
async fn init_stores(_config: &Config) -> Stores {
    info!("Durable storage disabled at build time; using in-memory stores");
    memory_stores()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting Ringline call routing service");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load configuration ({}); using defaults", e);
        Config::default()
    });
    if config.telephony.auth_token.is_empty() {
        warn!("No telephony auth token configured; webhook signature validation is DISABLED");
    }

    let prometheus_handle = init_metrics();

    let stores = init_stores(&config).await;

    let resolver = Arc::new(RoutingResolver::new(
        stores.numbers.clone(),
        stores.routing.clone(),
        stores.forwards.clone(),
        &config.routing.default_country,
        &config.routing.default_timezone,
    ));

    let telephony = Arc::new(HttpTelephonyClient::new(
        &config.telephony.api_base,
        &config.telephony.account_sid,
        &config.telephony.auth_token,
    ));
    let voice_agent = Arc::new(HttpVoiceAgentClient::new(
        &config.voice_agent.api_base,
        &config.voice_agent.api_key,
        config.voice_agent.request_timeout_secs,
    ));

    let orchestrator = Arc::new(TransferOrchestrator::new(
        stores.transfers.clone(),
        stores.calls.clone(),
        stores.forwards.clone(),
        stores.routing.clone(),
        telephony,
        voice_agent,
        CallbackUrls::new(&config.server.public_base_url),
        &config.routing.default_country,
    ));

    let state = AppState {
        resolver,
        orchestrator,
        routing: stores.routing,
        forwards: stores.forwards,
        numbers: stores.numbers,
        auth_token: config.telephony.auth_token.clone(),
        public_base_url: config.server.public_base_url.clone(),
        warm_transfer_secret: config.warm_transfer.secret.clone(),
    };

    let app = build_router(state, prometheus_handle);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Ringline stopped");
    Ok(())
}
