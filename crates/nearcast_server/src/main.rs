use axum::{routing::get, Router};
use nearcast_core::memory::{MemoryBus, MemoryKv};
use nearcast_core::{ArchiveContext, Context, Endpoint, Topology};
use nearcast_server::{
    archive::SqliteArchive,
    config::ServerConfig,
    handlers::{entity_routes, GatewayState},
    redis::{RedisKv, RedisPubSub},
    sim::SimContext,
    tcp,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nearcast_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting nearcast gateway v{}", env!("CARGO_PKG_VERSION"));
    let core_config = config.topology_config();
    info!(
        "Topology: radius={}m level={} cap_height={:e}",
        core_config.search_radius_meters, core_config.topology_level, core_config.height
    );

    // Wire the backends: in-memory bus for the simulator, Redis + SQLite
    // otherwise
    let ctx: Arc<dyn Context> = if config.simulate {
        info!("Simulator mode: in-memory backends, synthetic peer traffic");
        let bus = MemoryBus::new();
        let topology = Topology::new(
            core_config,
            Arc::new(MemoryKv::new()),
            Arc::new(bus.connect()),
            Arc::new(bus.connect()),
            Arc::new(bus.connect()),
        );
        topology.run();
        SimContext::new(topology)
    } else {
        let kv = match RedisKv::connect(&config.redis_url).await {
            Ok(kv) => kv,
            Err(e) => {
                error!("Failed to connect token store to {}: {}", config.redis_url, e);
                std::process::exit(1);
            }
        };
        info!("Token store connected to {}", config.redis_url);

        let mut feeds = Vec::with_capacity(3);
        for role in ["publisher", "cell subscriber", "group subscriber"] {
            match RedisPubSub::connect(&config.redis_url).await {
                Ok(feed) => {
                    info!("{role} connected to {}", config.redis_url);
                    feeds.push(Arc::new(feed));
                }
                Err(e) => {
                    error!("Failed to connect {role} to {}: {}", config.redis_url, e);
                    std::process::exit(1);
                }
            }
        }
        let group_feed = feeds.pop().unwrap();
        let cell_feed = feeds.pop().unwrap();
        let publisher = feeds.pop().unwrap();

        let topology = Topology::new(core_config, Arc::new(kv), publisher, cell_feed, group_feed);
        topology.run();

        // a down archive degrades to token-only sessions, it never blocks
        // startup
        let archive = match SqliteArchive::open(&config.database_path) {
            Ok(archive) => archive,
            Err(e) => {
                error!("Failed to open archive: {}", e);
                std::process::exit(1);
            }
        };
        Arc::new(ArchiveContext::new(topology, Arc::new(archive)))
    };

    let endpoint = Endpoint::new(ctx);

    // Periodic expired-session sweep
    endpoint.spawn_cleaner(std::time::Duration::from_secs(config.cleanup_period_secs));

    // Binary TCP demo surface, when enabled
    if let Some(tcp_port) = config.tcp_port {
        let addr = format!("{}:{}", config.host, tcp_port);
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                let endpoint = endpoint.clone();
                tokio::spawn(async move { tcp::serve(listener, endpoint).await });
            }
            Err(e) => {
                error!("Failed to bind demo surface to {}: {}", addr, e);
                std::process::exit(1);
            }
        }
    }

    // Build the router
    let state = GatewayState {
        endpoint: endpoint.clone(),
    };
    let app = Router::new()
        .route("/", get(|| async { "nearcast gateway" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api/v1", entity_routes(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Gateway listening on http://{}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    info!("Gateway shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
