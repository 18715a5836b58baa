//! Content aggregator service
//!
//! This is the main entry point for the application.

use anyhow::{Context, Result};
use content_aggregator::{
    cache::{Cache, LocalCache, RedisCache},
    config::{CacheBackend, Settings},
    metrics::Metrics,
    network::HttpClient,
    providers::{ensure_providers, AdapterLoader, ProviderManager},
    ratelimit::{InboundLimiter, LocalKeyedLimiter, RedisWindowLimiter},
    scoring::ScoringService,
    search::SearchService,
    storage::{ContentStore, MemoryStore, PgStore, ProviderStore, SearchStore},
    web::{create_router, AppState},
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Sync,
    Rescore,
}

struct Args {
    mode: Mode,
    config: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut args = Args {
        mode: Mode::Serve,
        config: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "serve" => args.mode = Mode::Serve,
            "sync" => args.mode = Mode::Sync,
            "rescore" => args.mode = Mode::Rescore,
            "-c" | "--config" => args.config = Some(PathBuf::from(iter.next()?)),
            "-V" | "--version" => {
                println!("content-aggregator {}", content_aggregator::VERSION);
                std::process::exit(0);
            }
            _ => return None,
        }
    }
    Some(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let Some(args) = parse_args() else {
        print_usage();
        return Ok(());
    };

    info!("Starting content-aggregator v{}", content_aggregator::VERSION);

    let settings = load_settings(args.config)?;
    settings.validate().context("invalid settings")?;

    let stores = open_storage(&settings).await?;
    let redis = connect_redis(&settings).await;
    let metrics = Arc::new(Metrics::new());

    let manager = Arc::new(ProviderManager::new(
        stores.providers.clone(),
        stores.contents.clone(),
        metrics.clone(),
    ));
    if args.mode != Mode::Rescore {
        register_providers(&settings, &stores, &manager).await?;
    }

    match args.mode {
        Mode::Sync => {
            let synced = manager.fetch_all().await;
            if let Err(ref e) = synced {
                error!("Sync incomplete: {}", e);
            }
            let report = ScoringService::new(stores.contents.clone()).rescore_all().await?;
            info!("Rescored {} items ({} failed)", report.scored, report.failed);
            synced?;
            Ok(())
        }
        Mode::Rescore => {
            let report = ScoringService::new(stores.contents.clone()).rescore_all().await?;
            info!("Rescored {} items ({} failed)", report.scored, report.failed);
            Ok(())
        }
        Mode::Serve => serve(settings, stores, redis, manager, metrics).await,
    }
}

struct Stores {
    providers: Arc<dyn ProviderStore>,
    contents: Arc<dyn ContentStore>,
    search: Arc<dyn SearchStore>,
}

async fn open_storage(settings: &Settings) -> Result<Stores> {
    if settings.database.is_configured() {
        let store = Arc::new(
            PgStore::connect(&settings.database.url, settings.database.max_connections).await?,
        );
        if settings.database.run_migrations {
            store.migrate().await?;
        }
        return Ok(Stores {
            providers: store.clone(),
            contents: store.clone(),
            search: store,
        });
    }

    warn!("No database configured, content is kept in memory and lost on exit");
    let store = Arc::new(MemoryStore::new());
    Ok(Stores {
        providers: store.clone(),
        contents: store.clone(),
        search: store,
    })
}

async fn connect_redis(settings: &Settings) -> Option<ConnectionManager> {
    let url = &settings.redis.as_ref()?.url;
    let connected = async {
        let client = redis::Client::open(url.as_str())?;
        ConnectionManager::new(client).await
    };
    match connected.await {
        Ok(manager) => {
            info!("Connected to Redis");
            Some(manager)
        }
        Err(e) => {
            warn!("Redis unavailable, falling back to in-process state: {}", e);
            None
        }
    }
}

async fn register_providers(
    settings: &Settings,
    stores: &Stores,
    manager: &ProviderManager,
) -> Result<()> {
    ensure_providers(stores.providers.as_ref(), &settings.providers).await?;
    let client = HttpClient::with_settings(&settings.outgoing)?;
    for adapter in AdapterLoader::load(&settings.providers, &client) {
        manager.register(adapter).await?;
    }
    info!("Registered {} providers", settings.providers.len());
    Ok(())
}

fn build_cache(settings: &Settings, redis: Option<&ConnectionManager>) -> Result<Arc<dyn Cache>> {
    let ttl = Duration::from_secs(settings.cache.default_ttl_secs);
    match (settings.cache.backend, redis) {
        (CacheBackend::Redis, Some(conn)) => Ok(Arc::new(RedisCache::new(
            conn.clone(),
            ttl,
            Duration::from_millis(settings.cache.remote_timeout_ms),
        ))),
        (CacheBackend::Redis, None) => {
            anyhow::bail!("cache.backend is redis but Redis could not be reached")
        }
        (CacheBackend::Local, _) => Ok(Arc::new(LocalCache::new(
            ttl,
            settings.cache.max_capacity,
            Duration::from_secs(settings.cache.sweep_interval_secs),
        ))),
    }
}

fn build_limiter(
    settings: &Settings,
    redis: Option<&ConnectionManager>,
) -> Option<Arc<dyn InboundLimiter>> {
    if !settings.server.limiter {
        return None;
    }
    let limit = settings.rate_limit.requests_per_minute;
    let limiter: Arc<dyn InboundLimiter> = match redis {
        Some(conn) => Arc::new(RedisWindowLimiter::new(
            conn.clone(),
            limit,
            Duration::from_secs(settings.rate_limit.window_secs),
            Duration::from_millis(settings.rate_limit.redis_timeout_ms),
        )),
        None => Arc::new(LocalKeyedLimiter::per_minute(limit)),
    };
    Some(limiter)
}

async fn serve(
    settings: Settings,
    stores: Stores,
    redis: Option<ConnectionManager>,
    manager: Arc<ProviderManager>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let cache = build_cache(&settings, redis.as_ref())?;
    info!("Search cache backend: {}", cache.backend());
    let limiter = build_limiter(&settings, redis.as_ref());

    let search = Arc::new(SearchService::new(
        stores.search.clone(),
        stores.contents.clone(),
        cache,
        settings.search.clone(),
        metrics.clone(),
    ));

    if settings.sync.on_startup {
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.fetch_all().await {
                error!("Startup sync incomplete: {}", e);
            }
        });
    }
    if let Some(secs) = settings.sync.interval_secs.filter(|s| *s > 0) {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.fetch_all().await {
                    error!("Periodic sync incomplete: {}", e);
                }
            }
        });
        info!("Periodic sync every {}s", secs);
    }

    let addr = SocketAddr::new(settings.server.bind_address.parse()?, settings.server.port);
    let state = AppState {
        settings: Arc::new(settings),
        search,
        manager,
        providers: stores.providers,
        contents: stores.contents,
        limiter,
        metrics,
    };
    let app = create_router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
    })
    .await?;

    Ok(())
}

/// Load settings from file or use defaults
fn load_settings(explicit: Option<PathBuf>) -> Result<Settings> {
    let from_env = std::env::var("AGGREGATOR_SETTINGS_PATH").ok().map(PathBuf::from);
    if let Some(path) = explicit.or(from_env) {
        info!("Loading settings from: {}", path.display());
        let mut settings = Settings::from_file(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        settings.merge_env();
        return Ok(settings);
    }

    let paths = [
        PathBuf::from("settings.yml"),
        PathBuf::from("config/settings.yml"),
        PathBuf::from("/etc/content-aggregator/settings.yml"),
        dirs::config_dir()
            .map(|p| p.join("content-aggregator/settings.yml"))
            .unwrap_or_default(),
    ];

    for path in paths.iter() {
        if path.exists() {
            info!("Loading settings from: {}", path.display());
            let mut settings = Settings::from_file(path)?;
            settings.merge_env();
            return Ok(settings);
        }
    }

    info!("No settings file found, using defaults");
    let mut settings = Settings::default();
    settings.merge_env();
    Ok(settings)
}

/// Print usage information
fn print_usage() {
    println!(
        r#"
content-aggregator v{}
Multi-provider content ingestion, scoring and search

USAGE:
    content-aggregator [serve|sync|rescore] [OPTIONS]

MODES:
    serve      Run the HTTP API (default)
    sync       Fetch every provider once, then rescore all content
    rescore    Recompute every stored score

OPTIONS:
    -c, --config <FILE>    Path to configuration file
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    AGGREGATOR_SETTINGS_PATH                 Path to settings.yml
    AGGREGATOR_PORT                          Server port
    AGGREGATOR_BIND_ADDRESS                  Bind address
    DATABASE_URL                             Postgres URL (empty: in-memory)
    REDIS_URL                                Redis URL for cache and limiter
    AGGREGATOR_CACHE_BACKEND                 local or redis
    AGGREGATOR_RATE_LIMIT_REQUESTS_PER_MINUTE
    AGGREGATOR_SYNC_ON_STARTUP               true or false
    AGGREGATOR_PROVIDER_<NAME>_URL           Override a provider feed URL
    RUST_LOG                                 Log filter (default: info)
"#,
        content_aggregator::VERSION
    );
}
