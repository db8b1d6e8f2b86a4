use clap::{Parser, Subcommand};
use leadscout_gateway::{AuthConfig, GatewayServer, RateLimits, TieredRateLimiter, WebhookNotifier};
use leadscout_orchestrator::{Orchestrator, OrchestratorConfig, RetryPolicy, SweepConfig, Sweeper};
use leadscout_platforms::{demo_catalog, AdapterRegistry, PlatformAdapter, PlatformLimits};
use leadscout_store::{ExportStore, MemoryJobStore, ResultStore};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leadscout", about = "LeadScout — lead discovery and enrichment pipeline")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "leadscout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the job API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List configured platforms and their capabilities
    Platforms,
}

#[derive(Deserialize)]
struct LeadScoutConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    security: SecurityConfig,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    sweeper: SweeperConfig,
    #[serde(default)]
    exports: ExportsConfig,
    #[serde(default)]
    platforms: PlatformsConfig,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize)]
struct SecurityConfig {
    #[serde(default)]
    api_keys: Vec<String>,
    #[serde(default = "default_submit_burst")]
    submit_burst: f64,
    #[serde(default = "default_submit_per_second")]
    submit_per_second: f64,
    #[serde(default = "default_read_burst")]
    read_burst: f64,
    #[serde(default = "default_read_per_second")]
    read_per_second: f64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: vec![],
            submit_burst: default_submit_burst(),
            submit_per_second: default_submit_per_second(),
            read_burst: default_read_burst(),
            read_per_second: default_read_per_second(),
        }
    }
}

#[derive(Deserialize)]
struct EngineConfig {
    #[serde(default = "default_max_active_jobs")]
    max_active_jobs: usize,
    #[serde(default = "default_discovery_workers")]
    discovery_workers: usize,
    #[serde(default = "default_enrichment_workers")]
    enrichment_workers: usize,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    backoff_max_ms: u64,
    #[serde(default = "default_task_timeout_secs")]
    task_timeout_secs: u64,
    #[serde(default = "default_job_staleness_secs")]
    job_staleness_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_active_jobs: default_max_active_jobs(),
            discovery_workers: default_discovery_workers(),
            enrichment_workers: default_enrichment_workers(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            job_staleness_secs: default_job_staleness_secs(),
        }
    }
}

impl EngineConfig {
    fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_active_jobs: self.max_active_jobs,
            discovery_workers: self.discovery_workers,
            enrichment_workers: self.enrichment_workers,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff_base_ms: self.backoff_base_ms,
                backoff_max_ms: self.backoff_max_ms,
            },
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            job_staleness_timeout: Duration::from_secs(self.job_staleness_secs),
        }
    }
}

#[derive(Deserialize)]
struct SweeperConfig {
    #[serde(default = "default_sweep_interval_secs")]
    interval_secs: u64,
    #[serde(default = "default_purge_schedule")]
    purge_schedule: String,
    #[serde(default = "default_job_retention_days")]
    job_retention_days: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            purge_schedule: default_purge_schedule(),
            job_retention_days: default_job_retention_days(),
        }
    }
}

impl SweeperConfig {
    fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.interval_secs),
            purge_schedule: self.purge_schedule.clone(),
            job_retention: Duration::from_secs(self.job_retention_days * 24 * 3600),
        }
    }
}

#[derive(Deserialize)]
struct ExportsConfig {
    #[serde(default = "default_exports_enabled")]
    enabled: bool,
    #[serde(default = "default_export_ttl_hours")]
    ttl_hours: u64,
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            enabled: default_exports_enabled(),
            ttl_hours: default_export_ttl_hours(),
        }
    }
}

#[derive(Deserialize)]
struct PlatformsConfig {
    /// Subset of the demo catalog to register; absent means all of it.
    #[serde(default)]
    enabled: Option<Vec<leadscout_core::Platform>>,
    #[serde(default = "default_requests_per_second")]
    requests_per_second: f64,
    #[serde(default = "default_burst")]
    burst: u32,
    #[serde(default = "default_max_concurrency")]
    max_concurrency: usize,
    #[serde(default = "default_adapter_timeout_secs")]
    timeout_secs: u64,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_adapter_timeout_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_submit_burst() -> f64 {
    5.0
}
fn default_submit_per_second() -> f64 {
    1.0
}
fn default_read_burst() -> f64 {
    50.0
}
fn default_read_per_second() -> f64 {
    10.0
}
fn default_max_active_jobs() -> usize {
    5
}
fn default_discovery_workers() -> usize {
    4
}
fn default_enrichment_workers() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_task_timeout_secs() -> u64 {
    120
}
fn default_job_staleness_secs() -> u64 {
    600
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_purge_schedule() -> String {
    // daily at midnight
    "0 0 0 * * * *".to_string()
}
fn default_job_retention_days() -> u64 {
    7
}
fn default_exports_enabled() -> bool {
    true
}
fn default_export_ttl_hours() -> u64 {
    24
}
fn default_requests_per_second() -> f64 {
    5.0
}
fn default_burst() -> u32 {
    10
}
fn default_max_concurrency() -> usize {
    4
}
fn default_adapter_timeout_secs() -> u64 {
    30
}

fn build_registry(config: &PlatformsConfig) -> AdapterRegistry {
    let limits = PlatformLimits {
        requests_per_second: config.requests_per_second,
        burst: config.burst,
        max_concurrency: config.max_concurrency,
        timeout: Duration::from_secs(config.timeout_secs),
    };
    let mut registry = AdapterRegistry::new();
    for adapter in demo_catalog() {
        if let Some(enabled) = &config.enabled {
            if !enabled.contains(&adapter.descriptor().platform) {
                continue;
            }
        }
        registry.register(adapter, limits);
    }
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load config
    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: LeadScoutConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            info!("Starting LeadScout API on {}:{}", host, port);

            let registry = build_registry(&config.platforms);
            info!(
                platforms = registry.platforms().len(),
                "platform catalog registered"
            );

            let exports = if config.exports.enabled {
                let store = ExportStore::new(
                    config.data_dir.join("exports"),
                    Duration::from_secs(config.exports.ttl_hours * 3600),
                )
                .await?;
                Some(Arc::new(store))
            } else {
                None
            };

            let engine = Arc::new(
                Orchestrator::new(
                    config.engine.to_orchestrator_config(),
                    Arc::new(MemoryJobStore::new()),
                    Arc::new(ResultStore::new()),
                    Arc::new(registry),
                )
                .with_observer(Arc::new(WebhookNotifier::new())),
            );
            let _engine_handle = engine.start()?;

            let mut sweeper = Sweeper::new(engine.clone(), config.sweeper.to_sweep_config());
            if let Some(store) = &exports {
                sweeper = sweeper.with_exports(store.clone());
            }
            let _sweeper_handle = sweeper.start()?;

            let limiter = Arc::new(TieredRateLimiter::new(RateLimits {
                submit_burst: config.security.submit_burst,
                submit_per_second: config.security.submit_per_second,
                read_burst: config.security.read_burst,
                read_per_second: config.security.read_per_second,
            }));
            let auth_config = AuthConfig::new(config.security.api_keys.clone());
            if auth_config.is_enabled() {
                info!(keys = config.security.api_keys.len(), "API key auth enabled");
            }

            let app =
                GatewayServer::build_with_middleware(engine, exports, Some(limiter), auth_config);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("LeadScout API listening on {}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Platforms => {
            let registry = build_registry(&config.platforms);
            let platforms = registry.platforms();
            if platforms.is_empty() {
                println!("No platforms configured.");
                println!("Enable platforms in leadscout.toml under [platforms]");
            } else {
                let discovery = registry.discovery_platforms();
                let enrichment = registry.enrichment_platforms();
                println!("Configured platforms:");
                for platform in &platforms {
                    let capabilities =
                        match (discovery.contains(platform), enrichment.contains(platform)) {
                            (true, true) => "discovery, enrichment",
                            (true, false) => "discovery",
                            (false, true) => "enrichment",
                            (false, false) => "none",
                        };
                    println!("  {platform:<16} {capabilities}");
                }
                println!("\nTotal: {} platform(s)", platforms.len());
            }
        }
    }

    Ok(())
}
