//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates backend
//! connection, ingress startup, monitoring, zone reloads and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{reload_requests, wait_for_shutdown, wait_for_shutdown_silent},
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use voice_router::{
    connect_backend, create_router, create_server, BackendClient, BackendKind, RouterServer,
    StatsSnapshot, ZoneDirectory,
};

/// How long open connections get to finish after the accept loop stops.
const DRAIN_GRACE: Duration = Duration::from_secs(3);

/// Interval of the periodic health report.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Applies command-line overrides on top of file configuration.
pub fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }

    if let Some(url) = &args.backend_url {
        config.backend.url = url.clone();
    }

    if let Some(server_id) = args.server_id {
        config.backend.server_id = Some(server_id);
    }

    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }

    if args.dry_run {
        config.backend.kind = BackendKind::Memory;
    }
}

/// Main application struct.
///
/// Owns the backend client for the whole process lifetime and the ingress
/// server in front of the router.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Where the configuration came from, re-read on SIGHUP
    config_path: PathBuf,
    /// Backend client, shut down last
    client: BackendClient,
    /// Location ingress
    server: Arc<RouterServer>,
    /// Bound ingress listener
    listener: TcpListener,
}

impl Application {
    /// Creates a new application from command-line arguments.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Connect, select and health-check the voice backend
    /// 5. Build the router and bind the ingress listener
    ///
    /// Any failure aborts startup; the router never runs without a healthy
    /// backend.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_cli_overrides(&mut config, &args);

        Self::from_config(config, args.config_path).await
    }

    /// Creates a new application from an already merged configuration.
    pub async fn from_config(
        config: AppConfig,
        config_path: PathBuf,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let router_config = config.to_router_config()?;
        let zone_table = config.zone_table();

        if router_config.backend.kind == BackendKind::Memory {
            warn!("🧪 Dry run: routing against an in-memory backend, no voice server is touched");
        } else {
            info!("🎙️ Connecting to voice backend at {}", router_config.backend.url);
        }
        let client = connect_backend(&router_config.backend, &zone_table)
            .await
            .map_err(|e| format!("Voice backend unavailable: {e}"))?;
        info!("✅ Voice backend healthy (server {})", client.server().id);

        let zones = Arc::new(ZoneDirectory::new(zone_table));
        let router = create_router(&router_config, client.clone(), zones);
        let server = Arc::new(create_server(router_config, router));
        let listener = server.bind().await?;

        Ok(Self {
            config,
            config_path,
            client,
            server,
            listener,
        })
    }

    /// The address the ingress is listening on.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until SIGINT or SIGTERM. A second signal exits immediately.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            wait_for_shutdown().await?;

            tokio::spawn(async move {
                if let Err(e) = wait_for_shutdown_silent().await {
                    error!("Failed to set up merciless shutdown signal handler: {e}");
                    return;
                }

                warn!("Shutdown handler received again! I'll make this quick.");
                std::process::exit(1);
            });
            Ok(())
        })
        .await
    }

    /// Runs until `shutdown` resolves, then shuts down gracefully.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = Result<(), Box<dyn std::error::Error>>>,
    {
        info!("🌟 Starting zonevoice");
        self.log_configuration_summary();

        let Self {
            config,
            config_path,
            client,
            server,
            listener,
        } = self;

        let server_handle = {
            let server = server.clone();
            tokio::spawn(async move {
                match server.serve(listener).await {
                    Ok(()) => info!("✅ Ingress completed successfully"),
                    Err(e) => {
                        error!("❌ Ingress error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let monitoring_handle = {
            let server = server.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_INTERVAL);
                interval.tick().await;
                let mut last = StatsSnapshot::default();

                loop {
                    interval.tick().await;

                    let stats = server.router().stats().snapshot();
                    let connections = server.connection_manager().connection_count().await;
                    info!(
                        "📊 Router Health - {} events/min | {} moves/min | {} dropped/min | {} connections",
                        stats.events_received - last.events_received,
                        stats.moves_issued - last.moves_issued,
                        stats.dropped() - last.dropped(),
                        connections
                    );
                    if stats.backend_unavailable > last.backend_unavailable
                        || stats.timeout > last.timeout
                    {
                        warn!(
                            "⚠️ Backend trouble this period: {} unavailable, {} timed out",
                            stats.backend_unavailable - last.backend_unavailable,
                            stats.timeout - last.timeout
                        );
                    }
                    server.security().cleanup().await;
                    last = stats;
                }
            })
        };

        let reload_handle = {
            let server = server.clone();
            let mut requests = reload_requests();
            tokio::spawn(async move {
                reload_zones_on_request(&mut requests, &config_path, server.router().zones())
                    .await;
            })
        };

        info!("✅ zonevoice is now running!");
        info!(
            "🎮 Ready to accept location reports on {}",
            config.server.bind_address
        );
        info!("🔍 Health monitoring active - stats every 60 seconds");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        shutdown.await?;

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        monitoring_handle.abort();
        reload_handle.abort();

        info!("📡 Phase 1: Stopping new connections...");
        server.shutdown();
        if tokio::time::timeout(Duration::from_secs(5), server_handle)
            .await
            .is_err()
        {
            warn!("⏰ Accept loop did not stop within timeout, proceeding with cleanup");
        }

        info!("⏳ Phase 2: Waiting for open connections to finish...");
        let remaining = server.drain(DRAIN_GRACE).await;
        if remaining > 0 {
            info!("⏰ {} connection(s) still open, proceeding with shutdown", remaining);
        } else {
            info!("✅ All connections closed");
        }

        info!("🔌 Phase 3: Closing voice backend...");
        client.shutdown().await;

        log_final_statistics(&server).await;

        info!("✅ zonevoice shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        match self.config.backend.kind {
            BackendKind::Websocket => info!("  🎙️ Backend: {}", self.config.backend.url),
            BackendKind::Memory => info!("  🎙️ Backend: in-memory (dry run)"),
        }
        info!("  🖥️ Voice server: {}", self.client.server().id);
        info!(
            "  ⏱️ Backend call timeout: {}ms | move retries: {}",
            self.config.backend.call_timeout_ms, self.config.backend.move_retries
        );
        info!("  🗺️ Zones ({}):", self.config.zones.len());
        for (zone, channel) in &self.config.zones {
            info!("    - {} → {}", zone, channel);
        }
        info!(
            "  👥 Max connections: {}",
            self.config.server.max_connections
        );
        info!(
            "  🛡️ Rate limiting: {} ({} frames/min per IP)",
            self.config.security.enable_rate_limiting,
            self.config.security.max_messages_per_minute
        );
    }
}

/// Re-reads the zone table each time a reload is requested.
///
/// A file that fails to load or validate leaves the current table in place.
async fn reload_zones_on_request(
    requests: &mut mpsc::Receiver<()>,
    config_path: &Path,
    zones: &ZoneDirectory,
) {
    while requests.recv().await.is_some() {
        let config = match AppConfig::read_from_file(config_path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("❌ Zone reload failed, keeping current table: {}", e);
                continue;
            }
        };
        if let Err(e) = config.validate() {
            warn!("❌ Zone reload failed, keeping current table: {}", e);
            continue;
        }
        zones.reload(config.zone_table());
    }
}

/// Logs final statistics during shutdown.
async fn log_final_statistics(server: &RouterServer) {
    let stats = server.router().stats().snapshot();
    let security = server.security().get_stats().await;

    info!("📊 Final Statistics:");
    info!("  - Uptime: {}s", stats.uptime_secs);
    info!("  - Location events received: {}", stats.events_received);
    info!("  - Moves issued: {}", stats.moves_issued);
    info!("  - Already in channel: {}", stats.already_in_channel);
    info!(
        "  - Dropped: {} (unknown zone {}, no channel {}, unknown user {}, malformed {}, unavailable {}, timeout {}, rejected {})",
        stats.dropped(),
        stats.unknown_zone,
        stats.channel_not_provisioned,
        stats.unknown_user,
        stats.malformed_event,
        stats.backend_unavailable,
        stats.timeout,
        stats.move_rejected
    );
    info!("  - Rate-limited frames: {}", security.rate_limited_frames);
}
