/*
 * Douro - Hosting Infrastructure Exporter
 * Copyright (C) 2025 Douro Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use douro::config::{self, Cli};
use douro::core::{Analyzer, DouroMetrics, HealthMonitor, Scheduler};
use douro::probes::{
    DnsProbe, DomainWhoisProbe, HttpsProbe, IpWhoisProbe, TracerouteDriver, build_resolver,
};
use douro::region::{GeoApiClient, RegionDetector};
use douro::web;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Cli::parse();

    if let Err(e) = run(args).await {
        // Startup failures are fatal; runtime errors never reach here.
        error!("Fatal: {e:#}");
        eprintln!("douro: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = config::load_config(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    config::setup_logging(&config.monitoring)?;

    info!("Starting Douro exporter v{}", env!("CARGO_PKG_VERSION"));
    config::log_config_summary(&config);

    // Bind both ports up front so a taken port still fails startup.
    let metrics_listener = web::bind(config.exporter.port)
        .await
        .with_context(|| format!("binding exporter port {}", config.exporter.port))?;
    let health_port = config.health_port()?;
    let health_listener = web::bind(health_port)
        .await
        .with_context(|| format!("binding health port {}", health_port))?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("douro/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let resolver = Arc::new(build_resolver());

    let hop_source = Arc::new(TracerouteDriver::new(resolver.clone()));
    let region = RegionDetector::new(
        hop_source,
        Some(GeoApiClient::new(http_client.clone())),
    );
    let analyzer = Arc::new(Analyzer::new(
        Arc::new(DnsProbe::new(resolver)),
        Arc::new(DomainWhoisProbe::new()),
        Arc::new(IpWhoisProbe::new(http_client.clone())),
        Arc::new(region),
        Arc::new(HttpsProbe::new(
            http_client,
            Duration::from_secs(config.exporter.timeout_seconds),
        )),
    ));

    let metrics = Arc::new(DouroMetrics::new()?);
    let health = Arc::new(HealthMonitor::new());

    tokio::spawn({
        let metrics = metrics.clone();
        async move {
            if let Err(e) = web::run_metrics_server(metrics, metrics_listener).await {
                error!("Metrics server terminated: {}", e);
            }
        }
    });
    tokio::spawn({
        let health = health.clone();
        async move {
            if let Err(e) = web::run_health_server(health, health_listener).await {
                error!("Health server terminated: {}", e);
            }
        }
    });

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    let scheduler = Scheduler::new(
        config.enabled_domains(),
        Duration::from_secs(config.exporter.interval_seconds),
        analyzer,
        metrics,
        health,
        cancel,
    );

    info!(
        "Collection starting, interval {}s; Ctrl+C to stop",
        config.exporter.interval_seconds
    );
    scheduler.run().await;

    info!("Douro exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
