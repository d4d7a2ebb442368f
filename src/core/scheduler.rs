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

//! Periodic collection loop.
//!
//! Performs one warm collection immediately, then sleeps `interval`
//! between iterations. Domains are analysed sequentially in declared
//! order; the snapshot is published once per iteration, after the last
//! domain, so scrapers never observe a half-updated set. Cancellation is
//! honoured between domains and during the inter-scrape sleep, keeping
//! already-completed domains in the published snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::analyzer::Analyzer;
use crate::core::health::HealthMonitor;
use crate::core::metrics::DouroMetrics;

pub struct Scheduler {
    domains: Vec<String>,
    interval: Duration,
    analyzer: Arc<Analyzer>,
    metrics: Arc<DouroMetrics>,
    health: Arc<HealthMonitor>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        domains: Vec<String>,
        interval: Duration,
        analyzer: Arc<Analyzer>,
        metrics: Arc<DouroMetrics>,
        health: Arc<HealthMonitor>,
        cancel: CancellationToken,
    ) -> Self {
        Self { domains, interval, analyzer, metrics, health, cancel }
    }

    pub async fn run(&self) {
        loop {
            self.collect_once().await;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested, stopping collection loop");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One full iteration over the enabled domains.
    pub async fn collect_once(&self) {
        info!("Collecting metrics for {} domains...", self.domains.len());
        let start = Instant::now();

        let mut results = Vec::with_capacity(self.domains.len());
        for domain in &self.domains {
            if self.cancel.is_cancelled() {
                info!("Cancellation mid-iteration, keeping {} completed domains", results.len());
                break;
            }
            results.push(self.analyzer.analyze_domain(domain).await);
        }

        let error_count: usize = results.iter().map(|info| info.errors.len()).sum();
        for info in &results {
            for (stage, message) in &info.errors {
                warn!("{} stage {} failed: {}", info.domain, stage, message);
            }
        }

        let duration = start.elapsed().as_secs_f64();
        self.metrics.update_metrics(&results, duration);
        self.health.update_scrape(duration, error_count, self.domains.len());

        info!(
            "Collection finished in {:.1}s, {} errors, metrics updated",
            duration, error_count
        );
    }
}
