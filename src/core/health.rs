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

//! Scrape liveness bookkeeping behind the health endpoints.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// No scrape for this long means the loop is stuck.
const STALE_SCRAPE_SECONDS: f64 = 600.0;
/// Startup grace period before a missing first scrape is a problem.
const STARTUP_GRACE_SECONDS: f64 = 300.0;

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: f64,
    pub uptime_seconds: f64,
    pub version: String,
    pub last_scrape_timestamp: Option<f64>,
    pub last_scrape_duration: Option<f64>,
    pub last_scrape_errors: usize,
    pub total_scrapes: u64,
    pub total_errors: u64,
    pub enabled_domains_count: usize,
}

#[derive(Debug, Default)]
struct ScrapeCounters {
    last_scrape_timestamp: Option<f64>,
    last_scrape_duration: Option<f64>,
    last_scrape_errors: usize,
    total_scrapes: u64,
    total_errors: u64,
    enabled_domains_count: usize,
}

pub struct HealthMonitor {
    start_timestamp: f64,
    counters: Mutex<ScrapeCounters>,
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            start_timestamp: unix_now(),
            counters: Mutex::new(ScrapeCounters::default()),
        }
    }

    /// Record a finished scrape. Called once per iteration, after the
    /// metrics snapshot has been published.
    pub fn update_scrape(&self, duration: f64, error_count: usize, domains_count: usize) {
        let mut counters = self.counters.lock().expect("health counters lock poisoned");
        counters.last_scrape_timestamp = Some(unix_now());
        counters.last_scrape_duration = Some(duration);
        counters.last_scrape_errors = error_count;
        counters.total_scrapes += 1;
        counters.total_errors += error_count as u64;
        counters.enabled_domains_count = domains_count;
    }

    pub fn status(&self) -> HealthStatus {
        self.status_at(unix_now())
    }

    /// Ready once a scrape completed, or while still inside the startup
    /// grace period.
    pub fn is_ready(&self) -> bool {
        let counters = self.counters.lock().expect("health counters lock poisoned");
        counters.last_scrape_timestamp.is_some()
            || unix_now() - self.start_timestamp < STARTUP_GRACE_SECONDS
    }

    fn status_at(&self, now: f64) -> HealthStatus {
        let counters = self.counters.lock().expect("health counters lock poisoned");
        let uptime = now - self.start_timestamp;

        let status = match counters.last_scrape_timestamp {
            Some(last) if now - last > STALE_SCRAPE_SECONDS => "unhealthy",
            Some(_) if counters.last_scrape_errors > 0 => "degraded",
            Some(_) => "healthy",
            None if uptime > STARTUP_GRACE_SECONDS => "unhealthy",
            None => "healthy",
        };

        HealthStatus {
            status: status.to_string(),
            timestamp: now,
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            last_scrape_timestamp: counters.last_scrape_timestamp,
            last_scrape_duration: counters.last_scrape_duration,
            last_scrape_errors: counters.last_scrape_errors,
            total_scrapes: counters.total_scrapes,
            total_errors: counters.total_errors,
            enabled_domains_count: counters.enabled_domains_count,
        }
    }

    #[cfg(test)]
    fn with_start_timestamp(start_timestamp: f64) -> Self {
        Self {
            start_timestamp,
            counters: Mutex::new(ScrapeCounters::default()),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
