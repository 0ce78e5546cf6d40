//! Periodic scan and purge jobs plus on-demand scan triggers.
//!
//! [`Scheduler::start`] spawns two background tasks on the current runtime:
//! an hourly full scan and a weekly purge of topics past the retention
//! window. Both stop when [`Scheduler::shutdown`] is called. A failing job is
//! logged and the loop carries on with the next tick.

use crate::config::Settings;
use crate::fetch::PageFetcher;
use crate::scanner::Scanner;
use crate::store::{Store, StoreError};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    pub scan_interval: Duration,
    pub purge_interval: Duration,
    pub retention_days: u32,
    pub scan_on_start: bool,
}

impl SchedulerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scan_interval: settings.scan_interval(),
            purge_interval: settings.purge_interval(),
            retention_days: settings.retention_days,
            scan_on_start: settings.scan_on_start,
        }
    }
}

pub struct Scheduler<F> {
    scanner: Arc<Scanner<F>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<F> Scheduler<F>
where
    F: PageFetcher + 'static,
{
    pub fn start(scanner: Arc<Scanner<F>>, store: Arc<Store>, settings: &Settings) -> Self {
        Self::start_with(scanner, store, SchedulerOptions::from_settings(settings))
    }

    pub fn start_with(scanner: Arc<Scanner<F>>, store: Arc<Store>, options: SchedulerOptions) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            scan_interval_secs = options.scan_interval.as_secs(),
            purge_interval_secs = options.purge_interval.as_secs(),
            retention_days = options.retention_days,
            scan_on_start = options.scan_on_start,
            "Starting scheduler"
        );

        let scan_task = tokio::spawn(scan_loop(
            scanner.clone(),
            options.scan_interval,
            options.scan_on_start,
            shutdown_rx.clone(),
        ));
        let purge_task = tokio::spawn(purge_loop(
            store,
            options.purge_interval,
            options.retention_days,
            shutdown_rx,
        ));

        Self {
            scanner,
            shutdown_tx,
            tasks: Mutex::new(vec![scan_task, purge_task]),
        }
    }

    /// Start a full scan in the background and return at once.
    pub fn trigger_scan(&self) -> JoinHandle<()> {
        let scanner = self.scanner.clone();
        tokio::spawn(async move {
            info!("Manual scan triggered");
            report("manual scan", scanner.scan_all().await);
        })
    }

    /// Start a competitor-only scan for `site_id` in the background.
    pub fn trigger_competitor_scan(&self, site_id: i64) -> JoinHandle<()> {
        let scanner = self.scanner.clone();
        tokio::spawn(async move {
            info!(site_id, "Manual competitor scan triggered");
            report("competitor scan", scanner.scan_competitors_of(site_id).await);
        })
    }

    pub fn trigger_competitor_scan_for_domain(&self, domain: &str) -> JoinHandle<()> {
        let scanner = self.scanner.clone();
        let domain = domain.to_string();
        tokio::spawn(async move {
            info!(domain = %domain, "Manual competitor scan triggered");
            report(
                "competitor scan",
                scanner.scan_competitors_for_domain(&domain).await,
            );
        })
    }

    /// Stop both periodic jobs and wait for them to finish. An in-flight
    /// scheduled scan is abandoned at its next suspension point.
    pub async fn shutdown(&self) {
        info!("Shutting down scheduler");
        let _ = self.shutdown_tx.send(true);

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => {
                warn!("Scheduler task list poisoned; not waiting for jobs");
                return;
            }
        };
        for res in join_all(tasks).await {
            if let Err(e) = res {
                error!(error = %e, "Scheduler job panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn scan_loop<F>(
    scanner: Arc<Scanner<F>>,
    period: Duration,
    scan_on_start: bool,
    mut shutdown: watch::Receiver<bool>,
) where
    F: PageFetcher + 'static,
{
    let first = if scan_on_start {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    res = scanner.scan_all() => report("scheduled scan", res),
                    _ = shutdown.changed() => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Scan job stopped");
}

async fn purge_loop(
    store: Arc<Store>,
    period: Duration,
    retention_days: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.purge_topics(retention_days) {
                    Ok(removed) => info!(removed, retention_days, "Purged old topics"),
                    Err(e) => error!(error = %e, "Purge failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Purge job stopped");
}

fn report<T>(job: &str, res: Result<T, StoreError>) {
    if let Err(e) = res {
        error!(job, error = %e, "Job failed");
    }
}
