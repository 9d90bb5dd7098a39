//! Per-scope fetch tickers owned by the daemon.
//!
//! Each scope with a non-zero interval gets one ticker task. A tick runs a
//! fetch cycle and, when it stored new posts, one translation batch. Runs are
//! spawned separately from the ticker, so replacing or aborting a ticker never
//! cancels a run that already started. A per-scope gate skips ticks while the
//! previous run is still going.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::db;
use crate::error::PipelineError;
use crate::fetch::FetchReport;
use crate::model::ScopeSettings;
use crate::service::WatchService;
use crate::translate_queue::TranslateReport;

/// What one scheduled run did. `None` means the step failed (logged) or was
/// not needed.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub fetch: Option<FetchReport>,
    pub translate: Option<TranslateReport>,
}

struct Ticker {
    minutes: u32,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    tickers: HashMap<i64, Ticker>,
    gates: HashMap<i64, Arc<Mutex<()>>>,
}

impl State {
    fn gate(&mut self, scope_id: i64) -> Arc<Mutex<()>> {
        self.gates.entry(scope_id).or_default().clone()
    }
}

const MINUTE: Duration = Duration::from_secs(60);

pub struct Scheduler {
    service: Arc<WatchService>,
    state: Mutex<State>,
    /// Wall-clock length of one interval minute.
    tick_unit: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<WatchService>) -> Self {
        Self::with_tick_unit(service, MINUTE)
    }

    /// Scheduler whose intervals are counted in `tick_unit` instead of
    /// minutes. Tests use a few milliseconds to drive real tickers.
    pub fn with_tick_unit(service: Arc<WatchService>, tick_unit: Duration) -> Self {
        Self {
            service,
            state: Mutex::new(State::default()),
            tick_unit,
        }
    }

    pub fn service(&self) -> &Arc<WatchService> {
        &self.service
    }

    /// Set a scope's interval. The old ticker is aborted and the new one
    /// spawned under the same lock, so a scope never has two tickers. An
    /// unchanged interval keeps the running ticker; 0 removes it.
    #[instrument(skip(self))]
    pub async fn configure(&self, scope_id: i64, minutes: u32) {
        let mut state = self.state.lock().await;
        if minutes == 0 {
            if let Some(old) = state.tickers.remove(&scope_id) {
                old.handle.abort();
                info!("scheduled fetching disabled");
            }
            return;
        }
        if state.tickers.get(&scope_id).is_some_and(|t| t.minutes == minutes) {
            return;
        }

        let period = self.tick_unit * minutes;
        let gate = state.gate(scope_id);
        let handle = tokio::spawn(tick_loop(self.service.clone(), gate, scope_id, period));
        if let Some(old) = state.tickers.insert(scope_id, Ticker { minutes, handle }) {
            old.handle.abort();
        }
        info!(minutes, "ticker (re)started");
    }

    /// Persist new settings, then reschedule the scope.
    pub async fn update_settings(
        &self,
        settings: ScopeSettings,
    ) -> Result<ScopeSettings, PipelineError> {
        let saved = self.service.update_settings(settings).await?;
        self.configure(saved.scope_id, saved.fetch_interval_minutes)
            .await;
        Ok(saved)
    }

    /// Reconcile tickers with the store: every known scope gets its stored
    /// (or default) interval, tickers of scopes no longer known are stopped.
    #[instrument(skip_all)]
    pub async fn sync_from_store(&self) -> Result<()> {
        let pool = self.service.pool();
        let defaults = self.service.options().defaults;
        let scopes = db::list_known_scopes(pool).await?;
        for &scope_id in &scopes {
            let settings = db::scope_settings_or_default(pool, scope_id, defaults).await?;
            self.configure(scope_id, settings.fetch_interval_minutes)
                .await;
        }

        let stale: Vec<i64> = {
            let state = self.state.lock().await;
            state
                .tickers
                .keys()
                .copied()
                .filter(|id| !scopes.contains(id))
                .collect()
        };
        for scope_id in stale {
            self.configure(scope_id, 0).await;
        }
        Ok(())
    }

    /// Run one tick for a scope now, through the same gate as the ticker.
    /// Returns `None` when a run for the scope is already in progress.
    pub async fn trigger(&self, scope_id: i64) -> Option<JoinHandle<TickOutcome>> {
        let gate = self.state.lock().await.gate(scope_id);
        spawn_gated(self.service.clone(), gate, scope_id)
    }

    /// Scopes with a live ticker and their interval in minutes.
    pub async fn active_scopes(&self) -> Vec<(i64, u32)> {
        let state = self.state.lock().await;
        let mut scopes: Vec<_> = state
            .tickers
            .iter()
            .map(|(id, t)| (*id, t.minutes))
            .collect();
        scopes.sort_unstable();
        scopes
    }

    /// Stop every ticker. Runs already spawned finish on their own.
    pub async fn shutdown(&self) {
        let tickers: Vec<Ticker> = {
            let mut state = self.state.lock().await;
            state.tickers.drain().map(|(_, t)| t).collect()
        };
        let handles: Vec<_> = tickers
            .into_iter()
            .map(|t| {
                t.handle.abort();
                t.handle
            })
            .collect();
        let count = handles.len();
        join_all(handles).await;
        info!(count, "scheduler stopped");
    }
}

async fn tick_loop(service: Arc<WatchService>, gate: Arc<Mutex<()>>, scope_id: i64, period: Duration) {
    // First tick one period from now, not immediately.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if spawn_gated(service.clone(), gate.clone(), scope_id).is_none() {
            debug!(scope_id, "previous run still in progress; tick skipped");
        }
    }
}

fn spawn_gated(
    service: Arc<WatchService>,
    gate: Arc<Mutex<()>>,
    scope_id: i64,
) -> Option<JoinHandle<TickOutcome>> {
    let guard = gate.try_lock_owned().ok()?;
    Some(tokio::spawn(async move {
        let _guard = guard;
        run_scheduled_cycle(&service, scope_id).await
    }))
}

/// Fetch, then translate once if and only if the fetch stored new posts.
#[instrument(skip(service))]
pub async fn run_scheduled_cycle(service: &WatchService, scope_id: i64) -> TickOutcome {
    let fetch = match service.fetch_now(scope_id).await {
        Ok(report) => {
            info!(summary = %report.summary(), "scheduled fetch done");
            Some(report)
        }
        Err(err) => {
            warn!(error = %err, "scheduled fetch failed");
            None
        }
    };

    let translate = match &fetch {
        Some(report) if report.inserted > 0 => match service.translate_now(scope_id, None).await {
            Ok(report) => {
                info!(summary = %report.summary(), "chained translation done");
                Some(report)
            }
            Err(err) => {
                warn!(error = %err, "chained translation failed");
                None
            }
        },
        _ => None,
    };

    TickOutcome { fetch, translate }
}
