//! The single task that owns [`AppState`].
//!
//! Timers and control requests are turned into [`Event`]s and handled one at a
//! time, so a tick body always runs to completion before anything else touches
//! the state. After each event the farming timers are re-synced against the
//! orchestrator's [`TickPlan`].

use log::{debug, info, warn};
use std::future::{pending, Future};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use crate::commands::drops::request_token_refresh;
use crate::commands::{dispatch, Command, ControlRequest};
use crate::models::settings::{AppState, MonitorSettings};
use crate::services::credentials_service::RefreshOutcome;
use crate::services::farming_service::{
    TickPlan, ADVANCE_DELAY, HEARTBEAT_INTERVAL, POINTS_INTERVAL, POINTS_REARM_DELAY,
    RECONCILE_INTERVAL,
};

pub const DETECTOR_FIRST_RUN: Duration = Duration::from_secs(30);
pub const TOKEN_REFRESH_FIRST_RUN: Duration = Duration::from_secs(60 * 60);
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(720 * 60);
/// Gives the user time to open the campaigns page after a refresh request.
pub const DEFERRED_CHECK_DELAY: Duration = Duration::from_secs(35);

#[derive(Debug)]
pub enum Event {
    DetectorTick,
    DeferredCheck,
    TokenRefreshTick,
    Heartbeat,
    Reconcile,
    Points,
    Advance,
    Control(ControlRequest),
}

fn repeating(first_run: Duration, period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + first_run, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending::<()>().await,
    }
}

async fn recv(commands: &mut Option<mpsc::Receiver<ControlRequest>>) -> Option<ControlRequest> {
    match commands {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

pub fn detector_period(settings: &MonitorSettings) -> Duration {
    Duration::from_secs(settings.check_interval.max(1) * 60)
}

/// Every timer the scheduler may be waiting on. `None` means disarmed.
pub struct TimerSet {
    detector: Option<Interval>,
    token_refresh: Option<Interval>,
    heartbeat: Option<Interval>,
    reconcile: Option<Interval>,
    points: Option<Interval>,
    armed_generation: u64,
    advance_at: Option<Instant>,
    deferred_check_at: Option<Instant>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self {
            detector: None,
            token_refresh: Some(repeating(TOKEN_REFRESH_FIRST_RUN, TOKEN_REFRESH_INTERVAL)),
            heartbeat: None,
            reconcile: None,
            points: None,
            armed_generation: 0,
            advance_at: None,
            deferred_check_at: None,
        }
    }

    pub fn arm_detector(&mut self, settings: &MonitorSettings, first_run: Duration) {
        if settings.monitoring_enabled {
            let period = detector_period(settings);
            info!("⏰ Drop checks every {} min", period.as_secs() / 60);
            self.detector = Some(repeating(first_run, period));
        } else {
            info!("⏸️ Drop monitoring disabled");
            self.detector = None;
        }
    }

    fn disarm_farming(&mut self) {
        self.heartbeat = None;
        self.reconcile = None;
        self.points = None;
    }

    /// Bring the farming timers in line with the orchestrator.
    pub fn sync_farming(&mut self, plan: &TickPlan) {
        if plan.generation != self.armed_generation {
            self.armed_generation = plan.generation;
            self.disarm_farming();
            if plan.active {
                debug!("⏰ Arming farming ticks (generation {})", plan.generation);
                self.heartbeat = Some(repeating(plan.delays.heartbeat, HEARTBEAT_INTERVAL));
                self.reconcile = Some(repeating(plan.delays.reconcile, RECONCILE_INTERVAL));
                if plan.points_enabled {
                    self.points = Some(repeating(plan.delays.points, POINTS_INTERVAL));
                }
            }
        } else if !plan.active {
            self.disarm_farming();
        } else if !plan.points_enabled {
            self.points = None;
        } else if self.points.is_none() || plan.rearm_points {
            self.points = Some(repeating(POINTS_REARM_DELAY, POINTS_INTERVAL));
        }

        if plan.advance_requested {
            self.advance_at = Some(Instant::now() + ADVANCE_DELAY);
        }
    }

    pub fn farming_armed(&self) -> bool {
        self.heartbeat.is_some() || self.reconcile.is_some() || self.points.is_some()
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Scheduler {
    state: AppState,
    timers: TimerSet,
    commands: Option<mpsc::Receiver<ControlRequest>>,
}

impl Scheduler {
    pub async fn new(mut state: AppState, commands: mpsc::Receiver<ControlRequest>) -> Self {
        let settings = state.store.settings().await.unwrap_or_else(|e| {
            warn!("⚠️ Could not read settings, using defaults: {}", e);
            MonitorSettings::default()
        });

        let mut timers = TimerSet::new();
        timers.arm_detector(&settings, DETECTOR_FIRST_RUN);
        timers.sync_farming(&state.farming.tick_plan());

        Self {
            state,
            timers,
            commands: Some(commands),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Wait for whatever fires first.
    pub async fn next_event(&mut self) -> Event {
        loop {
            let timers = &mut self.timers;
            tokio::select! {
                biased;
                request = recv(&mut self.commands) => match request {
                    Some(request) => return Event::Control(request),
                    None => {
                        debug!("Control channel closed");
                        self.commands = None;
                    }
                },
                _ = tick(&mut timers.heartbeat) => return Event::Heartbeat,
                _ = tick(&mut timers.reconcile) => return Event::Reconcile,
                _ = tick(&mut timers.points) => return Event::Points,
                _ = deadline(timers.advance_at) => return Event::Advance,
                _ = deadline(timers.deferred_check_at) => return Event::DeferredCheck,
                _ = tick(&mut timers.detector) => return Event::DetectorTick,
                _ = tick(&mut timers.token_refresh) => return Event::TokenRefreshTick,
            }
        }
    }

    pub async fn handle(&mut self, event: Event) {
        match event {
            Event::Heartbeat => self.state.farming.heartbeat().await,
            Event::Reconcile => self.state.farming.reconcile().await,
            Event::Points => self.state.farming.points_tick().await,
            Event::Advance => {
                self.timers.advance_at = None;
                let outcome = self.state.farming.advance().await;
                info!("📋 Queue advance: {:?}", outcome);
            }
            Event::DetectorTick => self.detector_tick().await,
            Event::DeferredCheck => {
                self.timers.deferred_check_at = None;
                self.run_check().await;
            }
            Event::TokenRefreshTick => match request_token_refresh(&self.state).await {
                Ok(outcome) => debug!("🔑 Scheduled token refresh: {:?}", outcome),
                Err(e) => warn!("⚠️ Token refresh failed: {}", e),
            },
            Event::Control(request) => self.handle_control(request).await,
        }

        let plan = self.state.farming.tick_plan();
        self.timers.sync_farming(&plan);
    }

    async fn detector_tick(&mut self) {
        match self.state.credentials.status().await {
            Ok(status) if status.has_credential && !status.is_expired => {}
            Ok(_) => match request_token_refresh(&self.state).await {
                Ok(RefreshOutcome::RefreshRequested) => {
                    info!(
                        "🔑 Headers missing or stale, checking in {}s",
                        DEFERRED_CHECK_DELAY.as_secs()
                    );
                    self.timers.deferred_check_at = Some(Instant::now() + DEFERRED_CHECK_DELAY);
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!("⚠️ Token refresh failed: {}", e),
            },
            Err(e) => warn!("⚠️ Could not read header status: {}", e),
        }
        self.run_check().await;
    }

    async fn run_check(&mut self) {
        let state = &mut self.state;
        let result = state.detector.check_for_new_drops(&mut state.farming).await;
        info!("🔍 Drop check: {} new ({})", result.found, result.message);
        if result.needs_headers {
            warn!("🔑 Drop check ran without valid headers");
        }
    }

    async fn handle_control(&mut self, request: ControlRequest) {
        let ControlRequest { command, reply } = request;
        let rearm_detector = matches!(&command, Command::UpdateSettings(patch) if patch.touches_schedule());

        let response = dispatch(&mut self.state, command).await;

        if rearm_detector {
            match self.state.store.settings().await {
                Ok(settings) => self.timers.arm_detector(&settings, detector_period(&settings)),
                Err(e) => warn!("⚠️ Could not re-arm drop checks: {}", e),
            }
        }

        if reply.send(response).is_err() {
            debug!("Control client went away before the reply");
        }
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("🚀 Scheduler started");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("👋 Scheduler shutting down");
                    break;
                }
                event = self.next_event() => self.handle(event).await,
            }
        }
    }
}
