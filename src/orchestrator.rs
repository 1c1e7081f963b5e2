use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::StopFlag;
use crate::error::TatkalError;
use crate::plan::{BookingPlan, SessionPlan};
use crate::session::{Session, SessionReport, SessionServices};
use crate::state_machine::State;

/// Outcome of a whole fleet run.
#[derive(Debug, Clone, Default)]
pub struct FleetReport {
    /// One report per launched session, in instance order.
    pub sessions: Vec<SessionReport>,
    /// Instance ids whose credentials were incomplete.
    pub skipped: Vec<u32>,
    /// Instance ids never started because the fleet was stopped first.
    pub not_started: Vec<u32>,
    /// Why nothing was launched, when that happened.
    pub diagnostic: Option<String>,
}

impl FleetReport {
    pub fn confirmed(&self) -> usize {
        self.sessions.iter().filter(|s| s.succeeded()).count()
    }

    pub fn state_of(&self, instance_id: u32) -> Option<State> {
        self.sessions
            .iter()
            .find(|s| s.instance_id == instance_id)
            .map(|s| s.final_state)
    }
}

/// Launches independent booking sessions from one shared plan.
pub struct FleetOrchestrator {
    services: SessionServices,
    stop: StopFlag,
}

impl FleetOrchestrator {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            stop: StopFlag::new(),
        }
    }

    /// Setting this stops every session of the fleet.
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Run as many sessions as the plan's `browser_count` asks for.
    pub async fn run_plan(&self, plan: &BookingPlan) -> Result<FleetReport, TatkalError> {
        self.run(plan, plan.template.preferences.browser_count).await
    }

    /// Run up to `requested` sessions, one per login, and wait for all.
    pub async fn run(&self, plan: &BookingPlan, requested: usize) -> Result<FleetReport, TatkalError> {
        plan.template.validate()?;
        let template = Arc::new(plan.template.clone());

        let count = requested.min(plan.logins.len());
        let mut report = FleetReport::default();
        let mut launchable = Vec::with_capacity(count);
        for (instance_id, credentials) in (1u32..).zip(plan.logins.iter().take(count)) {
            if !credentials.is_complete() {
                warn!(instance = instance_id, "skipping session: incomplete credentials");
                report.skipped.push(instance_id);
                continue;
            }
            launchable.push(SessionPlan {
                instance_id,
                credentials: credentials.clone(),
                template: Arc::clone(&template),
            });
        }

        if launchable.is_empty() {
            let diagnostic = format!(
                "no sessions to launch: {requested} requested, {} login(s) configured, {} skipped",
                plan.logins.len(),
                report.skipped.len()
            );
            warn!("{diagnostic}");
            report.diagnostic = Some(diagnostic);
            return Ok(report);
        }

        info!(sessions = launchable.len(), "starting fleet");
        let stagger = self.services.config.engine.stagger();
        let mut running = Vec::with_capacity(launchable.len());
        let mut pending = launchable.into_iter();
        let mut first = true;
        while let Some(session_plan) = pending.next() {
            if !first && !self.stop.sleep(stagger).await {
                report.not_started.push(session_plan.instance_id);
                report.not_started.extend(pending.by_ref().map(|p| p.instance_id));
                info!(not_started = ?report.not_started, "fleet stopped before every session started");
                break;
            }
            first = false;
            let instance_id = session_plan.instance_id;
            let username = session_plan.credentials.username.clone();
            let session = Session::new(session_plan, self.services.clone());
            running.push((instance_id, username, tokio::spawn(session.run(self.stop.clone()))));
        }

        for (instance_id, username, handle) in running {
            match handle.await {
                Ok(session) => report.sessions.push(session),
                Err(e) => {
                    error!(instance = instance_id, error = %e, "session task failed");
                    report.sessions.push(SessionReport {
                        instance_id,
                        run_id: Uuid::nil(),
                        username,
                        final_state: State::FatalError,
                        log: Vec::new(),
                    });
                }
            }
        }

        info!(
            confirmed = report.confirmed(),
            total = report.sessions.len(),
            "fleet finished"
        );
        Ok(report)
    }
}
