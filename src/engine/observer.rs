use std::sync::Arc;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use super::EngineContext;
use super::probe::SignalProbe;
use crate::error::SurfaceError;
use crate::state_machine::{State, StateModel};

/// Infers the workflow state from what the page shows.
///
/// Each tick closes known popups, then walks the rule table deepest-first
/// and writes the state of the first visible landmark. Nothing visible
/// leaves the state alone.
pub struct Observer {
    ctx: EngineContext,
    probe: SignalProbe,
}

impl Observer {
    pub fn new(ctx: EngineContext) -> Self {
        let probe = SignalProbe::new(
            Arc::clone(&ctx.surface),
            ctx.config.landmarks.clone(),
            ctx.settings().probe_timeout(),
        );
        Self { ctx, probe }
    }

    fn model(&self) -> &StateModel {
        &self.ctx.model
    }

    pub async fn run(self) {
        let mut ticker = interval(self.ctx.settings().observer_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.ctx.stop.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(_) => {}
                        Err(e) if e.is_transient() => {
                            debug!(instance = self.ctx.instance_id, error = %e, "observer tick aborted");
                        }
                        Err(e) => {
                            warn!(instance = self.ctx.instance_id, error = %e, "observer tick failed");
                        }
                    }
                }
            }
        }
        debug!(instance = self.ctx.instance_id, "observer stopped");
    }

    /// One inference pass. Returns the state the page points at, if any.
    pub async fn tick(&self) -> Result<Option<State>, SurfaceError> {
        for popup in &self.ctx.config.observer.popups {
            if self.probe.dismiss(popup).await {
                self.model().note(format!("Dismissed popup: {popup}"));
            }
        }

        let rules = &self.ctx.config.observer.rules;
        let Some(rule) = self.probe.first_match(rules).await? else {
            return Ok(None);
        };

        let previous = self.model().read();
        if previous.is_terminal() {
            return Ok(Some(rule.state));
        }
        if rule.watchdog && previous != rule.state && !previous.tolerates_logout() {
            self.model().note_error(format!(
                "WATCHDOG: unexpected logout detected while in {previous}"
            ));
        }

        if rule.hold_family {
            self.model().write_unless_family(rule.state);
        } else {
            self.model().write(rule.state);
        }
        Ok(Some(rule.state))
    }
}
