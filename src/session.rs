//! One booking session: a browser, an observer, an actor and a reporter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use tracing::{info, warn};
use uuid::Uuid;

use crate::captcha::SharedSolver;
use crate::clock::ServerClock;
use crate::config::TatkalConfig;
use crate::engine::{Actor, EngineContext, HandlerRegistry, Observer, StopFlag};
use crate::plan::SessionPlan;
use crate::state_machine::{LogEntry, State, StateModel};
use crate::status::StatusSink;
use crate::surface::{AutomationSurface, SurfaceLauncher};

/// Collaborators shared by every session of a fleet.
#[derive(Clone)]
pub struct SessionServices {
    pub config: Arc<TatkalConfig>,
    pub launcher: Arc<dyn SurfaceLauncher>,
    pub solver: Arc<SharedSolver>,
    pub clock: ServerClock,
    pub sink: Arc<dyn StatusSink>,
    pub registry: Arc<HandlerRegistry>,
}

/// How a session ended.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub instance_id: u32,
    pub run_id: Uuid,
    pub username: String,
    pub final_state: State,
    pub log: Vec<LogEntry>,
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == State::BookingConfirmed
    }
}

pub struct Session {
    plan: Arc<SessionPlan>,
    services: SessionServices,
    run_id: Uuid,
    model: Arc<StateModel>,
    stop: StopFlag,
}

impl Session {
    pub fn new(plan: SessionPlan, services: SessionServices) -> Self {
        let model = Arc::new(StateModel::new(
            plan.instance_id,
            services.config.engine.log_capacity,
        ));
        Self {
            plan: Arc::new(plan),
            services,
            run_id: Uuid::new_v4(),
            model,
            stop: StopFlag::new(),
        }
    }

    pub fn instance_id(&self) -> u32 {
        self.plan.instance_id
    }

    pub fn model(&self) -> Arc<StateModel> {
        Arc::clone(&self.model)
    }

    /// Stops this session alone.
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Run until a terminal state, a stop of this session, or a stop of
    /// `parent`, then shut everything down.
    pub async fn run(self, parent: StopFlag) -> SessionReport {
        let id = self.instance_id();
        let reporter = tokio::spawn(report(
            id,
            self.model.log().subscribe(),
            Arc::clone(&self.services.sink),
        ));
        info!(instance = id, run_id = %self.run_id, user = %self.plan.credentials.username, "session starting");

        self.model.write(State::Starting);
        let headless = self.plan.template.preferences.headless;
        let surface = match self.services.launcher.launch(id, headless).await {
            Ok(surface) => surface,
            Err(e) => {
                self.model.note_error(format!("Failed to launch browser: {e}"));
                self.model.write(State::FatalError);
                return self.finish(reporter).await;
            }
        };

        let ctx = EngineContext {
            instance_id: id,
            model: Arc::clone(&self.model),
            surface: Arc::clone(&surface),
            solver: Arc::clone(&self.services.solver),
            plan: Arc::clone(&self.plan),
            config: Arc::clone(&self.services.config),
            clock: self.services.clock,
            stop: self.stop.clone(),
        };
        let observer = tokio::spawn(Observer::new(ctx.clone()).run());
        let actor = tokio::spawn(Actor::new(ctx, Arc::clone(&self.services.registry)).run());

        match surface.navigate(&self.services.config.site_url).await {
            Ok(()) => {
                self.model.advance(State::Starting, State::Idle);
            }
            Err(e) => {
                self.model.note_error(format!("Could not open {}: {e}", self.services.config.site_url));
                self.model.write(State::FatalError);
            }
        }

        self.supervise(&parent).await;
        self.shutdown(surface, [observer, actor]).await;
        self.finish(reporter).await
    }

    async fn supervise(&self, parent: &StopFlag) {
        let mut ticker = interval(self.services.config.engine.observer_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = parent.cancelled() => {
                    self.model.note("Stop requested");
                    break;
                }
                _ = ticker.tick() => {
                    if self.model.read().is_terminal() {
                        break;
                    }
                }
            }
        }
    }

    async fn shutdown(&self, surface: Arc<dyn AutomationSurface>, loops: [JoinHandle<()>; 2]) {
        let id = self.instance_id();
        let settings = &self.services.config.engine;
        self.stop.set();
        join_within(id, loops, settings.stop_timeout()).await;

        // Responses still in flight get a moment before the browser goes away.
        tokio::time::sleep(settings.release_grace()).await;
        if let Err(e) = surface.release().await {
            warn!(instance = id, error = %e, "failed to release browser");
        }
        self.model.write(State::Stopped);
    }

    async fn finish(&self, reporter: JoinHandle<()>) -> SessionReport {
        self.model.log().close_feed();
        if let Err(e) = reporter.await {
            warn!(instance = self.instance_id(), error = %e, "status reporter failed");
        }
        let final_state = self.model.read();
        info!(instance = self.instance_id(), state = %final_state, "session finished");
        SessionReport {
            instance_id: self.instance_id(),
            run_id: self.run_id,
            username: self.plan.credentials.username.clone(),
            final_state,
            log: self.model.entries(),
        }
    }
}

/// Join every loop under one shared deadline; abort whatever is left.
async fn join_within(instance_id: u32, loops: impl IntoIterator<Item = JoinHandle<()>>, limit: Duration) {
    let deadline = Instant::now() + limit;
    for mut handle in loops {
        if timeout_at(deadline, &mut handle).await.is_err() {
            warn!(instance = instance_id, "engine loop did not stop in time, aborting");
            handle.abort();
        }
    }
}

/// Drain log snapshots into the sink, skipping to the newest when behind.
async fn report(instance_id: u32, mut rx: mpsc::UnboundedReceiver<Vec<LogEntry>>, sink: Arc<dyn StatusSink>) {
    while let Some(mut snapshot) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            snapshot = newer;
        }
        if let Err(e) = sink.publish(instance_id, &snapshot).await {
            warn!(instance = instance_id, error = %e, "could not publish status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{fast_config, session_plan};
    use crate::sim::{SimBehavior, SimulatedLauncher, SimulatedSolver};
    use crate::status::ChannelSink;

    fn services(launcher: Arc<SimulatedLauncher>, sink: Arc<dyn StatusSink>) -> SessionServices {
        let mut config = fast_config();
        config.engine.release_grace_ms = 0;
        config.engine.approval_interval_ms = 10;
        SessionServices {
            config: Arc::new(config),
            launcher,
            solver: Arc::new(SharedSolver::new(Arc::new(SimulatedSolver::new()))),
            clock: ServerClock::local(),
            sink,
            registry: Arc::new(HandlerRegistry::booking()),
        }
    }

    #[tokio::test]
    async fn books_against_the_simulated_site() {
        let launcher = Arc::new(SimulatedLauncher::new(SimBehavior::default()));
        let (sink, mut rx) = ChannelSink::new();
        let session = Session::new(session_plan(), services(launcher.clone(), Arc::new(sink)));

        let report = tokio::time::timeout(std::time::Duration::from_secs(30), session.run(StopFlag::new()))
            .await
            .unwrap();

        assert_eq!(report.final_state, State::BookingConfirmed);
        assert!(report.succeeded());
        assert_eq!(launcher.site(1).unwrap().releases(), 1);

        let mut last = None;
        while let Some(update) = rx.recv().await {
            last = Some(update.state);
        }
        assert_eq!(last, Some(State::BookingConfirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_loops_share_one_deadline() {
        let stuck = || tokio::spawn(std::future::pending::<()>());
        let (first, second) = (stuck(), stuck());
        let second_abort = second.abort_handle();

        let started = Instant::now();
        join_within(1, [first, second], Duration::from_secs(5)).await;

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        while !second_abort.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn launch_failure_is_fatal() {
        let launcher = Arc::new(SimulatedLauncher::new(SimBehavior::default()).failing(1));
        let (sink, _rx) = ChannelSink::new();
        let session = Session::new(session_plan(), services(launcher, Arc::new(sink)));

        let report = session.run(StopFlag::new()).await;
        assert_eq!(report.final_state, State::FatalError);
        assert!(report.log.iter().any(|e| e.is_error && e.message.contains("launch")));
    }

    #[tokio::test]
    async fn parent_stop_ends_in_stopped() {
        let behavior = SimBehavior {
            approval_after_polls: None,
            ..SimBehavior::default()
        };
        let launcher = Arc::new(SimulatedLauncher::new(behavior));
        let (sink, _rx) = ChannelSink::new();
        let mut services = services(launcher.clone(), Arc::new(sink));
        let mut config = (*services.config).clone();
        config.engine.approval_polls = 100_000;
        services.config = Arc::new(config);
        let session = Session::new(session_plan(), services);
        let parent = StopFlag::new();

        let task = tokio::spawn(session.run(parent.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        parent.set();
        let report = tokio::time::timeout(std::time::Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.final_state, State::Stopped);
        assert_eq!(launcher.site(1).unwrap().releases(), 1);
    }
}
