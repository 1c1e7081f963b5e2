use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

use super::EngineContext;
use super::handlers::HandlerRegistry;
use crate::error::HandlerError;
use crate::state_machine::State;

/// What one actor tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The state was already acted on.
    Idle,
    /// No handler for this state; marked as acted.
    Unhandled(State),
    Handled(State),
    /// The handler failed; the session is recovering.
    Failed(State),
    /// Too many consecutive failures; the session is fatal.
    GaveUp(State),
    /// Sat on the same state too long; asked for re-inference.
    Stalled(State),
    Stopped,
}

/// Runs the handler of each state exactly once per entry into that state.
pub struct Actor {
    ctx: EngineContext,
    registry: Arc<HandlerRegistry>,
    /// Last state a handler ran for, and since when.
    marker: Option<(State, Instant)>,
    failures: u32,
}

impl Actor {
    pub fn new(ctx: EngineContext, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            ctx,
            registry,
            marker: None,
            failures: 0,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.ctx.settings().actor_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.ctx.stop.cancelled() => break,
                _ = ticker.tick() => {
                    if self.tick().await == TickOutcome::Stopped {
                        break;
                    }
                }
            }
        }
        debug!(instance = self.ctx.instance_id, "actor stopped");
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let state = self.ctx.model.read();
        if let Some((acted, since)) = self.marker
            && acted == state
        {
            return self.check_stall(state, since);
        }

        let Some(handler) = self.registry.get(state) else {
            self.mark(state);
            return TickOutcome::Unhandled(state);
        };

        debug!(instance = self.ctx.instance_id, state = %state, "running handler");
        match handler.handle(&self.ctx, state).await {
            Ok(()) => {
                self.failures = 0;
                self.mark(state);
                TickOutcome::Handled(state)
            }
            Err(HandlerError::Stopped) => TickOutcome::Stopped,
            Err(e) => self.recover(state, e).await,
        }
    }

    fn mark(&mut self, state: State) {
        self.marker = Some((state, Instant::now()));
    }

    async fn recover(&mut self, state: State, error: HandlerError) -> TickOutcome {
        let model = &self.ctx.model;
        self.marker = None;
        self.failures += 1;
        model.note_error(format!("Error in {state}: {error}"));

        let limit = self.ctx.settings().recovery_limit;
        if self.failures >= limit {
            model.note_error(format!("Giving up after {} consecutive failures", self.failures));
            model.write(State::FatalError);
            return TickOutcome::GaveUp(state);
        }

        model.write(State::Recovering);
        if !self.ctx.stop.sleep(self.ctx.settings().recovery_pause()).await {
            return TickOutcome::Stopped;
        }
        TickOutcome::Failed(state)
    }

    fn check_stall(&mut self, state: State, since: Instant) -> TickOutcome {
        let Some(limit) = self.ctx.settings().stall_timeout() else {
            return TickOutcome::Idle;
        };
        if state.is_terminal() || state == State::LoginFailed || since.elapsed() < limit {
            return TickOutcome::Idle;
        }

        self.marker = None;
        self.ctx.model.note(format!(
            "No progress in {state} for {}s, re-checking the page",
            limit.as_secs()
        ));
        self.ctx.model.write(State::Recovering);
        TickOutcome::Stalled(state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::StateHandler;
    use crate::engine::testing::{FakeSurface, NoSolver, context, fast_config};
    use crate::error::SurfaceError;

    #[derive(Default)]
    struct Counting {
        runs: AtomicU32,
    }

    #[async_trait]
    impl StateHandler for Counting {
        async fn handle(&self, _ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl StateHandler for Failing {
        async fn handle(&self, _ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
            Err(SurfaceError::Transport("socket closed".into()).into())
        }
    }

    fn actor_with(state: State, handler: Arc<dyn StateHandler>) -> Actor {
        let ctx = context(FakeSurface::showing(&[]), Arc::new(NoSolver), fast_config());
        let mut registry = HandlerRegistry::new();
        registry.register(state, handler);
        Actor::new(ctx, Arc::new(registry))
    }

    #[tokio::test]
    async fn handler_runs_once_per_state_entry() {
        let counting = Arc::new(Counting::default());
        let mut actor = actor_with(State::AtDashboard, counting.clone());
        let model = Arc::clone(&actor.ctx.model);
        model.write(State::AtDashboard);

        assert_eq!(actor.tick().await, TickOutcome::Handled(State::AtDashboard));
        for _ in 0..5 {
            assert_eq!(actor.tick().await, TickOutcome::Idle);
        }
        assert_eq!(counting.runs.load(Ordering::SeqCst), 1);

        // Leaving and re-entering the state is a new entry.
        model.write(State::TrainListPage);
        actor.tick().await;
        model.write(State::AtDashboard);
        actor.tick().await;
        assert_eq!(counting.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unhandled_state_is_marked() {
        let mut actor = actor_with(State::AtDashboard, Arc::new(Counting::default()));
        actor.ctx.model.write(State::LoginSuccessful);
        assert_eq!(actor.tick().await, TickOutcome::Unhandled(State::LoginSuccessful));
        assert_eq!(actor.tick().await, TickOutcome::Idle);
    }

    #[tokio::test]
    async fn failure_moves_to_recovering() {
        let mut actor = actor_with(State::ReviewPage, Arc::new(Failing));
        let model = Arc::clone(&actor.ctx.model);
        model.write(State::ReviewPage);

        assert_eq!(actor.tick().await, TickOutcome::Failed(State::ReviewPage));
        assert_eq!(model.read(), State::Recovering);
        let error = model.entries().into_iter().find(|e| e.is_error).unwrap();
        assert_eq!(error.state, State::ReviewPage);
        assert!(error.message.contains("socket closed"));

        // The observer re-infers the same page; the handler runs again.
        model.write(State::ReviewPage);
        assert_eq!(actor.tick().await, TickOutcome::Failed(State::ReviewPage));
    }

    #[tokio::test]
    async fn repeated_failures_become_fatal() {
        let mut actor = actor_with(State::ReviewPage, Arc::new(Failing));
        let model = Arc::clone(&actor.ctx.model);

        let mut last = TickOutcome::Idle;
        for _ in 0..10 {
            model.write(State::ReviewPage);
            last = actor.tick().await;
        }
        assert_eq!(last, TickOutcome::GaveUp(State::ReviewPage));
        assert_eq!(model.read(), State::FatalError);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_state_requests_reinference() {
        let mut actor = actor_with(State::SubmittingJourney, Arc::new(Counting::default()));
        let model = Arc::clone(&actor.ctx.model);
        model.write(State::SubmittingJourney);

        actor.tick().await;
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(actor.tick().await, TickOutcome::Idle);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(actor.tick().await, TickOutcome::Stalled(State::SubmittingJourney));
        assert_eq!(model.read(), State::Recovering);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_login_never_stalls() {
        let mut actor = actor_with(State::AtDashboard, Arc::new(Counting::default()));
        actor.ctx.model.write(State::LoginFailed);
        actor.tick().await;
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(actor.tick().await, TickOutcome::Idle);
        assert_eq!(actor.ctx.model.read(), State::LoginFailed);
    }

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let actor = actor_with(State::AtDashboard, Arc::new(Counting::default()));
        let stop = actor.ctx.stop.clone();
        let task = tokio::spawn(actor.run());
        stop.set();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
