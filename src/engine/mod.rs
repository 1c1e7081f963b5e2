//! The reactive engine of one session: an observer that infers the workflow
//! state from landmarks and an actor that performs one step per state entry.
//!
//! Both loops share an [`EngineContext`] and coordinate only through the
//! [`StateModel`].

pub mod actor;
pub mod handlers;
pub mod observer;
pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::captcha::SharedSolver;
use crate::clock::ServerClock;
use crate::config::{EngineSettings, TatkalConfig};
use crate::error::HandlerError;
use crate::plan::SessionPlan;
use crate::state_machine::StateModel;
use crate::surface::{AutomationSurface, Landmark};

pub use actor::{Actor, TickOutcome};
pub use handlers::{HandlerRegistry, StateHandler};
pub use observer::Observer;
pub use probe::SignalProbe;

/// Cooperative stop signal shared by every task of a session (or fleet).
#[derive(Debug, Clone)]
pub struct StopFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl StopFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only ends on `true`.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration`. Returns `false` if stopped before it elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Everything a loop or a handler of one session needs.
#[derive(Clone)]
pub struct EngineContext {
    pub instance_id: u32,
    pub model: Arc<StateModel>,
    pub surface: Arc<dyn AutomationSurface>,
    pub solver: Arc<SharedSolver>,
    pub plan: Arc<SessionPlan>,
    pub config: Arc<TatkalConfig>,
    pub clock: ServerClock,
    pub stop: StopFlag,
}

impl EngineContext {
    pub fn settings(&self) -> &EngineSettings {
        &self.config.engine
    }

    pub fn landmark(&self, name: &str) -> Result<Landmark, HandlerError> {
        self.config
            .landmarks
            .get(name)
            .ok_or_else(|| HandlerError::UnknownLandmark(name.to_string()))
    }

    /// Click a landmark that must be there for the step to make sense.
    pub async fn require_click(&self, landmark: &Landmark) -> Result<(), HandlerError> {
        if self
            .surface
            .click(landmark, self.settings().click_timeout())
            .await?
        {
            Ok(())
        } else {
            Err(HandlerError::MissingElement(landmark.name.clone()))
        }
    }

    pub async fn require_type(&self, landmark: &Landmark, text: &str) -> Result<(), HandlerError> {
        if self.surface.type_into(landmark, text).await? {
            Ok(())
        } else {
            Err(HandlerError::MissingElement(landmark.name.clone()))
        }
    }

    /// Stop-aware pause inside a handler.
    pub async fn pause(&self, duration: Duration) -> Result<(), HandlerError> {
        if self.stop.sleep(duration).await {
            Ok(())
        } else {
            Err(HandlerError::Stopped)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::captcha::{CaptchaImage, CaptchaSolver, SolverError};
    use crate::error::SurfaceError;
    use crate::plan::{BookingPlan, Credentials};

    /// A surface whose visible landmarks are set by the test.
    #[derive(Default)]
    pub struct FakeSurface {
        pub visible: Mutex<HashSet<String>>,
        pub clicks: Mutex<Vec<String>>,
        pub fail_with: Mutex<Option<SurfaceError>>,
    }

    impl FakeSurface {
        pub fn showing(names: &[&str]) -> Arc<Self> {
            let surface = Self::default();
            surface.show(names);
            Arc::new(surface)
        }

        pub fn show(&self, names: &[&str]) {
            let mut visible = self.visible.lock().unwrap();
            visible.clear();
            visible.extend(names.iter().map(|n| n.to_string()));
        }

        pub fn clicked(&self) -> Vec<String> {
            self.clicks.lock().unwrap().clone()
        }

        fn check(&self) -> Result<(), SurfaceError> {
            match self.fail_with.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl AutomationSurface for FakeSurface {
        async fn is_visible(&self, landmark: &Landmark, _timeout: Duration) -> Result<bool, SurfaceError> {
            self.check()?;
            Ok(self.visible.lock().unwrap().contains(&landmark.name))
        }

        async fn click(&self, landmark: &Landmark, _timeout: Duration) -> Result<bool, SurfaceError> {
            self.check()?;
            let mut visible = self.visible.lock().unwrap();
            if visible.remove(&landmark.name) {
                self.clicks.lock().unwrap().push(landmark.name.clone());
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn click_within(
            &self,
            _container: &Landmark,
            _index: usize,
            target: &Landmark,
            timeout: Duration,
        ) -> Result<bool, SurfaceError> {
            self.click(target, timeout).await
        }

        async fn type_into(&self, _landmark: &Landmark, _text: &str) -> Result<bool, SurfaceError> {
            self.check()?;
            Ok(true)
        }

        async fn set_value(&self, _landmark: &Landmark, _value: &str) -> Result<bool, SurfaceError> {
            self.check()?;
            Ok(true)
        }

        async fn attribute(&self, _landmark: &Landmark, _name: &str) -> Result<Option<String>, SurfaceError> {
            Ok(None)
        }

        async fn texts(&self, _landmark: &Landmark) -> Result<Vec<String>, SurfaceError> {
            Ok(Vec::new())
        }

        async fn navigate(&self, _url: &str) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn current_url_contains(&self, _needle: &str) -> Result<bool, SurfaceError> {
            Ok(false)
        }

        async fn release(&self) -> Result<(), SurfaceError> {
            Ok(())
        }
    }

    pub struct NoSolver;

    #[async_trait]
    impl CaptchaSolver for NoSolver {
        async fn solve(&self, _image: &CaptchaImage) -> Result<String, SolverError> {
            Ok(String::new())
        }
    }

    pub const PLAN: &str = r#"{
        "train": {
            "from_code": "NDLS",
            "to_code": "HWH",
            "date": "25122026",
            "train_no": "12302",
            "class": "AC 3 Tier (3A)",
            "quota": "TATKAL"
        },
        "passengers": [
            { "name": "Asha Rao", "age": "34", "sex": "Female", "berth": "Lower" },
            { "name": "Vikram Rao", "age": "36", "sex": "Male" }
        ],
        "contact": { "phone": "9876543210" },
        "logins": [ { "username": "asha01", "password": "pw1" } ]
    }"#;

    pub fn session_plan() -> SessionPlan {
        let plan: BookingPlan = serde_json::from_str(PLAN).unwrap();
        SessionPlan {
            instance_id: 1,
            credentials: Credentials {
                username: "asha01".into(),
                password: "pw1".into(),
            },
            template: Arc::new(plan.template),
        }
    }

    pub fn fast_config() -> TatkalConfig {
        let mut config = TatkalConfig::default();
        config.engine.observer_tick_ms = 10;
        config.engine.actor_tick_ms = 10;
        config.engine.recovery_pause_ms = 10;
        config.engine.login_settle_ms = 10;
        config.engine.quota_settle_ms = 0;
        config.engine.click_timeout_ms = 10;
        config
    }

    pub fn context(
        surface: Arc<dyn AutomationSurface>,
        solver: Arc<dyn CaptchaSolver>,
        config: TatkalConfig,
    ) -> EngineContext {
        EngineContext {
            instance_id: 1,
            model: Arc::new(StateModel::new(1, config.engine.log_capacity)),
            surface,
            solver: Arc::new(SharedSolver::new(solver)),
            plan: Arc::new(session_plan()),
            config: Arc::new(config),
            clock: ServerClock::local(),
            stop: StopFlag::new(),
        }
    }
}
