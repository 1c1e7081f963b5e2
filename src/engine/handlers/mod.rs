//! Per-state steps the actor runs, one handler per workflow state.
//!
//! A handler moves the workflow forward with [`StateModel::advance`]
//! so it never overwrites a state the observer inferred in the meantime.
//! When a compare-and-set fails the handler returns quietly: the page has
//! moved on and the step no longer applies.
//!
//! [`StateModel::advance`]: crate::state_machine::StateModel::advance

mod checkout;
mod journey;
mod login;
mod passengers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use checkout::{AwaitApproval, SelectPayment, SolveReviewCaptcha};
pub use journey::{SearchJourney, SelectTrain};
pub use login::{ConfirmLogin, EnterCredentials, OpenLoginForm, SolveLoginCaptcha};
pub use passengers::FillPassengers;

use super::EngineContext;
use crate::captcha::CaptchaImage;
use crate::error::HandlerError;
use crate::state_machine::State;

#[async_trait]
pub trait StateHandler: Send + Sync {
    /// Perform the step for `state`, the state the actor read this tick.
    async fn handle(&self, ctx: &EngineContext, state: State) -> Result<(), HandlerError>;
}

/// Maps each actionable state to its handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<State, Arc<dyn StateHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full booking workflow.
    pub fn booking() -> Self {
        let credentials: Arc<dyn StateHandler> = Arc::new(EnterCredentials);
        let mut registry = Self::new();
        registry
            .register(State::LoggedOut, Arc::new(OpenLoginForm))
            .register(State::LoginStarted, Arc::clone(&credentials))
            .register(State::LoginEnteringCredentials, credentials)
            .register(State::LoginSolvingCaptcha, Arc::new(SolveLoginCaptcha))
            .register(State::LoginSubmitting, Arc::new(ConfirmLogin))
            .register(State::AtDashboard, Arc::new(SearchJourney))
            .register(State::TrainListPage, Arc::new(SelectTrain))
            .register(State::PassengerDetailsPage, Arc::new(FillPassengers))
            .register(State::ReviewPage, Arc::new(SolveReviewCaptcha))
            .register(State::PaymentPage, Arc::new(SelectPayment))
            .register(State::WaitingForUpiMandate, Arc::new(AwaitApproval));
        registry
    }

    pub fn register(&mut self, state: State, handler: Arc<dyn StateHandler>) -> &mut Self {
        self.handlers.insert(state, handler);
        self
    }

    pub fn get(&self, state: State) -> Option<Arc<dyn StateHandler>> {
        self.handlers.get(&state).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Read the captcha image named `image` and ask the shared solver for its text.
async fn read_captcha(ctx: &EngineContext, image: &str) -> Result<String, HandlerError> {
    let landmark = ctx.landmark(image)?;
    let source = ctx
        .surface
        .attribute(&landmark, "src")
        .await?
        .ok_or_else(|| HandlerError::MissingElement(landmark.name.clone()))?;
    let image = CaptchaImage::from_source(&source)
        .ok_or_else(|| HandlerError::MissingElement(landmark.name.clone()))?;
    Ok(ctx.solver.solve(&image).await?)
}
