use async_trait::async_trait;

use super::{StateHandler, read_captcha};
use crate::engine::EngineContext;
use crate::error::HandlerError;
use crate::state_machine::State;
use crate::surface::names;

/// LOGGED_OUT: open the login form.
pub struct OpenLoginForm;

#[async_trait]
impl StateHandler for OpenLoginForm {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let button = ctx.landmark(names::LOGIN_BUTTON_HOME)?;
        ctx.require_click(&button).await?;
        ctx.model.note("Opened login form");
        Ok(())
    }
}

/// LOGIN_STARTED / LOGIN_ENTERING_CREDENTIALS: type the username and
/// password once per login attempt, then hand over to the captcha step.
pub struct EnterCredentials;

#[async_trait]
impl StateHandler for EnterCredentials {
    async fn handle(&self, ctx: &EngineContext, state: State) -> Result<(), HandlerError> {
        let model = &ctx.model;
        if state == State::LoginStarted
            && !model.advance(State::LoginStarted, State::LoginEnteringCredentials)
        {
            return Ok(());
        }

        if !model.scratch(|s| s.credentials_entered) {
            let credentials = &ctx.plan.credentials;
            let username = ctx.landmark(names::USERNAME_INPUT)?;
            let password = ctx.landmark(names::PASSWORD_INPUT)?;
            ctx.require_type(&username, &credentials.username).await?;
            ctx.require_type(&password, &credentials.password).await?;
            model.scratch(|s| {
                s.credentials_entered = true;
                s.captcha_attempts = 0;
            });
            model.note(format!("Entered credentials for {}", credentials.username));
        }

        model.advance(State::LoginEnteringCredentials, State::LoginSolvingCaptcha);
        Ok(())
    }
}

/// LOGIN_SOLVING_CAPTCHA: solve and submit, or give up past the attempt limit.
///
/// An unreadable captcha is refreshed and the state bounces back through
/// LOGIN_ENTERING_CREDENTIALS, which makes the next solve a new state entry.
pub struct SolveLoginCaptcha;

#[async_trait]
impl StateHandler for SolveLoginCaptcha {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let model = &ctx.model;
        let limit = ctx.settings().captcha_attempt_limit;
        let attempts = model.scratch(|s| s.captcha_attempts);
        if attempts >= limit {
            model.note_error(format!("Login captcha failed {attempts} times, giving up"));
            model.advance(State::LoginSolvingCaptcha, State::LoginFailed);
            return Ok(());
        }

        let attempt = model.scratch(|s| {
            s.captcha_attempts += 1;
            s.captcha_attempts
        });
        let text = read_captcha(ctx, names::LOGIN_CAPTCHA_IMAGE).await?;

        if text.is_empty() {
            model.note_error(format!("Captcha attempt {attempt}/{limit} unreadable, refreshing"));
            let refresh = ctx.landmark(names::CAPTCHA_REFRESH)?;
            ctx.surface
                .click(&refresh, ctx.settings().click_timeout())
                .await?;
            model.advance(State::LoginSolvingCaptcha, State::LoginEnteringCredentials);
            return Ok(());
        }

        let input = ctx.landmark(names::LOGIN_CAPTCHA_INPUT)?;
        ctx.require_type(&input, &text).await?;
        if model.advance(State::LoginSolvingCaptcha, State::LoginSubmitting) {
            let sign_in = ctx.landmark(names::SIGN_IN_BUTTON)?;
            ctx.require_click(&sign_in).await?;
        }
        Ok(())
    }
}

/// LOGIN_SUBMITTING: decide whether the site accepted the login.
pub struct ConfirmLogin;

#[async_trait]
impl StateHandler for ConfirmLogin {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        ctx.pause(ctx.settings().login_settle()).await?;
        let model = &ctx.model;
        if model.read() != State::LoginSubmitting {
            return Ok(());
        }

        let username = ctx.landmark(names::USERNAME_INPUT)?;
        let form_open = ctx
            .surface
            .is_visible(&username, ctx.settings().probe_timeout())
            .await?;
        if form_open {
            model.note_error("Login was not accepted, solving a new captcha");
            model.advance(State::LoginSubmitting, State::LoginSolvingCaptcha);
        } else if model.advance(State::LoginSubmitting, State::LoginSuccessful) {
            model.note("Login successful");
        }
        Ok(())
    }
}
