use async_trait::async_trait;

use super::{StateHandler, read_captcha};
use crate::engine::EngineContext;
use crate::error::HandlerError;
use crate::plan::PaymentMethod;
use crate::state_machine::State;
use crate::surface::names;

/// REVIEW_PAGE: solve the review captcha and continue to payment.
pub struct SolveReviewCaptcha;

#[async_trait]
impl StateHandler for SolveReviewCaptcha {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let model = &ctx.model;
        if !model.advance(State::ReviewPage, State::ReviewSolvingCaptcha) {
            return Ok(());
        }

        let text = read_captcha(ctx, names::REVIEW_CAPTCHA_IMAGE).await?;
        if text.is_empty() {
            return Err(HandlerError::CaptchaUnsolved("review"));
        }
        let input = ctx.landmark(names::REVIEW_CAPTCHA_INPUT)?;
        ctx.require_type(&input, &text).await?;

        if model.advance(State::ReviewSolvingCaptcha, State::ProceedingToPayment) {
            let proceed = ctx.landmark(names::PROCEED_TO_PAY)?;
            ctx.require_click(&proceed).await?;
        }
        Ok(())
    }
}

/// PAYMENT_PAGE: choose UPI and start the payment.
pub struct SelectPayment;

#[async_trait]
impl StateHandler for SelectPayment {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let method = ctx.plan.template.preferences.payment;
        if method != PaymentMethod::Upi {
            return Err(HandlerError::Unsupported(format!(
                "payment method {method:?} is not automated"
            )));
        }

        let model = &ctx.model;
        if !model.advance(State::PaymentPage, State::SelectingPaymentMethod) {
            return Ok(());
        }
        let upi = ctx.landmark(names::UPI_OPTION)?;
        ctx.require_click(&upi).await?;

        if !model.advance(State::SelectingPaymentMethod, State::InitiatingPayment) {
            return Ok(());
        }
        let pay = ctx.landmark(names::PAY_AND_BOOK)?;
        ctx.require_click(&pay).await?;

        let upi_id = &ctx.plan.template.preferences.upi_id;
        if model.advance(State::InitiatingPayment, State::WaitingForUpiMandate) {
            if upi_id.is_empty() {
                model.note("Payment initiated, approve the UPI mandate");
            } else {
                model.note(format!("Payment initiated, approve the UPI mandate on {upi_id}"));
            }
        }
        Ok(())
    }
}

/// WAITING_FOR_UPI_MANDATE: poll for the confirmation banner.
///
/// Each poll sleeps first, so with the defaults the last check happens
/// two minutes after entry.
pub struct AwaitApproval;

#[async_trait]
impl StateHandler for AwaitApproval {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let settings = ctx.settings();
        let model = &ctx.model;
        let banner = ctx.landmark(names::PNR_BANNER)?;

        for poll in 1..=settings.approval_polls {
            ctx.pause(settings.approval_interval()).await?;
            match ctx.surface.is_visible(&banner, settings.probe_timeout()).await {
                Ok(true) => {
                    let detail = ctx.surface.texts(&banner).await.unwrap_or_default().join(" ");
                    model.note(format!("Booking confirmed on poll {poll}: {}", detail.trim()));
                    model.write(State::BookingConfirmed);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e.into()),
            }
        }

        model.note_error(format!(
            "UPI mandate not approved after {} polls",
            settings.approval_polls
        ));
        model.write(State::BookingFailed);
        Ok(())
    }
}
