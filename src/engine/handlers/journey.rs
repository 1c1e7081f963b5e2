use async_trait::async_trait;

use super::StateHandler;
use crate::clock::booking_window_opens;
use crate::engine::EngineContext;
use crate::error::HandlerError;
use crate::state_machine::State;
use crate::surface::names;

/// AT_DASHBOARD: fill the journey search form and submit it, waiting for
/// the booking window first when the plan is timed.
pub struct SearchJourney;

#[async_trait]
impl StateHandler for SearchJourney {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let model = &ctx.model;
        if !model.advance(State::AtDashboard, State::FillingJourneyDetails) {
            return Ok(());
        }
        let train = &ctx.plan.template.train;
        let date = train.form_date()?;
        let suggestion = ctx.landmark(names::AUTOCOMPLETE_OPTION)?;

        for (field, code) in [(names::JOURNEY_FROM, &train.from_code), (names::JOURNEY_TO, &train.to_code)] {
            let input = ctx.landmark(field)?;
            ctx.require_type(&input, code).await?;
            ctx.require_click(&suggestion).await?;
        }

        let date_input = ctx.landmark(names::JOURNEY_DATE)?;
        if !ctx.surface.set_value(&date_input, &date).await? {
            return Err(HandlerError::MissingElement(date_input.name));
        }
        model.note(format!("Journey {} -> {} on {date}", train.from_code, train.to_code));

        let preferences = &ctx.plan.template.preferences;
        if preferences.timed {
            let opens = booking_window_opens(preferences.ac);
            let target = ctx
                .clock
                .local_instant_for(opens, ctx.settings().window_shift_secs);
            model.note(format!("Waiting for booking window, firing at {}", target.format("%H:%M:%S%.3f")));
            if !ctx.clock.wait_until(target, &ctx.stop).await {
                return Err(HandlerError::Stopped);
            }
        }

        if model.advance(State::FillingJourneyDetails, State::SubmittingJourney) {
            let find = ctx.landmark(names::FIND_TRAINS)?;
            ctx.require_click(&find).await?;
        }
        Ok(())
    }
}

/// TRAIN_LIST_PAGE: filter by quota, then pick the class and book inside
/// the row of the planned train.
pub struct SelectTrain;

#[async_trait]
impl StateHandler for SelectTrain {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let model = &ctx.model;
        if !model.advance(State::TrainListPage, State::SelectingQuota) {
            return Ok(());
        }
        let train = &ctx.plan.template.train;
        let class_code = train.class_code()?;

        let quota = ctx
            .landmark(names::QUOTA_OPTION)?
            .with("quota", train.quota_id());
        ctx.require_click(&quota).await?;
        ctx.pause(ctx.settings().quota_settle()).await?;
        if !model.advance(State::SelectingQuota, State::SelectingClass) {
            return Ok(());
        }

        let rows = ctx.landmark(names::TRAIN_LIST_ITEM)?;
        let index = ctx
            .surface
            .texts(&rows)
            .await?
            .iter()
            .position(|text| text.contains(train.train_no.as_str()))
            .ok_or_else(|| HandlerError::TrainNotFound(train.train_no.clone()))?;

        let timeout = ctx.settings().click_timeout();
        let class = ctx
            .landmark(names::CLASS_OPTION)?
            .with("class_code", class_code);
        if !ctx.surface.click_within(&rows, index, &class, timeout).await? {
            return Err(HandlerError::MissingElement(class.name));
        }
        model.note(format!("Selected class {class_code} on train {}", train.train_no));

        if model.advance(State::SelectingClass, State::ClickingBookNow) {
            let book = ctx.landmark(names::BOOK_NOW)?;
            if !ctx.surface.click_within(&rows, index, &book, timeout).await? {
                return Err(HandlerError::MissingElement(book.name));
            }
        }
        Ok(())
    }
}
