use async_trait::async_trait;

use super::StateHandler;
use crate::engine::EngineContext;
use crate::error::HandlerError;
use crate::state_machine::State;
use crate::surface::names;

/// PASSENGER_DETAILS_PAGE: one form row per passenger, then the contact
/// number, then submit.
pub struct FillPassengers;

#[async_trait]
impl StateHandler for FillPassengers {
    async fn handle(&self, ctx: &EngineContext, _state: State) -> Result<(), HandlerError> {
        let model = &ctx.model;
        if !model.advance(State::PassengerDetailsPage, State::FillingPassengerDetails) {
            return Ok(());
        }
        let template = &ctx.plan.template;

        let add_row = ctx.landmark(names::ADD_PASSENGER)?;
        let name = ctx.landmark(names::PASSENGER_NAME)?;
        let age = ctx.landmark(names::PASSENGER_AGE)?;
        let gender = ctx.landmark(names::PASSENGER_GENDER)?;
        let gender_option = ctx.landmark(names::GENDER_OPTION)?;
        let berth = ctx.landmark(names::PASSENGER_BERTH)?;
        let berth_option = ctx.landmark(names::BERTH_OPTION)?;

        for (index, passenger) in template.passengers.iter().enumerate() {
            if index > 0 {
                ctx.require_click(&add_row).await?;
            }
            ctx.require_type(&name.with("index", index), &passenger.name)
                .await?;
            ctx.require_type(&age.with("index", index), &passenger.age)
                .await?;
            ctx.require_click(&gender.with("index", index)).await?;
            ctx.require_click(&gender_option.with("gender", passenger.sex.code()))
                .await?;
            if let Some(choice) = &passenger.berth {
                ctx.require_click(&berth.with("index", index)).await?;
                ctx.require_click(&berth_option.with("berth", choice)).await?;
            }
        }

        let phone = template.contact.phone.trim();
        if !phone.is_empty() {
            let mobile = ctx.landmark(names::PASSENGER_MOBILE)?;
            ctx.require_type(&mobile, phone).await?;
        }
        model.note(format!("Filled {} passenger(s)", template.passengers.len()));

        if model.advance(State::FillingPassengerDetails, State::SubmittingPassengers) {
            let submit = ctx.landmark(names::SUBMIT_PASSENGERS)?;
            ctx.require_click(&submit).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::testing::{context, fast_config};
    use crate::sim::{SimBehavior, SimPage, SimulatedSite, SimulatedSolver};

    #[tokio::test]
    async fn fills_every_passenger_and_submits() {
        let site = Arc::new(SimulatedSite::new(1, SimBehavior::default()));
        site.show(SimPage::Passengers);
        let ctx = context(site.clone(), Arc::new(SimulatedSolver::new()), fast_config());
        ctx.model.write(State::PassengerDetailsPage);

        FillPassengers
            .handle(&ctx, State::PassengerDetailsPage)
            .await
            .unwrap();

        assert_eq!(ctx.model.read(), State::SubmittingPassengers);
        assert_eq!(site.typed_count(names::PASSENGER_NAME), 2);
        assert_eq!(site.typed(names::PASSENGER_MOBILE).as_deref(), Some("9876543210"));
        assert_eq!(site.page(), SimPage::Review);
    }

    #[tokio::test]
    async fn broken_surface_fails_the_step() {
        let behavior = SimBehavior {
            broken: true,
            ..SimBehavior::default()
        };
        let site = Arc::new(SimulatedSite::new(1, behavior));
        site.show(SimPage::Passengers);
        let ctx = context(site, Arc::new(SimulatedSolver::new()), fast_config());
        ctx.model.write(State::PassengerDetailsPage);

        let err = FillPassengers
            .handle(&ctx, State::PassengerDetailsPage)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Surface(_)));
        assert_eq!(ctx.model.read(), State::FillingPassengerDetails);
    }
}
