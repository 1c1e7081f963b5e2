use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every step the booking workflow can be in.
///
/// The order of declaration follows the workflow from launch to outcome.
/// States are grouped into [`Family`]s; crossing a family boundary discards
/// the multi-step scratch data accumulated inside the previous family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Initialized,
    Starting,
    Stopped,

    Idle,
    LoggedOut,

    LoginStarted,
    LoginEnteringCredentials,
    LoginSolvingCaptcha,
    LoginSubmitting,
    LoginSuccessful,
    LoginFailed,

    AtDashboard,
    FillingJourneyDetails,
    SubmittingJourney,

    TrainListPage,
    SelectingQuota,
    SelectingClass,
    ClickingBookNow,

    PassengerDetailsPage,
    FillingPassengerDetails,
    SubmittingPassengers,

    ReviewPage,
    ReviewSolvingCaptcha,
    ProceedingToPayment,

    PaymentPage,
    SelectingPaymentMethod,
    InitiatingPayment,
    WaitingForUpiMandate,

    BookingConfirmed,
    BookingFailed,

    Unknown,
    FatalError,
    Recovering,
}

/// A contiguous group of states sharing one scratch context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Lifecycle,
    LoggedOut,
    Login,
    Journey,
    TrainSelection,
    Passengers,
    Review,
    Payment,
    Outcome,
    Generic,
}

impl State {
    pub const ALL: [State; 33] = [
        State::Initialized,
        State::Starting,
        State::Stopped,
        State::Idle,
        State::LoggedOut,
        State::LoginStarted,
        State::LoginEnteringCredentials,
        State::LoginSolvingCaptcha,
        State::LoginSubmitting,
        State::LoginSuccessful,
        State::LoginFailed,
        State::AtDashboard,
        State::FillingJourneyDetails,
        State::SubmittingJourney,
        State::TrainListPage,
        State::SelectingQuota,
        State::SelectingClass,
        State::ClickingBookNow,
        State::PassengerDetailsPage,
        State::FillingPassengerDetails,
        State::SubmittingPassengers,
        State::ReviewPage,
        State::ReviewSolvingCaptcha,
        State::ProceedingToPayment,
        State::PaymentPage,
        State::SelectingPaymentMethod,
        State::InitiatingPayment,
        State::WaitingForUpiMandate,
        State::BookingConfirmed,
        State::BookingFailed,
        State::Unknown,
        State::FatalError,
        State::Recovering,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Initialized => "INITIALIZED",
            State::Starting => "STARTING",
            State::Stopped => "STOPPED",
            State::Idle => "IDLE",
            State::LoggedOut => "LOGGED_OUT",
            State::LoginStarted => "LOGIN_STARTED",
            State::LoginEnteringCredentials => "LOGIN_ENTERING_CREDENTIALS",
            State::LoginSolvingCaptcha => "LOGIN_SOLVING_CAPTCHA",
            State::LoginSubmitting => "LOGIN_SUBMITTING",
            State::LoginSuccessful => "LOGIN_SUCCESSFUL",
            State::LoginFailed => "LOGIN_FAILED",
            State::AtDashboard => "AT_DASHBOARD",
            State::FillingJourneyDetails => "FILLING_JOURNEY_DETAILS",
            State::SubmittingJourney => "SUBMITTING_JOURNEY",
            State::TrainListPage => "TRAIN_LIST_PAGE",
            State::SelectingQuota => "SELECTING_QUOTA",
            State::SelectingClass => "SELECTING_CLASS",
            State::ClickingBookNow => "CLICKING_BOOK_NOW",
            State::PassengerDetailsPage => "PASSENGER_DETAILS_PAGE",
            State::FillingPassengerDetails => "FILLING_PASSENGER_DETAILS",
            State::SubmittingPassengers => "SUBMITTING_PASSENGERS",
            State::ReviewPage => "REVIEW_PAGE",
            State::ReviewSolvingCaptcha => "REVIEW_SOLVING_CAPTCHA",
            State::ProceedingToPayment => "PROCEEDING_TO_PAYMENT",
            State::PaymentPage => "PAYMENT_PAGE",
            State::SelectingPaymentMethod => "SELECTING_PAYMENT_METHOD",
            State::InitiatingPayment => "INITIATING_PAYMENT",
            State::WaitingForUpiMandate => "WAITING_FOR_UPI_MANDATE",
            State::BookingConfirmed => "BOOKING_CONFIRMED",
            State::BookingFailed => "BOOKING_FAILED",
            State::Unknown => "UNKNOWN",
            State::FatalError => "FATAL_ERROR",
            State::Recovering => "RECOVERING",
        }
    }

    pub fn family(self) -> Family {
        match self {
            State::Initialized | State::Starting | State::Stopped | State::Idle => Family::Lifecycle,
            State::LoggedOut => Family::LoggedOut,
            State::LoginStarted
            | State::LoginEnteringCredentials
            | State::LoginSolvingCaptcha
            | State::LoginSubmitting
            | State::LoginSuccessful
            | State::LoginFailed => Family::Login,
            State::AtDashboard | State::FillingJourneyDetails | State::SubmittingJourney => {
                Family::Journey
            }
            State::TrainListPage
            | State::SelectingQuota
            | State::SelectingClass
            | State::ClickingBookNow => Family::TrainSelection,
            State::PassengerDetailsPage
            | State::FillingPassengerDetails
            | State::SubmittingPassengers => Family::Passengers,
            State::ReviewPage | State::ReviewSolvingCaptcha | State::ProceedingToPayment => {
                Family::Review
            }
            State::PaymentPage
            | State::SelectingPaymentMethod
            | State::InitiatingPayment
            | State::WaitingForUpiMandate => Family::Payment,
            State::BookingConfirmed | State::BookingFailed => Family::Outcome,
            State::Unknown | State::FatalError | State::Recovering => Family::Generic,
        }
    }

    /// Reaching one of these ends the session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            State::BookingConfirmed | State::BookingFailed | State::FatalError | State::Stopped
        )
    }

    /// Whether seeing the logged-out landmark from this state is expected.
    ///
    /// Anything else means the remote site terminated the session on its own
    /// and the watchdog reports it.
    pub fn tolerates_logout(self) -> bool {
        matches!(
            self,
            State::Initialized
                | State::Starting
                | State::Idle
                | State::LoggedOut
                | State::LoginStarted
                | State::LoginFailed
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| format!("unknown state: {s}"))
    }
}
