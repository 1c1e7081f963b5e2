use thiserror::Error;

#[derive(Debug, Error)]
pub enum TatkalError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Booking plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Problems with the booking plan itself. These are configuration mistakes,
/// not runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("class '{0}' has no code in parentheses, e.g. 'AC 3 Tier (3A)'")]
    ClassCode(String),

    #[error("journey date '{0}' is not in DDMMYYYY form")]
    JourneyDate(String),

    #[error("no passengers configured")]
    NoPassengers,

    #[error("{quota} quota allows at most {max} passengers, got {count}")]
    TooManyPassengers {
        quota: String,
        max: usize,
        count: usize,
    },

    #[error("passenger {0} has no name")]
    PassengerName(usize),
}

/// Errors reported by an automation surface.
///
/// "Element not found" is never an error: surface calls report it as
/// `Ok(false)`, `Ok(None)` or an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("stale element: {0}")]
    Stale(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("automation transport failed: {0}")]
    Transport(String),

    #[error("automation surface is closed")]
    Closed,

    #[error("could not launch automation surface: {0}")]
    Launch(String),
}

impl SurfaceError {
    /// Expected while a page re-renders; retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, SurfaceError::Stale(_) | SurfaceError::Timeout(_))
    }
}

/// A state handler could not complete its step.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("landmark '{0}' is not configured")]
    UnknownLandmark(String),

    #[error("required element '{0}' was not found")]
    MissingElement(String),

    #[error("train {0} not found in the results")]
    TrainNotFound(String),

    #[error("captcha on the {0} page could not be solved")]
    CaptchaUnsolved(&'static str),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("stop requested")]
    Stopped,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Solver(#[from] crate::captcha::SolverError),
}

/// Failure to read the booking site's clock.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("server time request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server time response '{0}' is not epoch milliseconds")]
    Parse(String),
}
