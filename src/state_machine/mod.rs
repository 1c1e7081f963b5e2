mod log;
mod model;
mod state;

pub(crate) use log::lock;
pub use log::{ActionLog, DEFAULT_LOG_CAPACITY, LogEntry};
pub use model::{Scratch, StateModel};
pub use state::{Family, State};
