pub mod dispatcher;
pub mod registry;

pub use dispatcher::{DispatchOutcome, HistoryDispatcher};
pub use registry::TrackedAccounts;
