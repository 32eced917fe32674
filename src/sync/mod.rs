pub mod hub;
pub mod live;
pub mod resync;

pub use hub::HistoryHub;
pub use live::{LiveSessions, SessionError};
pub use resync::{ResyncError, ResyncOutcome, ResyncRunner, ResyncSettings, ResyncTracker};
