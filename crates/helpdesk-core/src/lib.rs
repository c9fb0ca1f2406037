pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod normalize;
pub mod store;

pub use config::{load_config, validate_config, HelpdeskConfig, LoggingConfig};
pub use error::{HelpdeskError, InvalidOperation, Result, ValidationError};
pub use history::HistoryIndex;
pub use lifecycle::LifecycleController;
pub use normalize::{confirm_closed, normalize, normalize_history_entry};
pub use store::{
    apply_server_snapshot, mark_closed, FollowupOutcome, LoadOutcome, LoadState,
    TicketThreadStore,
};
