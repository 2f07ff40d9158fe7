pub mod app_state;
pub mod events;

pub use app_state::AppState;
pub use events::spawn_event_logger;
