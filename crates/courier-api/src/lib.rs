pub mod conversations;
pub mod error;
pub mod messages;
pub mod presence;
pub mod state;
pub mod users;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};
