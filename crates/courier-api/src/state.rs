use std::sync::Arc;
use std::time::Duration;

use courier_db::Database;
use courier_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    /// Inactivity window (seconds) after which a user reads as offline.
    pub presence_window_secs: u64,
    /// Bound on store calls made from push-channel handlers.
    pub store_timeout: Duration,
}
