use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::panel::{ControlPanel, Session};

/// Combined application state for the web server. The session is the single
/// operator session; every request takes the lock for its whole duration.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub panel: Arc<ControlPanel>,
    pub settle_delay: Duration,
}

impl AppState {
    pub fn new(session: Session, panel: ControlPanel, settle_delay: Duration) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            panel: Arc::new(panel),
            settle_delay,
        }
    }
}
