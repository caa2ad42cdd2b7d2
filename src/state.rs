use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::errors::BookingError;
use crate::models::StoredEvent;
use crate::services::payments::PaymentGateway;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub payments: Arc<dyn PaymentGateway>,
    pub events_tx: broadcast::Sender<StoredEvent>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, payments: Arc<dyn PaymentGateway>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            payments,
            events_tx,
        }
    }

    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, BookingError> {
        self.db
            .lock()
            .map_err(|_| BookingError::Internal(anyhow::anyhow!("database mutex poisoned")))
    }
}
