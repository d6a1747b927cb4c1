use std::sync::Arc;

use crate::observability::metrics::Metrics;
use crate::store::BookingStore;

pub struct AppState {
    pub store: Arc<BookingStore>,
    pub metrics: Metrics,
    pub eta_range: (u32, u32),
}

impl AppState {
    pub fn new(event_buffer_size: usize, eta_range: (u32, u32)) -> Self {
        Self {
            store: Arc::new(BookingStore::new(event_buffer_size)),
            metrics: Metrics::new(),
            eta_range,
        }
    }
}
