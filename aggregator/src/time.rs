use chrono::{DateTime, Utc};

pub trait TimeSource {
    // Ingestion time, used when a publisher omits the event timestamp
    fn current_time(&self) -> DateTime<Utc>;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
