use diesel::{
    r2d2::{ConnectionManager, Pool, PoolError},
    PgConnection,
};
use log::warn;
use std::time::Duration;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// No idle connections are opened up front, so the service starts while a database is down.
pub fn create_pool(database_url: &str, max_size: u32) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size.max(1))
        .min_idle(Some(0))
        .build(manager)
}

/// HTTP client with a per-request timeout of at least one second. If the TLS backend cannot
/// be initialised the client is built without the timeout, and that is logged.
pub fn http_client(timeout_secs: u64, purpose: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build {purpose} HTTP client, continuing without a timeout: {e}");
            reqwest::Client::new()
        })
}

/// First `max_chars` characters of `text`, for log lines.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
