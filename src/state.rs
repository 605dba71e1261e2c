use std::sync::Arc;

use crate::{
    config::AppConfig, db::OrmConn, middleware::rate_limit::RateLimiter, notify::TelegramNotifier,
};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub notifier: Option<TelegramNotifier>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(orm: OrmConn, config: AppConfig) -> Self {
        let notifier = config.telegram.as_ref().map(TelegramNotifier::new);
        Self {
            orm,
            config: Arc::new(config),
            notifier,
            rate_limiter: RateLimiter::new(),
        }
    }

    /// Fire-and-forget notification; does nothing when Telegram is not configured.
    pub fn notify(&self, text: String) {
        match &self.notifier {
            Some(notifier) => notifier.notify_in_background(text),
            None => tracing::info!("telegram not configured, notification skipped"),
        }
    }
}
