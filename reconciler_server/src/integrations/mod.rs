//! Side effects of committed settlements: Redis cache invalidation and webhook notifications.
mod cache;
mod notify;

pub use cache::{user_cache_key, CacheInvalidator, USER_CACHE_PREFIX};
use log::*;
pub use notify::{NotifyError, Notifier};
use reconciliation_engine::events::{EventHandlers, EventHooks};

use crate::{config::ReconcilerConfig, errors::ServerError};

pub const EVENT_BUFFER_SIZE: usize = 50;

/// Builds the event handlers for the integrations that are configured. Handlers for unconfigured integrations are
/// simply not registered.
pub fn create_event_handlers(config: &ReconcilerConfig) -> Result<EventHandlers, ServerError> {
    let cache = match config.redis_url.as_deref() {
        Some(url) => Some(
            CacheInvalidator::new(url)
                .map_err(|e| ServerError::ConfigurationError(format!("Invalid RECON_REDIS_URL. {e}")))?,
        ),
        None => None,
    };
    let notifier = match config.notify_url.as_deref() {
        Some(url) => Some(
            Notifier::new(url, channel_tools::http_timeout_from_env())
                .map_err(|e| ServerError::InitializeError(format!("Could not create the webhook client. {e}")))?,
        ),
        None => None,
    };
    Ok(EventHandlers::new(EVENT_BUFFER_SIZE, event_hooks(cache, notifier)))
}

pub fn event_hooks(cache: Option<CacheInvalidator>, notifier: Option<Notifier>) -> EventHooks {
    let mut hooks = EventHooks::default();
    if let Some(cache) = cache {
        hooks.on_user_changed(move |ev| {
            let cache = cache.clone();
            Box::pin(async move {
                match cache.invalidate_user(ev.user_id).await {
                    Ok(()) => debug!("📬️ Cached views for user #{} invalidated ({:?})", ev.user_id, ev.reason),
                    Err(e) => warn!("📬️ Could not invalidate cached views for user #{}. {e}", ev.user_id),
                }
            })
        });
    }
    if let Some(notifier) = notifier {
        hooks.on_settlement(move |ev| {
            let notifier = notifier.clone();
            Box::pin(async move {
                match notifier.notify(&ev).await {
                    Ok(()) => debug!("📬️ Sent {} notification for [{}]", ev.event_name(), ev.track_id),
                    Err(e) => warn!("📬️ Could not send {} notification for [{}]. {e}", ev.event_name(), ev.track_id),
                }
            })
        });
    }
    hooks
}
