//! Webhook-event retention sweep.
//!
//! `webhook_events` rows coordinate replay for 30 days; older rows are
//! dead weight and get purged daily.

use crate::common::errors::AppError;
use crate::kernel::AppKernel;
use crate::store::WebhookEvent;

pub async fn cleanup_webhook_events(kernel: &AppKernel) -> Result<u64, AppError> {
    let purged = WebhookEvent::purge_older_than_retention(&kernel.db_pool).await?;
    if purged > 0 {
        tracing::info!(purged, "purged expired webhook events");
    } else {
        tracing::debug!("no webhook events past retention");
    }
    Ok(purged)
}
