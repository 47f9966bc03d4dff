//! Read-side service.
//!
//! Reads decrypt PII in memory for response shaping only; the masked form
//! is what leaves the process.

use std::time::Duration;

use uuid::Uuid;

use crate::common::errors::AppError;
use crate::common::mask::mask_document;
use crate::common::pagination::{Page, PageParams};
use crate::kernel::cache::country_stats_key;
use crate::kernel::AppKernel;
use crate::store::applications::{CountryStats, ListFilters};
use crate::store::{Application, AuditLog, PendingJob};

const STATS_CACHE_TTL: Duration = Duration::from_secs(60);

/// An application with its PII decrypted for the current request.
pub struct DecryptedApplication {
    pub application: Application,
    pub full_name: String,
    pub identity_document_masked: String,
}

#[derive(Clone)]
pub struct QueryService {
    kernel: AppKernel,
}

impl QueryService {
    pub fn new(kernel: AppKernel) -> Self {
        QueryService { kernel }
    }

    pub async fn get_application(&self, id: Uuid) -> Result<DecryptedApplication, AppError> {
        let application = Application::find_by_id(&self.kernel.db_pool, id, false)
            .await?
            .ok_or(AppError::ApplicationNotFound(id))?;
        self.decrypt_for_response(application).await
    }

    pub async fn list_applications(
        &self,
        filters: ListFilters,
        params: PageParams,
    ) -> Result<Page<DecryptedApplication>, AppError> {
        let rows = Application::list(&self.kernel.db_pool, &filters, &params).await?;
        let total = Application::count(&self.kernel.db_pool, &filters).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.decrypt_for_response(row).await?);
        }
        Ok(Page::new(items, total, &params))
    }

    pub async fn get_audit_logs(
        &self,
        application_id: Uuid,
        params: PageParams,
    ) -> Result<Page<AuditLog>, AppError> {
        self.require_application(application_id).await?;
        let rows =
            AuditLog::page_for_application(&self.kernel.db_pool, application_id, &params).await?;
        let total = AuditLog::count_for_application(&self.kernel.db_pool, application_id).await?;
        Ok(Page::new(rows, total, &params))
    }

    pub async fn get_pending_jobs(&self, application_id: Uuid) -> Result<Vec<PendingJob>, AppError> {
        self.require_application(application_id).await?;
        PendingJob::find_for_application(&self.kernel.db_pool, application_id).await
    }

    /// Per-country statistics, served read-through from the cache. The
    /// cache is best-effort: a miss or a dead backend just means a store
    /// query.
    pub async fn statistics_by_country(&self, country_code: &str) -> Result<CountryStats, AppError> {
        let country = crate::common::types::Country::parse(country_code).ok_or_else(|| {
            AppError::Validation(format!("country '{country_code}' is not supported"))
        })?;

        let cache_key = country_stats_key(country);
        if let Some(cached) = self.kernel.cache.get(&cache_key).await {
            if let Ok(stats) = serde_json::from_value::<CountryStats>(cached) {
                tracing::debug!(%country, "country statistics served from cache");
                return Ok(stats);
            }
        }

        let stats = Application::statistics_by_country(&self.kernel.db_pool, country).await?;
        if let Ok(value) = serde_json::to_value(&stats) {
            self.kernel
                .cache
                .set(&cache_key, value, STATS_CACHE_TTL)
                .await;
        }
        Ok(stats)
    }

    async fn require_application(&self, id: Uuid) -> Result<(), AppError> {
        Application::find_by_id(&self.kernel.db_pool, id, false)
            .await?
            .map(|_| ())
            .ok_or(AppError::ApplicationNotFound(id))
    }

    async fn decrypt_for_response(
        &self,
        application: Application,
    ) -> Result<DecryptedApplication, AppError> {
        let full_name = self
            .kernel
            .cipher
            .decrypt(&self.kernel.db_pool, &application.full_name)
            .await?;
        let document = self
            .kernel
            .cipher
            .decrypt(&self.kernel.db_pool, &application.identity_document)
            .await?;

        Ok(DecryptedApplication {
            identity_document_masked: mask_document(&document),
            full_name,
            application,
        })
    }
}
