//! Prospecting filters and sync runs

use chrono::{DateTime, Utc};
use cloudgreet_common::types::{SequenceId, TenantId};
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{ProspectFilters, ProspectSource, ProspectSyncRun, SyncRunStatus};
use cloudgreet_storage::Store;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

/// Number of runs returned by `list_runs`
pub const SYNC_RUN_HISTORY: i64 = 20;
const MAX_FILTER_VALUES: usize = 100;

/// Filter payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectFiltersInput {
    pub source: ProspectSource,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    pub company_size_min: Option<i32>,
    pub company_size_max: Option<i32>,
    pub auto_enroll_sequence_id: Option<SequenceId>,
}

fn clean_values(field: &str, values: Vec<String>) -> Result<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !cleaned.iter().any(|v| v == value) {
            cleaned.push(value.to_string());
        }
    }
    if cleaned.len() > MAX_FILTER_VALUES {
        return Err(Error::validation(format!(
            "At most {} {} are allowed",
            MAX_FILTER_VALUES, field
        )));
    }
    Ok(cleaned)
}

#[derive(Clone)]
pub struct ProspectingService {
    store: Store,
}

impl ProspectingService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Saved filters, if any
    pub async fn get_filters(&self, tenant_id: TenantId) -> Result<Option<ProspectFilters>> {
        self.store.settings.get_prospect_filters(tenant_id).await
    }

    /// Validate and replace the tenant's filters
    pub async fn save_filters(
        &self,
        tenant_id: TenantId,
        input: ProspectFiltersInput,
    ) -> Result<ProspectFilters> {
        let industries = clean_values("industries", input.industries)?;
        let locations = clean_values("locations", input.locations)?;
        let titles = clean_values("titles", input.titles)?;

        for size in [input.company_size_min, input.company_size_max].into_iter().flatten() {
            if size < 1 {
                return Err(Error::validation("Company size must be at least 1"));
            }
        }
        if let (Some(min), Some(max)) = (input.company_size_min, input.company_size_max) {
            if min > max {
                return Err(Error::validation(
                    "Minimum company size cannot exceed maximum company size",
                ));
            }
        }

        if let Some(sequence_id) = input.auto_enroll_sequence_id {
            if self
                .store
                .sequences
                .get(tenant_id, sequence_id)
                .await?
                .is_none()
            {
                return Err(Error::validation(format!(
                    "Auto-enroll sequence {} not found",
                    sequence_id
                )));
            }
        }

        let saved = self
            .store
            .settings
            .put_prospect_filters(ProspectFilters {
                tenant_id,
                source: input.source,
                industries,
                locations,
                titles,
                company_size_min: input.company_size_min,
                company_size_max: input.company_size_max,
                auto_enroll_sequence_id: input.auto_enroll_sequence_id,
                updated_at: None,
            })
            .await?;

        info!(tenant_id = %tenant_id, source = %saved.source, "Prospect filters saved");
        Ok(saved)
    }

    /// Queue an ingestion run with a snapshot of the saved filters
    pub async fn start_sync(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<ProspectSyncRun> {
        let filters = self
            .get_filters(tenant_id)
            .await?
            .ok_or_else(|| Error::validation("Save prospecting filters before starting a sync"))?;

        let snapshot = serde_json::to_value(&filters)
            .map_err(|e| Error::Internal(format!("Failed to snapshot filters: {}", e)))?;

        let run = self
            .store
            .settings
            .create_sync_run(ProspectSyncRun {
                id: Uuid::new_v4(),
                tenant_id,
                source: filters.source,
                status: SyncRunStatus::Queued,
                filters: snapshot,
                requested_at: now,
            })
            .await?;

        info!(tenant_id = %tenant_id, run_id = %run.id, source = %run.source, "Prospect sync queued");
        Ok(run)
    }

    /// Most recent runs, newest first
    pub async fn list_runs(&self, tenant_id: TenantId) -> Result<Vec<ProspectSyncRun>> {
        self.store
            .settings
            .list_sync_runs(tenant_id, SYNC_RUN_HISTORY)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input() -> ProspectFiltersInput {
        ProspectFiltersInput {
            source: ProspectSource::Apollo,
            industries: vec![" HVAC ".to_string(), "".to_string(), "HVAC".to_string()],
            locations: vec!["Austin, TX".to_string()],
            titles: vec![],
            company_size_min: Some(5),
            company_size_max: Some(50),
            auto_enroll_sequence_id: None,
        }
    }

    #[tokio::test]
    async fn test_save_cleans_lists() {
        let service = ProspectingService::new(Store::memory());
        let tenant_id = Uuid::new_v4();

        let saved = service.save_filters(tenant_id, input()).await.unwrap();
        assert_eq!(saved.industries, vec!["HVAC".to_string()]);
        assert!(saved.updated_at.is_some());
        assert_eq!(
            service.get_filters(tenant_id).await.unwrap().unwrap().locations,
            vec!["Austin, TX".to_string()]
        );
    }

    #[tokio::test]
    async fn test_save_rejects_bad_sizes_and_unknown_sequence() {
        let service = ProspectingService::new(Store::memory());
        let tenant_id = Uuid::new_v4();

        let mut bad = input();
        bad.company_size_min = Some(100);
        assert!(matches!(
            service.save_filters(tenant_id, bad).await,
            Err(Error::Validation(_))
        ));

        let mut bad = input();
        bad.auto_enroll_sequence_id = Some(Uuid::new_v4());
        assert!(matches!(
            service.save_filters(tenant_id, bad).await,
            Err(Error::Validation(_))
        ));

        assert!(service.get_filters(tenant_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_requires_filters() {
        let service = ProspectingService::new(Store::memory());
        let tenant_id = Uuid::new_v4();

        let err = service.start_sync(tenant_id, Utc::now()).await.unwrap_err();
        assert_eq!(err.to_string(), "Save prospecting filters before starting a sync");

        service.save_filters(tenant_id, input()).await.unwrap();
        let run = service.start_sync(tenant_id, Utc::now()).await.unwrap();
        assert_eq!(run.status, SyncRunStatus::Queued);
        assert_eq!(run.filters["source"], "apollo");

        let runs = service.list_runs(tenant_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run.id);
    }
}
