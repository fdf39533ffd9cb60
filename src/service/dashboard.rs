//! Admin counts and the per-user summary

use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{DashboardCounts, DashboardStore, Store, UserSummary};

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Revenue counts succeeded transactions only.
    pub async fn admin_counts(&self) -> Result<DashboardCounts> {
        self.store.dashboard_counts().await
    }

    pub async fn user_summary(&self, user_id: Uuid) -> Result<UserSummary> {
        self.store.user_summary(user_id).await
    }
}
