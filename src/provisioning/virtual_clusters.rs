// Virtual cluster records written by the workflow runner

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::patch::double_option;
use crate::db::repository::{
    ApplicationRepository, Repositories, VirtualClusterFilter, VirtualClusterRepository,
};
use crate::domain::{Environment, VirtualCluster, VirtualClusterStatus};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewVirtualCluster {
    pub application_id: Uuid,
    pub environment: Environment,
    #[serde(default = "default_status")]
    pub status: VirtualClusterStatus,
    #[serde(default)]
    pub advertised_host: Option<String>,
    #[serde(default)]
    pub topic_prefix: Option<String>,
}

fn default_status() -> VirtualClusterStatus {
    VirtualClusterStatus::Pending
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VirtualClusterPatch {
    pub status: Option<VirtualClusterStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub advertised_host: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub topic_prefix: Option<Option<String>>,
}

pub struct VirtualClusterService {
    applications: Arc<dyn ApplicationRepository>,
    clusters: Arc<dyn VirtualClusterRepository>,
}

impl VirtualClusterService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            applications: repos.applications.clone(),
            clusters: repos.virtual_clusters.clone(),
        }
    }

    pub async fn list(&self, filter: &VirtualClusterFilter) -> Result<Vec<VirtualCluster>> {
        self.clusters.find_by_filter(filter).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: NewVirtualCluster) -> Result<VirtualCluster> {
        if self
            .applications
            .find_by_id(input.application_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("Application"));
        }

        let mut cluster = VirtualCluster::new(input.application_id, input.environment, input.status);
        cluster.advertised_host = input.advertised_host;
        cluster.topic_prefix = input.topic_prefix;
        self.clusters.insert(&cluster).await?;

        tracing::info!(
            application_id = %cluster.application_id,
            environment = %cluster.environment,
            status = cluster.status.as_str(),
            "Virtual cluster created"
        );
        Ok(cluster)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: Uuid, patch: VirtualClusterPatch) -> Result<VirtualCluster> {
        let mut cluster = self
            .clusters
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Virtual cluster"))?;

        if let Some(status) = patch.status {
            cluster.status = status;
        }
        if let Some(host) = patch.advertised_host {
            cluster.advertised_host = host;
        }
        if let Some(prefix) = patch.topic_prefix {
            cluster.topic_prefix = prefix;
        }
        cluster.updated_at = Utc::now();
        self.clusters.update(&cluster).await?;
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::domain::Application;

    async fn service_with_app() -> (VirtualClusterService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let app = Application::new(Uuid::new_v4(), "Orders".into(), "orders".into());
        ApplicationRepository::insert(store.as_ref(), &app)
            .await
            .unwrap();
        (
            VirtualClusterService::new(&Repositories::from_store(store)),
            app.id,
        )
    }

    fn input(application_id: Uuid, environment: Environment) -> NewVirtualCluster {
        NewVirtualCluster {
            application_id,
            environment,
            status: VirtualClusterStatus::Provisioning,
            advertised_host: None,
            topic_prefix: None,
        }
    }

    #[tokio::test]
    async fn test_one_cluster_per_application_environment() {
        let (service, app) = service_with_app().await;
        service.create(input(app, Environment::Dev)).await.unwrap();
        let err = service
            .create(input(app, Environment::Dev))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        service.create(input(app, Environment::Prod)).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_for_unknown_application_is_not_found() {
        let (service, _) = service_with_app().await;
        let err = service
            .create(input(Uuid::new_v4(), Environment::Dev))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_filter_and_update() {
        let (service, app) = service_with_app().await;
        let dev = service.create(input(app, Environment::Dev)).await.unwrap();
        service.create(input(app, Environment::Stage)).await.unwrap();

        let patch: VirtualClusterPatch =
            serde_json::from_str(r#"{"status":"active","advertisedHost":"orders-dev.example"}"#)
                .unwrap();
        service.update(dev.id, patch).await.unwrap();

        let active = service
            .list(&VirtualClusterFilter {
                application_id: Some(app),
                status: Some(VirtualClusterStatus::Active),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].advertised_host.as_deref(), Some("orders-dev.example"));
    }

    #[test]
    fn test_filter_rejects_unknown_params() {
        let result: std::result::Result<VirtualClusterFilter, _> =
            serde_json::from_str(r#"{"where[status][equals]":"active"}"#);
        assert!(result.is_err());
    }
}
