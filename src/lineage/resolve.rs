// Display-name resolution for edge views, memoized per query

use std::collections::HashMap;
use uuid::Uuid;

use crate::db::repository::Repositories;
use crate::domain::{EdgeView, LineageEdge};
use crate::errors::Result;

pub(crate) struct NameResolver<'a> {
    repos: &'a Repositories,
    applications: HashMap<Uuid, Option<String>>,
    workspaces: HashMap<Uuid, Option<String>>,
    topics: HashMap<Uuid, Option<String>>,
}

impl<'a> NameResolver<'a> {
    pub(crate) fn new(repos: &'a Repositories) -> Self {
        Self {
            repos,
            applications: HashMap::new(),
            workspaces: HashMap::new(),
            topics: HashMap::new(),
        }
    }

    async fn application(&mut self, id: Uuid) -> Result<Option<String>> {
        if let Some(name) = self.applications.get(&id) {
            return Ok(name.clone());
        }
        let name = self
            .repos
            .applications
            .find_by_id(id)
            .await?
            .map(|a| a.name);
        self.applications.insert(id, name.clone());
        Ok(name)
    }

    pub(crate) async fn workspace(&mut self, id: Uuid) -> Result<Option<String>> {
        if let Some(name) = self.workspaces.get(&id) {
            return Ok(name.clone());
        }
        let name = self.repos.workspaces.find_by_id(id).await?.map(|w| w.name);
        self.workspaces.insert(id, name.clone());
        Ok(name)
    }

    async fn topic(&mut self, id: Uuid) -> Result<Option<String>> {
        if let Some(name) = self.topics.get(&id) {
            return Ok(name.clone());
        }
        let name = self.repos.topics.find_by_id(id).await?.map(|t| t.name);
        self.topics.insert(id, name.clone());
        Ok(name)
    }

    pub(crate) async fn view(&mut self, edge: &LineageEdge) -> Result<EdgeView> {
        let application_name = match edge.source_application_id {
            Some(id) => self.application(id).await?,
            None => None,
        };
        let workspace_name = match edge.source_workspace_id {
            Some(id) => self.workspace(id).await?,
            None => None,
        };

        Ok(EdgeView {
            edge_id: edge.id,
            direction: edge.direction,
            application_id: edge.source_application_id,
            application_name,
            service_account: edge.source_service_account.clone(),
            workspace_id: edge.source_workspace_id,
            workspace_name,
            topic_id: edge.topic_id,
            topic_name: self.topic(edge.topic_id).await?,
            topic_workspace_id: edge.target_workspace_id,
            topic_workspace_name: self.workspace(edge.target_workspace_id).await?,
            bytes_last_24h: edge.bytes_last_24h,
            messages_last_24h: edge.messages_last_24h,
            bytes_all_time: edge.bytes_all_time,
            messages_all_time: edge.messages_all_time,
            first_seen: edge.first_seen,
            last_seen: edge.last_seen,
            is_active: edge.is_active,
            is_cross_workspace: edge.is_cross_workspace,
        })
    }

    pub(crate) async fn views(&mut self, edges: &[LineageEdge]) -> Result<Vec<EdgeView>> {
        let mut views = Vec::with_capacity(edges.len());
        for edge in edges {
            views.push(self.view(edge).await?);
        }
        Ok(views)
    }
}
