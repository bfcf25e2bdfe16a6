// Caller scope forwarded by the portal gateway

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// What the calling user may see and decide on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub user_id: String,
    pub workspaces: HashSet<Uuid>,
    pub admin_workspaces: HashSet<Uuid>,
    pub platform_admin: bool,
}

impl AccessScope {
    pub fn platform_admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            platform_admin: true,
            ..Default::default()
        }
    }

    pub fn member_of(user_id: impl Into<String>, workspaces: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            user_id: user_id.into(),
            workspaces: workspaces.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_admin_of(mut self, workspace_id: Uuid) -> Self {
        self.workspaces.insert(workspace_id);
        self.admin_workspaces.insert(workspace_id);
        self
    }

    pub fn can_view(&self, workspace_id: Uuid) -> bool {
        self.platform_admin
            || self.workspaces.contains(&workspace_id)
            || self.admin_workspaces.contains(&workspace_id)
    }

    /// Edge visibility: either end in a visible workspace.
    pub fn can_view_either(&self, source: Option<Uuid>, target: Uuid) -> bool {
        self.can_view(target) || source.map_or(false, |s| self.can_view(s))
    }

    pub fn is_workspace_admin(&self, workspace_id: Uuid) -> bool {
        self.platform_admin || self.admin_workspaces.contains(&workspace_id)
    }
}
