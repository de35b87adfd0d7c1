//! Who may see and who may write comments.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Access level required for an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentPermission {
    /// Everyone, signed in or not.
    #[default]
    Anon,
    /// Any signed-in user.
    Auth,
    /// Signed-in members of the owning organisation.
    Team,
}

/// The signed-in reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub orgs: Vec<String>,
}

impl User {
    /// Org logins compare case-insensitively.
    pub fn is_in_org(&self, org: &str) -> bool {
        self.orgs.iter().any(|o| o.eq_ignore_ascii_case(org))
    }
}

/// Decides whether `user` may act on `page`.
pub trait PermissionOracle: Send + Sync {
    fn is_allowed(
        &self,
        user: Option<&User>,
        page: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// The fixed three-level policy, evaluated locally.
#[derive(Debug, Clone, Default)]
pub struct PolicyOracle {
    pub level: CommentPermission,
    /// Organisation that owns the documentation, for [`CommentPermission::Team`].
    pub owner: String,
}

impl PolicyOracle {
    pub fn new(level: CommentPermission, owner: impl Into<String>) -> Self {
        Self {
            level,
            owner: owner.into(),
        }
    }

    pub fn allows(&self, user: Option<&User>) -> bool {
        match self.level {
            CommentPermission::Anon => true,
            CommentPermission::Auth => user.is_some(),
            CommentPermission::Team => user.is_some_and(|u| u.is_in_org(&self.owner)),
        }
    }
}

impl PermissionOracle for PolicyOracle {
    async fn is_allowed(&self, user: Option<&User>, _page: &str) -> Result<bool> {
        Ok(self.allows(user))
    }
}

/// What the current reader may do on the current page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub can_view: bool,
    pub can_comment: bool,
}

/// Asks `oracle`, treating any failure as "not allowed".
pub async fn check<O>(oracle: &O, user: Option<&User>, page: &str) -> bool
where
    O: PermissionOracle,
{
    match oracle.is_allowed(user, page).await {
        Ok(allowed) => allowed,
        Err(err) => {
            warn!(page, error = %err, "permission check failed, treating as denied");
            false
        }
    }
}

/// Evaluates viewing and authoring independently; both fail closed.
pub async fn resolve_permissions<V, A>(
    view: &V,
    author: &A,
    user: Option<&User>,
    page: &str,
) -> Permissions
where
    V: PermissionOracle,
    A: PermissionOracle,
{
    Permissions {
        can_view: check(view, user, page).await,
        can_comment: check(author, user, page).await,
    }
}
