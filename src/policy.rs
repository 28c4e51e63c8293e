use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Delivery, Nce, Notification, Project, Role, Survey},
};

/// What the actor is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    ChangeStatus,
}

/// Resource classes known to the policy. `Client` is the client directory (users
/// with the client role); `User` is the account resource itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    User,
    Client,
    Project,
    Delivery,
    Nce,
    Survey,
    Notification,
    Dashboard,
}

/// Grant
///
/// Outcome of the (role, action, resource) lookup, before the concrete row is
/// known. `Owner` and `ProjectClient` are evaluated against an `Ownership`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Always,
    /// `created_by` (or recipient / respondent) must be the actor.
    Owner,
    /// The parent project's `client_id` must be the actor.
    ProjectClient,
    Never,
}

/// grant
///
/// The access table. Arms are ordered; the first match wins.
pub fn grant(role: Role, action: Action, resource: Resource) -> Grant {
    use Action::*;
    use Grant::*;
    use Role::*;

    match (role, action, resource) {
        // Notifications are read-your-own for everybody, Admin included.
        (_, _, Resource::Notification) => Owner,

        // Account creation.
        (Admin, Create, Resource::User) => Always,
        (_, Create, Resource::User) => Never,

        (Admin | Quality, _, _) => Always,

        (Producer, Create, Resource::Delivery | Resource::Nce) => Always,
        (Producer, Read | Update | Delete, Resource::Delivery | Resource::Nce) => Owner,
        (Producer, Read, Resource::Project | Resource::Client) => Always,

        (Client, Create, Resource::Nce) => ProjectClient,
        (Client, Read, Resource::Project | Resource::Delivery | Resource::Nce) => ProjectClient,
        (Client, Update | Delete, Resource::Nce) => Owner,

        (_, Create, Resource::Survey) => Always,
        (_, Read, Resource::Survey) => Owner,
        (_, Read, Resource::Dashboard) => Always,

        _ => Never,
    }
}

/// Ownership
///
/// The facts about a concrete row that `Owner` and `ProjectClient` grants look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub owner: Option<Uuid>,
    pub project_client: Option<Uuid>,
}

impl Ownership {
    /// Context for actions that are not tied to an existing row.
    pub fn none() -> Self {
        Self::default()
    }
}

impl From<&Delivery> for Ownership {
    fn from(delivery: &Delivery) -> Self {
        Self {
            owner: Some(delivery.created_by),
            project_client: delivery.client_id,
        }
    }
}

impl From<&Nce> for Ownership {
    fn from(nce: &Nce) -> Self {
        Self {
            owner: Some(nce.created_by),
            project_client: nce.client_id,
        }
    }
}

impl From<&Project> for Ownership {
    fn from(project: &Project) -> Self {
        Self {
            owner: None,
            project_client: project.client_id,
        }
    }
}

impl From<&Survey> for Ownership {
    fn from(survey: &Survey) -> Self {
        Self {
            owner: Some(survey.user_id),
            project_client: None,
        }
    }
}

impl From<&Notification> for Ownership {
    fn from(notification: &Notification) -> Self {
        Self {
            owner: Some(notification.user_id),
            project_client: None,
        }
    }
}

pub fn allows(actor: &AuthUser, action: Action, resource: Resource, ownership: &Ownership) -> bool {
    match grant(actor.role, action, resource) {
        Grant::Always => true,
        Grant::Owner => ownership.owner == Some(actor.id),
        Grant::ProjectClient => ownership.project_client == Some(actor.id),
        Grant::Never => false,
    }
}

/// require_grant
///
/// Row-independent pre-check: rejects a `Never` grant before the guarded row
/// is even loaded. `authorize` still has to run once the row is known.
pub fn require_grant(actor: &AuthUser, action: Action, resource: Resource) -> AppResult<()> {
    if grant(actor.role, action, resource) == Grant::Never {
        return authorize(actor, action, resource, &Ownership::none());
    }
    Ok(())
}

/// authorize
///
/// Must run before any query or mutation of the guarded resource.
pub fn authorize(
    actor: &AuthUser,
    action: Action,
    resource: Resource,
    ownership: &Ownership,
) -> AppResult<()> {
    if allows(actor, action, resource, ownership) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %actor.id,
            role = ?actor.role,
            ?action,
            ?resource,
            "Access denied"
        );
        Err(AppError::forbidden())
    }
}
