//! Role-based permission checks.

use std::{marker::PhantomData, ops::Deref};

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::profiles::{CurrentUser, Role},
    db::models::profiles::ProfileDBResponse,
    errors::Error,
    types::{Operation, Permission, Resource},
};

/// Static permission table. Platform admins can do everything.
fn role_permissions(role: Role) -> &'static [(Resource, Operation)] {
    use Operation::*;
    use Resource::*;

    match role {
        Role::PlatformAdmin => &[],
        Role::ClinicAdmin => &[
            (Profiles, ReadOwn),
            (Profiles, UpdateOwn),
            (Clinics, ReadOwn),
            (Clinics, UpdateOwn),
            (Subscriptions, ReadOwn),
            (Appointments, ReadOwn),
            (Appointments, UpdateOwn),
            (Voice, CreateOwn),
            (Voice, ReadOwn),
            (Voice, DeleteOwn),
        ],
        Role::Doctor => &[
            (Profiles, ReadOwn),
            (Profiles, UpdateOwn),
            (Clinics, ReadOwn),
            (Subscriptions, ReadOwn),
            (Appointments, ReadOwn),
            (Appointments, UpdateOwn),
            (Voice, CreateOwn),
            (Voice, ReadOwn),
            (Voice, DeleteOwn),
        ],
        Role::Assistant => &[
            (Profiles, ReadOwn),
            (Clinics, ReadOwn),
            (Subscriptions, ReadOwn),
            (Appointments, ReadOwn),
            (Appointments, UpdateOwn),
            (Voice, CreateOwn),
            (Voice, ReadOwn),
            (Voice, DeleteOwn),
        ],
    }
}

pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    if user.role == Role::PlatformAdmin {
        return true;
    }
    role_permissions(user.role).contains(&(resource, operation))
}

/// Whether `user` can act on `target` under an "own" permission: it is their own profile, or
/// clinic staff acting on a member of the same clinic.
pub fn owns_profile(user: &CurrentUser, target: &ProfileDBResponse) -> bool {
    if user.id == target.id {
        return true;
    }
    matches!(user.role, Role::ClinicAdmin | Role::Assistant) && user.clinic_id.is_some() && user.clinic_id == target.clinic_id
}

/// Check `*All`, falling back to `*Own` when `owned` holds.
pub fn require(user: &CurrentUser, resource: Resource, all: Operation, own: Operation, owned: bool, what: impl Into<String>) -> Result<(), Error> {
    if has_permission(user, resource, all) || (owned && has_permission(user, resource, own)) {
        return Ok(());
    }
    Err(Error::InsufficientPermissions {
        required: Permission::Any(vec![Permission::Allow(resource, all), Permission::Allow(resource, own)]),
        action: all,
        resource: what.into(),
    })
}

/// Type-level resources for [`RequiresPermission`].
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceType: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    macro_rules! resources {
        ($($name:ident),*) => {
            $(
                pub struct $name;
                impl ResourceType for $name {
                    const RESOURCE: Resource = Resource::$name;
                }
            )*
        };
    }

    resources!(Profiles, Clinics, Subscriptions, Appointments, Notifications, Voice, System);
}

/// Type-level operations for [`RequiresPermission`].
pub mod operation {
    use crate::types::Operation;

    pub trait OperationType: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    macro_rules! operations {
        ($($name:ident),*) => {
            $(
                pub struct $name;
                impl OperationType for $name {
                    const OPERATION: Operation = Operation::$name;
                }
            )*
        };
    }

    operations!(CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, UpdateOwn, DeleteAll, DeleteOwn, SystemAccess);
}

/// Extractor that rejects the request unless the caller's role grants `(R, O)`.
/// Derefs to the authenticated [`CurrentUser`].
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<(R, O)>,
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceType,
    O: operation::OperationType,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if has_permission(&user, R::RESOURCE, O::OPERATION) {
            Ok(Self { user, _marker: PhantomData })
        } else {
            Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: R::RESOURCE.to_string(),
            })
        }
    }
}
