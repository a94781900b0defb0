//! Authentication and authorization.
//!
//! Authentication is delegated to an upstream identity proxy, which forwards the signed-in
//! user's email address in a trusted header (`auth.proxy_header.header_name`). The
//! [`current_user`] extractor resolves that email to a profile, optionally creating a trial
//! doctor profile on first sight.
//!
//! Authorization is role based. Each [`Role`](crate::api::models::profiles::Role) maps to a set
//! of `(Resource, Operation)` pairs in [`permissions`]; "own" operations are further limited by
//! an ownership check in the handler.
//!
//! ```ignore
//! async fn handler(
//!     _perm: RequiresPermission<resource::Notifications, operation::UpdateAll>,
//!     current_user: CurrentUser,
//! ) -> Result<Json<()>> { ... }
//! ```

pub mod current_user;
pub mod permissions;
