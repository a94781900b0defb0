//! Database layer for data persistence and access.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! Repositories wrap a `&mut PgConnection`, so they work equally on a pooled connection or inside
//! a transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut profiles = Profiles::new(&mut tx);
//! let profile = profiles.get_by_email("doctor@example.org").await?;
//! tx.commit().await?;
//! ```
//!
//! Migrations live in `migrations/` and are run through [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
