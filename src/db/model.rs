//! Database view models returned by repositories.
//!
//! Domain entities live in `crate::model`; this file only holds row shapes
//! that have no meaning outside of the persistence layer.

/// Field of a booking form, listed when configuring a task.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FormEntry {
    pub id: i64,
    pub title: String,
}
