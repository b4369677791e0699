//! Persistence for users and sessions.
//!
//! Each store is a trait with a PostgreSQL implementation and an in-process
//! implementation used by tests and `DATABASE_URL=memory://` development runs.

pub mod memory;
pub mod session;
pub mod user;

pub use memory::{InMemorySessionRepository, InMemoryUserRepository};
pub use session::{PgSessionRepository, SessionRepository};
pub use user::{PgUserRepository, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write. Carries the logical field name.
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return RepositoryError::Duplicate(constraint_field(db_err.constraint()));
            }
        }
        RepositoryError::Database(err)
    }
}

fn constraint_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "email",
        Some("users_google_id_key") => "google_id",
        Some("users_github_id_key") => "github_id",
        Some("users_linkedin_id_key") => "linkedin_id",
        Some("sessions_refresh_token_hash_key") => "refresh_token",
        _ => "unknown",
    }
}
