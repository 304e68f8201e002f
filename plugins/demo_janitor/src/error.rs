use crate::acl::Action;
use crate::model::ResourceId;

/// Errors raised by resource store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource {0} not found")]
    NotFound(ResourceId),
    #[error("{action} denied on resource {id}")]
    AccessDenied { action: Action, id: ResourceId },
    #[error("anonymous visitors cannot create resources")]
    InsertDenied,
    #[error("resource {0} is protected")]
    Protected(ResourceId),
    #[error("update rejected: {0}")]
    Rejected(String),
    #[error("no resource named {0}")]
    UnknownName(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
