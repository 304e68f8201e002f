use rusqlite::Connection;

use crate::{
    error::StoreError,
    model::{Resource, ResourceId, RscUpdate},
    names::NameRegistry,
};

/// Reason an update was refused by an interceptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct UpdateRejected(pub String);

/// What an interceptor can see about the update in flight.
pub struct UpdateContext<'a> {
    /// Stored state before the update; `None` for an insert.
    pub current: Option<&'a Resource>,
    /// Properties as requested by the caller.
    pub raw: &'a RscUpdate,
    names: NameRegistry<'a>,
}

impl<'a> UpdateContext<'a> {
    pub fn new(conn: &'a Connection, current: Option<&'a Resource>, raw: &'a RscUpdate) -> Self {
        Self {
            current,
            raw,
            names: NameRegistry::new(conn),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Option<ResourceId>, StoreError> {
        self.names.resolve(name)
    }
}

/// Hook run on every insert and update before anything is written.
pub trait UpdateInterceptor: Send + Sync {
    fn intercept(
        &self,
        ctx: &UpdateContext<'_>,
        proposed: Result<RscUpdate, UpdateRejected>,
    ) -> Result<RscUpdate, UpdateRejected>;
}

/// Thread the caller's update through every interceptor in order.
pub fn run_pipeline(
    interceptors: &[Box<dyn UpdateInterceptor>],
    ctx: &UpdateContext<'_>,
    proposed: Result<RscUpdate, UpdateRejected>,
) -> Result<RscUpdate, UpdateRejected> {
    interceptors
        .iter()
        .fold(proposed, |acc, hook| hook.intercept(ctx, acc))
}
