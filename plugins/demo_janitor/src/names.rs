use std::{cell::RefCell, collections::HashMap};

use rusqlite::{params, Connection, OptionalExtension};

use crate::{error::StoreError, model::ResourceId};

/// Look up the id currently bound to a symbolic name.
pub fn lookup(conn: &Connection, name: &str) -> Result<Option<ResourceId>, StoreError> {
    let id = conn
        .query_row("SELECT id FROM rsc WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

/// Resolves symbolic names to ids, caching answers for one request.
///
/// Ids are not stable across reinstalls, so a registry must not outlive the
/// operation it was created for.
pub struct NameRegistry<'c> {
    conn: &'c Connection,
    cache: RefCell<HashMap<String, Option<ResourceId>>>,
}

impl<'c> NameRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Option<ResourceId>, StoreError> {
        if let Some(hit) = self.cache.borrow().get(name) {
            return Ok(*hit);
        }
        let id = lookup(self.conn, name)?;
        self.cache.borrow_mut().insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolve a name that must exist.
    pub fn require(&self, name: &str) -> Result<ResourceId, StoreError> {
        self.resolve(name)?
            .ok_or_else(|| StoreError::UnknownName(name.to_string()))
    }
}
