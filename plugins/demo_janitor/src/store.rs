//! Resource store: SQLite backed CRUD guarded by the voter list and the
//! update interceptor pipeline.

use std::sync::Arc;

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    acl::{AccessControl, Action, OwnerVoter, Principal, Voter},
    clock::{Clock, SystemClock},
    db::DbPool,
    error::StoreError,
    hooks::{run_pipeline, UpdateContext, UpdateInterceptor, UpdateRejected},
    model::{NewResource, Resource, ResourceId, RscUpdate},
    names,
};

const RSC_COLUMNS: &str = "id, name, category, title, body, content_group_id, creator_id, \
                           is_protected, seo_noindex, created, modified";

/// Wires voters, interceptors and a clock around a pool.
pub struct StoreBuilder {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    acl: AccessControl,
    interceptors: Vec<Box<dyn UpdateInterceptor>>,
}

impl StoreBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn voter(mut self, voter: impl Voter + 'static) -> Self {
        self.acl.push(Box::new(voter));
        self
    }

    pub fn interceptor(mut self, hook: impl UpdateInterceptor + 'static) -> Self {
        self.interceptors.push(Box::new(hook));
        self
    }

    pub fn build(self) -> Store {
        Store {
            pool: self.pool,
            clock: self.clock,
            acl: Arc::new(self.acl),
            interceptors: Arc::new(self.interceptors),
        }
    }
}

/// Cheap to clone handle on the resource database.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    acl: Arc<AccessControl>,
    interceptors: Arc<Vec<Box<dyn UpdateInterceptor>>>,
}

impl Store {
    /// Start building a store; the owner rule is always the first voter.
    pub fn builder(pool: DbPool) -> StoreBuilder {
        let mut acl = AccessControl::new();
        acl.push(Box::new(OwnerVoter));
        StoreBuilder {
            pool,
            clock: Arc::new(SystemClock),
            acl,
            interceptors: Vec::new(),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub(crate) fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Current id for a symbolic name.
    pub fn lookup(&self, name: &str) -> Result<Option<ResourceId>, StoreError> {
        names::lookup(&*self.conn()?, name)
    }

    pub fn get(&self, actor: &Principal, id: ResourceId) -> Result<Resource, StoreError> {
        let conn = self.conn()?;
        let rsc = load(&conn, id)?;
        self.acl.check(Action::View, actor, &rsc)?;
        Ok(rsc)
    }

    pub fn insert(&self, actor: &Principal, new: NewResource) -> Result<Resource, StoreError> {
        self.acl.check_insert(actor)?;
        let conn = self.conn()?;
        let raw = new.as_update();
        let upd = {
            let ctx = UpdateContext::new(&conn, None, &raw);
            run_pipeline(&self.interceptors, &ctx, Ok(raw.clone()))
                .map_err(|UpdateRejected(msg)| StoreError::Rejected(msg))?
        };
        let now = self.now().unix_timestamp();
        let mut rsc = Resource {
            id: 0,
            name: new.name,
            category: new.category,
            title: String::new(),
            body: None,
            content_group_id: None,
            creator_id: actor.user_id(),
            is_protected: false,
            seo_noindex: false,
            created: now,
            modified: now,
        };
        upd.merge_into(&mut rsc);
        conn.execute(
            "INSERT INTO rsc (name, category, title, body, content_group_id, creator_id, \
             is_protected, seo_noindex, created, modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rsc.name,
                rsc.category,
                rsc.title,
                rsc.body,
                rsc.content_group_id,
                rsc.creator_id,
                rsc.is_protected,
                rsc.seo_noindex,
                rsc.created,
                rsc.modified
            ],
        )?;
        rsc.id = conn.last_insert_rowid();
        debug!(id = rsc.id, category = %rsc.category, "resource inserted");
        Ok(rsc)
    }

    pub fn update(
        &self,
        actor: &Principal,
        id: ResourceId,
        raw: RscUpdate,
    ) -> Result<Resource, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut rsc = load(&tx, id)?;
        self.acl.check(Action::Update, actor, &rsc)?;
        let upd = {
            let ctx = UpdateContext::new(&tx, Some(&rsc), &raw);
            run_pipeline(&self.interceptors, &ctx, Ok(raw.clone()))
                .map_err(|UpdateRejected(msg)| StoreError::Rejected(msg))?
        };
        upd.merge_into(&mut rsc);
        rsc.modified = self.now().unix_timestamp();
        tx.execute(
            "UPDATE rsc SET title = ?2, body = ?3, content_group_id = ?4, is_protected = ?5, \
             seo_noindex = ?6, modified = ?7 WHERE id = ?1",
            params![
                rsc.id,
                rsc.title,
                rsc.body,
                rsc.content_group_id,
                rsc.is_protected,
                rsc.seo_noindex,
                rsc.modified
            ],
        )?;
        tx.commit()?;
        Ok(rsc)
    }

    /// Delete a resource. Protected resources must be unprotected first.
    pub fn delete(&self, actor: &Principal, id: ResourceId) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let rsc = load(&tx, id)?;
        self.acl.check(Action::Delete, actor, &rsc)?;
        if rsc.is_protected {
            return Err(StoreError::Protected(id));
        }
        tx.execute("DELETE FROM rsc WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(id, "resource deleted");
        Ok(())
    }

    /// Ids in `group` created before `created_before` and untouched since
    /// `modified_before` (both unix seconds, strict).
    pub fn find_stale(
        &self,
        group: ResourceId,
        created_before: i64,
        modified_before: i64,
    ) -> Result<Vec<ResourceId>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM rsc WHERE created < ?1 AND modified < ?2 AND content_group_id = ?3 \
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![created_before, modified_before, group], |row| {
            row.get(0)
        })?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Run the interceptor pipeline without writing anything.
    pub fn intercept(
        &self,
        id: Option<ResourceId>,
        raw: &RscUpdate,
        proposed: Result<RscUpdate, UpdateRejected>,
    ) -> Result<Result<RscUpdate, UpdateRejected>, StoreError> {
        let conn = self.conn()?;
        let current = match id {
            Some(id) => load(&conn, id).map(Some).or_else(|e| {
                if e.is_not_found() {
                    Ok(None)
                } else {
                    Err(e)
                }
            })?,
            None => None,
        };
        let ctx = UpdateContext::new(&conn, current.as_ref(), raw);
        Ok(run_pipeline(&self.interceptors, &ctx, proposed))
    }

    /// Add an edge; returns false when it already existed.
    pub fn insert_edge(
        &self,
        subject: ResourceId,
        predicate: &str,
        object: ResourceId,
    ) -> Result<bool, StoreError> {
        let n = self.conn()?.execute(
            "INSERT OR IGNORE INTO edge (subject_id, predicate, object_id, created) \
             VALUES (?1, ?2, ?3, ?4)",
            params![subject, predicate, object, self.now().unix_timestamp()],
        )?;
        Ok(n > 0)
    }

    pub fn has_edge(
        &self,
        subject: ResourceId,
        predicate: &str,
        object: ResourceId,
    ) -> Result<bool, StoreError> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM edge WHERE subject_id = ?1 AND predicate = ?2 AND object_id = ?3",
                params![subject, predicate, object],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn row_to_rsc(row: &rusqlite::Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        content_group_id: row.get(5)?,
        creator_id: row.get(6)?,
        is_protected: row.get(7)?,
        seo_noindex: row.get(8)?,
        created: row.get(9)?,
        modified: row.get(10)?,
    })
}

pub(crate) fn load(conn: &Connection, id: ResourceId) -> Result<Resource, StoreError> {
    conn.query_row(
        &format!("SELECT {RSC_COLUMNS} FROM rsc WHERE id = ?1"),
        params![id],
        row_to_rsc,
    )
    .optional()?
    .ok_or(StoreError::NotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, db};
    use time::Duration;

    fn store() -> (Store, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        ));
        let store = Store::builder(db::init_pool(":memory:").unwrap())
            .clock(clock.clone())
            .build();
        (store, clock)
    }

    #[test]
    fn insert_get_update_delete() {
        let (store, clock) = store();
        let alice = Principal::user(100);
        let rsc = store
            .insert(&alice, NewResource::new("text", "hello"))
            .unwrap();
        assert_eq!(rsc.creator_id, Some(100));
        assert_eq!(store.get(&Principal::anonymous(), rsc.id).unwrap(), rsc);

        clock.advance(Duration::minutes(5));
        let upd = store
            .update(
                &alice,
                rsc.id,
                RscUpdate {
                    title: Some("bye".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(upd.title, "bye");
        assert_eq!(upd.modified, rsc.created + 300);

        store.delete(&alice, rsc.id).unwrap();
        assert!(store.get(&alice, rsc.id).unwrap_err().is_not_found());
        assert!(store.delete(&alice, rsc.id).unwrap_err().is_not_found());
    }

    #[test]
    fn strangers_and_anonymous_are_refused() {
        let (store, _) = store();
        let rsc = store
            .insert(&Principal::user(1), NewResource::new("text", "mine"))
            .unwrap();
        assert!(matches!(
            store.delete(&Principal::user(2), rsc.id),
            Err(StoreError::AccessDenied { .. })
        ));
        assert!(matches!(
            store.update(&Principal::anonymous(), rsc.id, RscUpdate::default()),
            Err(StoreError::AccessDenied { .. })
        ));
        assert!(matches!(
            store.insert(&Principal::anonymous(), NewResource::new("text", "x")),
            Err(StoreError::InsertDenied)
        ));
    }

    #[test]
    fn protected_resources_cannot_be_deleted() {
        let (store, _) = store();
        let sys = Principal::unrestricted();
        let rsc = store
            .insert(&sys, NewResource::new("text", "keep").protected())
            .unwrap();
        assert!(matches!(
            store.delete(&sys, rsc.id),
            Err(StoreError::Protected(_))
        ));
        store
            .update(
                &sys,
                rsc.id,
                RscUpdate {
                    is_protected: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        store.delete(&sys, rsc.id).unwrap();
    }

    #[test]
    fn stale_query_uses_strict_bounds() {
        let (store, clock) = store();
        let sys = Principal::unrestricted();
        let group = store
            .insert(&sys, NewResource::new("content_group", "g"))
            .unwrap();
        let t0 = clock.now().unix_timestamp();
        let a = store
            .insert(&sys, NewResource::new("text", "a").in_group(group.id))
            .unwrap();
        clock.advance(Duration::seconds(10));
        store
            .insert(&sys, NewResource::new("text", "b").in_group(group.id))
            .unwrap();
        store.insert(&sys, NewResource::new("text", "c")).unwrap();

        assert!(store.find_stale(group.id, t0, t0 + 100).unwrap().is_empty());
        assert_eq!(
            store.find_stale(group.id, t0 + 1, t0 + 100).unwrap(),
            vec![a.id]
        );
    }

    #[test]
    fn stale_query_modified_bound_is_strict() {
        let (store, clock) = store();
        let sys = Principal::unrestricted();
        let group = store
            .insert(&sys, NewResource::new("content_group", "g"))
            .unwrap();
        let a = store
            .insert(&sys, NewResource::new("text", "a").in_group(group.id))
            .unwrap();
        clock.advance(Duration::hours(2));
        let touched = clock.now().unix_timestamp();
        store
            .update(
                &sys,
                a.id,
                RscUpdate {
                    title: Some("touched".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let created_before = touched + 3600;
        assert!(store
            .find_stale(group.id, created_before, touched)
            .unwrap()
            .is_empty());
        assert_eq!(
            store.find_stale(group.id, created_before, touched + 1).unwrap(),
            vec![a.id]
        );
    }

    #[test]
    fn edges_are_idempotent() {
        let (store, _) = store();
        let sys = Principal::unrestricted();
        let a = store.insert(&sys, NewResource::new("person", "a")).unwrap();
        let b = store
            .insert(&sys, NewResource::new("acl_user_group", "b"))
            .unwrap();
        assert!(store.insert_edge(a.id, "hasusergroup", b.id).unwrap());
        assert!(!store.insert_edge(a.id, "hasusergroup", b.id).unwrap());
        assert!(store.has_edge(a.id, "hasusergroup", b.id).unwrap());
        store.delete(&sys, a.id).unwrap();
        assert!(!store.has_edge(a.id, "hasusergroup", b.id).unwrap());
    }
}
