//! Data the demo site needs before its first visitor arrives.
//!
//! Entities are matched by symbolic name: missing ones are created, existing
//! ones are left exactly as they are.

use tracing::info;

use crate::{
    acl::Principal,
    demo::{DEMO_CONTENT_GROUP, DEMO_LOGIN_PAGE, DEMO_USER, DEMO_USER_GROUP},
    error::StoreError,
    identity,
    model::NewResource,
    store::Store,
};

/// A named resource that must exist.
#[derive(Debug, Clone, Copy)]
pub struct SeedResource {
    pub name: &'static str,
    pub category: &'static str,
    pub title: &'static str,
    pub body: Option<&'static str>,
    pub is_protected: bool,
}

/// An edge between two named resources that must exist.
#[derive(Debug, Clone, Copy)]
pub struct SeedEdge {
    pub subject: &'static str,
    pub predicate: &'static str,
    pub object: &'static str,
}

pub const RESOURCES: &[SeedResource] = &[
    SeedResource {
        name: DEMO_USER,
        category: "person",
        title: "Demo User",
        body: None,
        is_protected: true,
    },
    SeedResource {
        name: DEMO_CONTENT_GROUP,
        category: "content_group",
        title: "Demo Content",
        body: Some("Content created by visitors of the demo site. Removed automatically."),
        is_protected: true,
    },
    SeedResource {
        name: DEMO_USER_GROUP,
        category: "acl_user_group",
        title: "Demo Users",
        body: None,
        is_protected: true,
    },
    SeedResource {
        name: DEMO_LOGIN_PAGE,
        category: "text",
        title: "Log in to the demo",
        body: Some(
            "Log in with username demo and password demo. \
             Anything you create is removed a day after it was made, \
             once nobody has touched it for an hour.",
        ),
        is_protected: true,
    },
];

pub const EDGES: &[SeedEdge] = &[SeedEdge {
    subject: DEMO_USER,
    predicate: "hasusergroup",
    object: DEMO_USER_GROUP,
}];

/// Summary of what an install pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub created: Vec<&'static str>,
    pub edges_created: usize,
}

/// Ensure every seed resource and edge exists.
pub fn install(store: &Store) -> Result<SeedReport, StoreError> {
    let sys = Principal::unrestricted();
    let mut report = SeedReport::default();
    for seed in RESOURCES {
        if store.lookup(seed.name)?.is_some() {
            continue;
        }
        let mut new = NewResource::new(seed.category, seed.title);
        new.name = Some(seed.name.to_string());
        new.body = seed.body.map(String::from);
        new.is_protected = seed.is_protected;
        store.insert(&sys, new)?;
        report.created.push(seed.name);
    }
    for edge in EDGES {
        let subject = store
            .lookup(edge.subject)?
            .ok_or_else(|| StoreError::UnknownName(edge.subject.to_string()))?;
        let object = store
            .lookup(edge.object)?
            .ok_or_else(|| StoreError::UnknownName(edge.object.to_string()))?;
        if store.insert_edge(subject, edge.predicate, object)? {
            report.edges_created += 1;
        }
    }
    if !report.created.is_empty() || report.edges_created > 0 {
        info!(created = ?report.created, edges = report.edges_created, "demo data installed");
    }
    Ok(report)
}

/// Ensure the demo user logs in with `username`/`password`.
///
/// Fails when the demo user does not exist; run [`install`] first.
pub fn install_credentials(store: &Store, username: &str, password: &str) -> Result<bool, StoreError> {
    let user = store
        .lookup(DEMO_USER)?
        .ok_or_else(|| StoreError::UnknownName(DEMO_USER.to_string()))?;
    identity::set_username_pw(store, user, username, password)
}
