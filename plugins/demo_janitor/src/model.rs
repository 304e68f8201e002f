use serde::{Deserialize, Serialize};

/// Host assigned resource identifier.
pub type ResourceId = i64;

/// A stored content record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub name: Option<String>,
    pub category: String,
    pub title: String,
    pub body: Option<String>,
    pub content_group_id: Option<ResourceId>,
    pub creator_id: Option<ResourceId>,
    pub is_protected: bool,
    pub seo_noindex: bool,
    /// Unix seconds, UTC.
    pub created: i64,
    /// Unix seconds, UTC.
    pub modified: i64,
}

/// Properties for a resource that does not exist yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct NewResource {
    pub name: Option<String>,
    pub category: String,
    pub title: String,
    pub body: Option<String>,
    pub content_group_id: Option<ResourceId>,
    pub is_protected: bool,
    pub seo_noindex: bool,
}

impl NewResource {
    pub fn new(category: &str, title: &str) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn in_group(mut self, group: ResourceId) -> Self {
        self.content_group_id = Some(group);
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }

    /// The mutable part of the resource, as seen by update interceptors.
    pub(crate) fn as_update(&self) -> RscUpdate {
        RscUpdate {
            title: Some(self.title.clone()),
            body: self.body.clone(),
            content_group_id: self.content_group_id,
            is_protected: Some(self.is_protected),
            seo_noindex: Some(self.seo_noindex),
        }
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct RscUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_group_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_protected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_noindex: Option<bool>,
}

impl RscUpdate {
    /// Apply this update on top of `rsc`.
    pub(crate) fn merge_into(&self, rsc: &mut Resource) {
        if let Some(title) = &self.title {
            rsc.title = title.clone();
        }
        if let Some(body) = &self.body {
            rsc.body = Some(body.clone());
        }
        if let Some(group) = self.content_group_id {
            rsc.content_group_id = Some(group);
        }
        if let Some(p) = self.is_protected {
            rsc.is_protected = p;
        }
        if let Some(n) = self.seo_noindex {
            rsc.seo_noindex = n;
        }
    }
}
