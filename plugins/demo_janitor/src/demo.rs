//! Policy specific to the demo site: the demo identity may not change
//! itself, and demo content is never offered to search engines.

use crate::{
    acl::{Action, Decision, Principal, Voter},
    hooks::{UpdateContext, UpdateInterceptor, UpdateRejected},
    model::{Resource, RscUpdate},
    store::StoreBuilder,
};

/// Shared account demo visitors log in with.
pub const DEMO_USER: &str = "user_demo";
/// Content group holding everything demo visitors create.
pub const DEMO_CONTENT_GROUP: &str = "cg_demo";
/// Access group the demo user belongs to.
pub const DEMO_USER_GROUP: &str = "acl_user_group_demo";
/// Static page explaining how to log in.
pub const DEMO_LOGIN_PAGE: &str = "page_demo_login";

/// Register the demo voter and interceptor on a store.
pub fn install_hooks(builder: StoreBuilder) -> StoreBuilder {
    builder
        .voter(DemoSelfEditVoter)
        .interceptor(DemoNoindexInterceptor)
}

/// Denies the demo user any non-view action on its own resource.
pub struct DemoSelfEditVoter;

impl Voter for DemoSelfEditVoter {
    fn decide(&self, action: Action, actor: &Principal, target: &Resource) -> Decision {
        if action == Action::View {
            return Decision::Abstain;
        }
        if target.name.as_deref() == Some(DEMO_USER) && actor.user_id() == Some(target.id) {
            Decision::Deny
        } else {
            Decision::Abstain
        }
    }
}

/// Forces `seo_noindex` on anything that ends up in the demo content group.
pub struct DemoNoindexInterceptor;

impl UpdateInterceptor for DemoNoindexInterceptor {
    fn intercept(
        &self,
        ctx: &UpdateContext<'_>,
        proposed: Result<RscUpdate, UpdateRejected>,
    ) -> Result<RscUpdate, UpdateRejected> {
        let mut update = proposed?;
        let group = update
            .content_group_id
            .or(ctx.raw.content_group_id)
            .or_else(|| ctx.current.and_then(|rsc| rsc.content_group_id));
        let Some(group) = group else {
            return Ok(update);
        };
        match ctx.resolve(DEMO_CONTENT_GROUP) {
            Ok(Some(demo)) if demo == group => update.seo_noindex = Some(true),
            Ok(_) => {}
            Err(e) => return Err(UpdateRejected(e.to_string())),
        }
        Ok(update)
    }
}
