use std::{collections::VecDeque, time::Duration};

use anyhow::{Context, Result};
use plugin_api::{
    methods, read_envelope, topics, write_envelope, Envelope, Kind, Metadata, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, BufWriter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    acl::{Action, Decision, Principal, Voter},
    demo::DemoSelfEditVoter,
    hooks::UpdateRejected,
    janitor::{sweep_once, Janitor},
    model::{ResourceId, RscUpdate},
    store::Store,
};

pub const PLUGIN_ID: &str = "demo_janitor";
/// Id of the interval timer requested from the core.
pub const TIMER_ID: &str = "demo_janitor.cleanup";

/// Proposed update as it travels over the wire: `{"ok": {..}}` or `{"error": ".."}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookUpdate {
    Ok(RscUpdate),
    Error(String),
}

impl From<Result<RscUpdate, UpdateRejected>> for HookUpdate {
    fn from(r: Result<RscUpdate, UpdateRejected>) -> Self {
        match r {
            Ok(upd) => HookUpdate::Ok(upd),
            Err(UpdateRejected(msg)) => HookUpdate::Error(msg),
        }
    }
}

impl From<HookUpdate> for Result<RscUpdate, UpdateRejected> {
    fn from(h: HookUpdate) -> Self {
        match h {
            HookUpdate::Ok(upd) => Ok(upd),
            HookUpdate::Error(msg) => Err(UpdateRejected(msg)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateHookParams {
    #[serde(default)]
    id: Option<ResourceId>,
    #[serde(default)]
    raw: RscUpdate,
    update: HookUpdate,
}

pub fn metadata() -> Metadata {
    Metadata {
        id: PLUGIN_ID.into(),
        name: "Demo Janitor".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        needs: vec!["log".into(), "event".into(), "timer".into()],
    }
}

/// Run the stdio protocol with the core until it stops us or closes the pipe.
pub async fn run_stdio(janitor: Janitor, every: Duration) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    serve(reader, writer, janitor, every).await
}

/// Handshake with the core, then answer its requests and ticks.
pub async fn serve<R, W>(reader: R, writer: W, janitor: Janitor, every: Duration) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut bridge = Bridge {
        reader,
        writer,
        backlog: VecDeque::new(),
        janitor,
    };

    let hello = bridge
        .next()
        .await?
        .context("core closed the pipe before hello")?;
    if !hello.is_event(topics::CORE_HELLO) {
        anyhow::bail!("expected core.hello, got {:?}", hello);
    }

    bridge
        .call(methods::PLUGIN_INIT, json!({ "metadata": metadata() }))
        .await?;
    bridge.call(methods::PLUGIN_START, json!({})).await?;
    bridge
        .call(
            methods::EVENT_SUBSCRIBE,
            json!({ "topics": [topics::TIMER_TICK] }),
        )
        .await?;
    bridge
        .call(
            methods::TIMER_SET_INTERVAL,
            json!({ "id": TIMER_ID, "millis": every.as_millis() as u64 }),
        )
        .await?;
    info!(every_secs = every.as_secs(), "registered with core");

    while let Some(env) = bridge.next().await? {
        if !bridge.dispatch(env).await? {
            info!("stopped by core");
            return Ok(());
        }
    }
    info!("core closed the pipe");
    Ok(())
}

struct Bridge<R, W> {
    reader: R,
    writer: W,
    /// Envelopes that arrived while we were waiting for a response.
    backlog: VecDeque<Envelope>,
    janitor: Janitor,
}

impl<R, W> Bridge<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn next(&mut self) -> Result<Option<Envelope>> {
        if let Some(env) = self.backlog.pop_front() {
            return Ok(Some(env));
        }
        read_envelope(&mut self.reader).await
    }

    async fn send(&mut self, env: &Envelope) -> Result<()> {
        write_envelope(&mut self.writer, env).await
    }

    /// Send a request to the core and wait for its response.
    async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = Uuid::new_v4().to_string();
        self.send(&Envelope::request(id.clone(), method, params))
            .await?;
        loop {
            let env = read_envelope(&mut self.reader)
                .await?
                .with_context(|| format!("core closed the pipe during {method}"))?;
            if env.kind == Kind::Response && env.id.as_deref() == Some(id.as_str()) {
                if let Some(err) = env.error {
                    anyhow::bail!("{method} failed: {}", err.message);
                }
                return Ok(env.result.unwrap_or(Value::Null));
            }
            self.backlog.push_back(env);
        }
    }

    /// Handle one envelope from the core; false means stop.
    async fn dispatch(&mut self, env: Envelope) -> Result<bool> {
        match env.kind {
            Kind::Event => {
                if env.is_event(topics::TIMER_TICK) {
                    let timer = env
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("id"))
                        .and_then(Value::as_str);
                    if timer == Some(TIMER_ID) {
                        sweep_once(self.janitor.clone()).await;
                    }
                } else if env.is_event(topics::SYSTEM_READY) {
                    debug!("core reports system ready");
                }
                Ok(true)
            }
            Kind::Request => {
                let method = env.method.clone().unwrap_or_default();
                let params = env.params.clone().unwrap_or(Value::Null);
                let resp = match method.as_str() {
                    methods::PLUGIN_STOP => {
                        self.send(&Envelope::response(env.id, json!({}))).await?;
                        return Ok(false);
                    }
                    methods::ACL_DECIDE => {
                        let store = self.janitor.store().clone();
                        let decision =
                            tokio::task::spawn_blocking(move || decide(&store, &params)).await?;
                        Envelope::response(env.id, json!({ "decision": decision }))
                    }
                    methods::RESOURCE_UPDATE => match serde_json::from_value(params) {
                        Ok(hook) => {
                            let store = self.janitor.store().clone();
                            let result = tokio::task::spawn_blocking(move || {
                                intercept(&store, hook)
                            })
                            .await?;
                            match result {
                                Ok(update) => Envelope::response(env.id, json!(update)),
                                Err(e) => {
                                    warn!("update hook failed: {e}");
                                    Envelope::error_response(env.id, INTERNAL_ERROR, e.to_string())
                                }
                            }
                        }
                        Err(e) => Envelope::error_response(env.id, INVALID_PARAMS, e.to_string()),
                    },
                    other => Envelope::error_response(
                        env.id,
                        METHOD_NOT_FOUND,
                        format!("unknown method {other}"),
                    ),
                };
                self.send(&resp).await?;
                Ok(true)
            }
            Kind::Response => {
                debug!(id = ?env.id, "ignoring unsolicited response");
                Ok(true)
            }
        }
    }
}

/// Answer an `acl.decide` request with the demo voter's opinion.
///
/// Anything that cannot be understood gets an abstain.
fn decide(store: &Store, params: &Value) -> Decision {
    let action = params
        .get("action")
        .and_then(|a| serde_json::from_value::<Action>(a.clone()).ok());
    let target = params.get("target").and_then(Value::as_i64);
    let (Some(action), Some(target)) = (action, target) else {
        return Decision::Abstain;
    };
    let actor = match params.get("actor").and_then(Value::as_i64) {
        Some(id) => Principal::user(id),
        None => Principal::anonymous(),
    };
    match store.get(&Principal::unrestricted(), target) {
        Ok(rsc) => DemoSelfEditVoter.decide(action, &actor, &rsc),
        Err(e) => {
            debug!(rsc_id = target, "abstaining: {e}");
            Decision::Abstain
        }
    }
}

fn intercept(store: &Store, hook: UpdateHookParams) -> Result<HookUpdate, crate::error::StoreError> {
    let revised = store.intercept(hook.id, &hook.raw, hook.update.into())?;
    Ok(revised.into())
}
