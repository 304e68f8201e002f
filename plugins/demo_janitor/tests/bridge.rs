use std::{sync::Arc, time::Duration as StdDuration};

use demo_janitor::{
    acl::Principal,
    clock::ManualClock,
    core_bridge::{self, TIMER_ID},
    db,
    demo::{self, DEMO_CONTENT_GROUP, DEMO_USER},
    model::NewResource,
    seed, Janitor, Store, SweepPolicy,
};
use plugin_api::{methods, read_envelope, topics, write_envelope, Envelope, Kind, METHOD_NOT_FOUND};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tokio::io::{split, AsyncWrite, BufReader, DuplexStream, ReadHalf, WriteHalf};

type HostReader = BufReader<ReadHalf<DuplexStream>>;
type HostWriter = WriteHalf<DuplexStream>;

fn janitor() -> (Janitor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
    ));
    let store = demo::install_hooks(Store::builder(db::init_pool(":memory:").unwrap()))
        .clock(clock.clone())
        .build();
    seed::install(&store).unwrap();
    (Janitor::new(store, SweepPolicy::default()), clock)
}

async fn send<W: AsyncWrite + Unpin>(w: &mut W, env: Envelope) {
    write_envelope(w, &env).await.unwrap();
}

async fn expect_request(r: &mut HostReader, method: &str) -> Envelope {
    let env = read_envelope(r).await.unwrap().expect("plugin closed pipe");
    assert!(env.is_request(method), "expected {method}, got {env:?}");
    env
}

async fn ack(w: &mut HostWriter, req: &Envelope) {
    send(w, Envelope::response(req.id.clone(), json!({"ok": true}))).await;
}

async fn call(r: &mut HostReader, w: &mut HostWriter, id: &str, method: &str, params: Value) -> Envelope {
    send(w, Envelope::request(id, method, params)).await;
    let env = read_envelope(r).await.unwrap().expect("plugin closed pipe");
    assert_eq!(env.kind, Kind::Response);
    assert_eq!(env.id.as_deref(), Some(id));
    env
}

/// Plays the core side of the handshake, sending a tick before the last ack.
async fn handshake(r: &mut HostReader, w: &mut HostWriter) {
    send(w, Envelope::event(topics::CORE_HELLO, Some(json!({"api_version": "1"})))).await;

    let init = expect_request(r, methods::PLUGIN_INIT).await;
    let meta = &init.params.as_ref().unwrap()["metadata"];
    assert_eq!(meta["id"], "demo_janitor");
    ack(w, &init).await;

    let start = expect_request(r, methods::PLUGIN_START).await;
    ack(w, &start).await;
    send(w, Envelope::event(topics::SYSTEM_READY, None)).await;

    let sub = expect_request(r, methods::EVENT_SUBSCRIBE).await;
    assert_eq!(sub.params.as_ref().unwrap()["topics"], json!([topics::TIMER_TICK]));
    ack(w, &sub).await;

    let timer = expect_request(r, methods::TIMER_SET_INTERVAL).await;
    let params = timer.params.clone().unwrap();
    assert_eq!(params["id"], TIMER_ID);
    assert_eq!(params["millis"], 3_600_000);
    send(w, Envelope::event(topics::TIMER_TICK, Some(json!({"id": TIMER_ID, "now_ms": 0})))).await;
    ack(w, &timer).await;
}

#[tokio::test]
async fn handshake_tick_and_stop() {
    let (janitor, clock) = janitor();
    let store = janitor.store().clone();
    let cg = store.lookup(DEMO_CONTENT_GROUP).unwrap().unwrap();
    let visitor = Principal::user(store.lookup(DEMO_USER).unwrap().unwrap());
    let stale = store
        .insert(&visitor, NewResource::new("text", "old").in_group(cg).protected())
        .unwrap();
    clock.advance(Duration::hours(48));

    let (plugin_io, host_io) = tokio::io::duplex(64 * 1024);
    let (pr, pw) = split(plugin_io);
    let plugin = tokio::spawn(core_bridge::serve(
        BufReader::new(pr),
        pw,
        janitor,
        StdDuration::from_secs(3600),
    ));
    let (hr, mut w) = split(host_io);
    let mut r = BufReader::new(hr);

    handshake(&mut r, &mut w).await;

    // requests are answered after the queued tick has been handled
    let resp = call(&mut r, &mut w, "x1", "bogus.method", json!({})).await;
    assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    assert!(store.get(&visitor, stale.id).unwrap_err().is_not_found());

    let stop = call(&mut r, &mut w, "x2", methods::PLUGIN_STOP, json!({})).await;
    assert!(stop.error.is_none());
    plugin.await.unwrap().unwrap();
}

#[tokio::test]
async fn foreign_ticks_do_not_sweep() {
    let (janitor, clock) = janitor();
    let store = janitor.store().clone();
    let cg = store.lookup(DEMO_CONTENT_GROUP).unwrap().unwrap();
    let visitor = Principal::user(store.lookup(DEMO_USER).unwrap().unwrap());

    let (plugin_io, host_io) = tokio::io::duplex(64 * 1024);
    let (pr, pw) = split(plugin_io);
    let plugin = tokio::spawn(core_bridge::serve(
        BufReader::new(pr),
        pw,
        janitor,
        StdDuration::from_secs(3600),
    ));
    let (hr, mut w) = split(host_io);
    let mut r = BufReader::new(hr);
    handshake(&mut r, &mut w).await;

    let rsc = store
        .insert(&visitor, NewResource::new("text", "old").in_group(cg))
        .unwrap();
    clock.advance(Duration::hours(48));
    send(&mut w, Envelope::event(topics::TIMER_TICK, Some(json!({"id": "someone.else"})))).await;
    call(&mut r, &mut w, "x1", "bogus.method", json!({})).await;
    assert!(store.get(&visitor, rsc.id).is_ok());

    // closing the pipe ends the plugin cleanly
    drop(w);
    drop(r);
    plugin.await.unwrap().unwrap();
}

#[tokio::test]
async fn answers_acl_and_update_hooks() {
    let (janitor, _) = janitor();
    let store = janitor.store().clone();
    let cg = store.lookup(DEMO_CONTENT_GROUP).unwrap().unwrap();
    let demo_user = store.lookup(DEMO_USER).unwrap().unwrap();

    let (plugin_io, host_io) = tokio::io::duplex(64 * 1024);
    let (pr, pw) = split(plugin_io);
    let plugin = tokio::spawn(core_bridge::serve(
        BufReader::new(pr),
        pw,
        janitor,
        StdDuration::from_secs(3600),
    ));
    let (hr, mut w) = split(host_io);
    let mut r = BufReader::new(hr);
    handshake(&mut r, &mut w).await;

    let decide = |action: &str, actor: Value| {
        json!({"action": action, "actor": actor, "target": demo_user})
    };
    let cases = [
        ("update", json!(demo_user), "deny"),
        ("delete", json!(demo_user), "deny"),
        ("view", json!(demo_user), "abstain"),
        ("update", json!(demo_user + 1), "abstain"),
        ("update", Value::Null, "abstain"),
        ("frobnicate", json!(demo_user), "abstain"),
    ];
    for (i, (action, actor, expected)) in cases.into_iter().enumerate() {
        let resp = call(&mut r, &mut w, &format!("acl{i}"), methods::ACL_DECIDE, decide(action, actor)).await;
        assert_eq!(resp.result.unwrap()["decision"], expected, "{action}");
    }
    let resp = call(&mut r, &mut w, "acl-missing", methods::ACL_DECIDE, json!({"target": 424242})).await;
    assert_eq!(resp.result.unwrap()["decision"], "abstain");

    let resp = call(
        &mut r,
        &mut w,
        "upd1",
        methods::RESOURCE_UPDATE,
        json!({
            "raw": {"content_group_id": cg, "seo_noindex": false},
            "update": {"ok": {"content_group_id": cg, "seo_noindex": false, "title": "t"}}
        }),
    )
    .await;
    assert_eq!(
        resp.result.unwrap(),
        json!({"ok": {"content_group_id": cg, "seo_noindex": true, "title": "t"}})
    );

    let resp = call(
        &mut r,
        &mut w,
        "upd2",
        methods::RESOURCE_UPDATE,
        json!({"raw": {}, "update": {"error": "validation failed"}}),
    )
    .await;
    assert_eq!(resp.result.unwrap(), json!({"error": "validation failed"}));

    let resp = call(&mut r, &mut w, "upd3", methods::RESOURCE_UPDATE, json!({"nonsense": 1})).await;
    assert!(resp.error.is_some());

    call(&mut r, &mut w, "stop", methods::PLUGIN_STOP, json!({})).await;
    plugin.await.unwrap().unwrap();
}
