use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Well known event topics.
pub mod topics {
    pub const CORE_HELLO: &str = "core.hello";
    pub const SYSTEM_READY: &str = "system.ready";
    pub const TIMER_TICK: &str = "timer.tick";
}

/// Well known request methods, in both directions.
pub mod methods {
    pub const PLUGIN_INIT: &str = "plugin.init";
    pub const PLUGIN_START: &str = "plugin.start";
    pub const PLUGIN_STOP: &str = "plugin.stop";
    pub const EVENT_SUBSCRIBE: &str = "event.subscribe";
    pub const TIMER_SET_INTERVAL: &str = "timer.set_interval";
    pub const ACL_DECIDE: &str = "acl.decide";
    pub const RESOURCE_UPDATE: &str = "resource.update";
}

/// JSON-RPC code for an unknown method.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC code for malformed params.
pub const INVALID_PARAMS: i32 = -32602;
/// JSON-RPC code for a failure on the answering side.
pub const INTERNAL_ERROR: i32 = -32603;

/// Kind of envelope used in the JSON protocol.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Request,
    Response,
    Event,
}

/// Standard RPC style error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Top level envelope exchanged between core and plugins.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub id: Option<String>,
    pub kind: Kind,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub topic: Option<String>,
    pub payload: Option<Value>,
}

impl Envelope {
    fn empty(kind: Kind) -> Self {
        Self {
            id: None,
            kind,
            method: None,
            params: None,
            result: None,
            error: None,
            topic: None,
            payload: None,
        }
    }

    /// A request carrying a caller chosen correlation id.
    pub fn request(id: impl Into<String>, method: &str, params: Value) -> Self {
        Self {
            id: Some(id.into()),
            method: Some(method.to_string()),
            params: Some(params),
            ..Self::empty(Kind::Request)
        }
    }

    /// A successful response to the request with `id`.
    pub fn response(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            ..Self::empty(Kind::Response)
        }
    }

    /// A failed response to the request with `id`.
    pub fn error_response(id: Option<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            ..Self::empty(Kind::Response)
        }
    }

    /// A fire-and-forget event on `topic`.
    pub fn event(topic: &str, payload: Option<Value>) -> Self {
        Self {
            topic: Some(topic.to_string()),
            payload,
            ..Self::empty(Kind::Event)
        }
    }

    pub fn is_request(&self, method: &str) -> bool {
        self.kind == Kind::Request && self.method.as_deref() == Some(method)
    }

    pub fn is_event(&self, topic: &str) -> bool {
        self.kind == Kind::Event && self.topic.as_deref() == Some(topic)
    }
}

/// Metadata a plugin provides during the init phase.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub needs: Vec<String>,
}

/// Read a single line-delimited JSON envelope from the reader.
///
/// Returns `Ok(None)` once the peer has closed the pipe.
pub async fn read_envelope<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Envelope>> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    let env = serde_json::from_str(line.trim())?;
    Ok(Some(env))
}

/// Write a single envelope as line-delimited JSON to the writer.
pub async fn write_envelope<W: AsyncWrite + Unpin>(writer: &mut W, env: &Envelope) -> Result<()> {
    let s = serde_json::to_string(env)?;
    writer.write_all(s.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
