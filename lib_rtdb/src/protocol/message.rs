//! Inbound data messages.
//!
//! A reassembled document is either a data frame (`{"t":"d","d":{...}}`)
//! carrying a request, or something the server does not act on: control
//! frames, bare count frames, frames with an action code it does not know.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::MessageError;
use crate::protocol::path::{normalize_path, NormalizedPath};

/// Request actions understood by the session dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// `l`: subscribe to a location.
    Listen,
    /// `q`: subscribe to a location with query directives.
    Query,
    /// `n`: cancel a subscription.
    Unlisten,
    /// `m`: shallow merge into a location.
    Merge,
    /// `p`: overwrite a location.
    Set,
    /// `auth`: present a credential.
    Auth,
    /// `gauth`: present a credential (Google-style flow, handled like `auth`).
    GAuth,
}

impl Action {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "l" => Some(Action::Listen),
            "q" => Some(Action::Query),
            "n" => Some(Action::Unlisten),
            "m" => Some(Action::Merge),
            "p" => Some(Action::Set),
            "auth" => Some(Action::Auth),
            "gauth" => Some(Action::GAuth),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Action::Listen => "l",
            Action::Query => "q",
            Action::Unlisten => "n",
            Action::Merge => "m",
            Action::Set => "p",
            Action::Auth => "auth",
            Action::GAuth => "gauth",
        }
    }
}

/// A normalized request. Built once per data frame and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    action: Action,
    request_id: Option<u64>,
    path: NormalizedPath,
    data: Value,
    hash: Option<String>,
    credential: Option<String>,
    query: Option<Map<String, Value>>,
}

impl Message {
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    /// Data location, without leading slash or `.priority` suffix.
    pub fn path(&self) -> &str {
        &self.path.path
    }

    pub fn full_path(&self) -> &str {
        &self.path.full_path
    }

    pub fn is_priority_path(&self) -> bool {
        self.path.is_priority_path
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Expected content hash for a conditional set.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn query(&self) -> Option<&Map<String, Value>> {
        self.query.as_ref()
    }
}

/// What a reassembled document turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request(Message),
    /// A data frame whose action code is not recognized.
    UnknownAction { code: String, request_id: Option<u64> },
    /// Anything that is not a data frame.
    Ignored,
}

#[derive(Deserialize)]
struct RawData {
    r: Option<u64>,
    a: Option<String>,
    b: Option<RawBody>,
}

#[derive(Deserialize, Default)]
struct RawBody {
    p: Option<String>,
    d: Option<Value>,
    h: Option<String>,
    cred: Option<String>,
    q: Option<Map<String, Value>>,
}

/// Classifies a parsed document and, for data frames, builds the [`Message`].
pub fn decode(value: Value) -> Result<Inbound, MessageError> {
    let Value::Object(mut frame) = value else {
        return Ok(Inbound::Ignored);
    };
    if frame.get("t").and_then(Value::as_str) != Some("d") {
        return Ok(Inbound::Ignored);
    }
    let data = frame.remove("d").ok_or(MessageError::MissingBody)?;
    let raw: RawData = serde_json::from_value(data)?;

    let Some(code) = raw.a else {
        return Ok(Inbound::Ignored);
    };
    let Some(action) = Action::from_code(&code) else {
        return Ok(Inbound::UnknownAction {
            code,
            request_id: raw.r,
        });
    };

    let body = raw.b.unwrap_or_default();
    Ok(Inbound::Request(Message {
        action,
        request_id: raw.r,
        path: normalize_path(body.p.as_deref().unwrap_or_default()),
        data: body.d.unwrap_or(Value::Null),
        hash: body.h,
        credential: body.cred,
        query: body.q,
    }))
}
