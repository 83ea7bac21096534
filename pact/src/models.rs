//! Wire types exchanged with the verification engine.

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path the engine posts state-change instructions to.
pub const PROVIDER_STATES_SETUP_PATH: &str = "/__setup";

/// Path the engine asks for message payloads on.
pub const MESSAGES_PATH: &str = "/__messages";

/// Keys of a state-change payload that are not parameters.
pub const RESERVED_STATE_KEYS: [&str; 2] = ["action", "state"];

/// Parameters of a provider state.
pub type ProviderStateParams = Map<String, Value>;

/// Values a state handler hands back to the engine, e.g. for generators.
pub type ProviderStateResponse = Map<String, Value>;

/// A named precondition with its parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderState {
    /// State name, as written in the pact
    pub name: String,
    /// State parameters
    #[serde(default, rename = "params", alias = "parameters")]
    pub parameters: ProviderStateParams,
}

impl ProviderState {
    /// Create a state without parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Map::new(),
        }
    }
}

/// Control keys of a state-change payload.
#[derive(Debug, Default, Deserialize)]
struct StateChangeEnvelope {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// A decoded `{"action": ..., "state": ..., ...params}` payload.
///
/// e.g. `{"action":"teardown","id":"foo","state":"User foo exists"}`
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeInstruction {
    /// `setup` or `teardown`
    pub action: String,
    /// State name
    pub state: String,
    /// Every other top-level key of the payload
    pub params: ProviderStateParams,
}

impl StateChangeInstruction {
    /// Decode a raw payload.
    ///
    /// The payload is read twice: once for the control keys and once as a
    /// generic object whose remaining keys become the parameters.
    ///
    /// # Errors
    ///
    /// Fails if the payload is neither a JSON object nor `null`, or a control
    /// key has the wrong type. A `null` payload decodes to an empty instruction.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope = serde_json::from_slice::<Option<StateChangeEnvelope>>(raw)?.unwrap_or_default();

        // params share the root object with the control keys
        let mut params = serde_json::from_slice::<Option<ProviderStateParams>>(raw)?.unwrap_or_default();
        for key in RESERVED_STATE_KEYS {
            params.remove(key);
        }

        Ok(Self {
            action: envelope.action.unwrap_or_default(),
            state: envelope.state.unwrap_or_default(),
            params,
        })
    }

    /// Whether this is a setup (as opposed to teardown) call.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.action == "setup"
    }

    /// The state handed to a state handler.
    #[must_use]
    pub fn provider_state(&self) -> ProviderState {
        ProviderState {
            name: self.state.clone(),
            parameters: self.params.clone(),
        }
    }
}

/// Where the engine reaches a non-HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// Path on the proxy
    pub path: String,
    /// Protocol name
    pub protocol: String,
    /// Proxy port
    pub port: u16,
}

impl Transport {
    /// The message transport served by the proxy on `port`.
    #[must_use]
    pub fn message(port: u16) -> Self {
        Self {
            path: MESSAGES_PATH.to_string(),
            protocol: "message".to_string(),
            port,
        }
    }
}

/// Request body the engine sends to the message endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Message description, as written in the pact
    pub description: String,
    /// States the message is produced under
    #[serde(default, rename = "providerStates")]
    pub states: Vec<ProviderState>,
}

/// Contents of a produced message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// A JSON document
    Json(Value),
    /// Opaque bytes with their content type
    Binary {
        /// MIME type of `bytes`
        content_type: String,
        /// Raw contents
        bytes: Bytes,
    },
}

/// A message produced by a message handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Contents
    pub body: MessageBody,
    /// Message metadata, sent alongside the body
    pub metadata: Map<String, Value>,
}

impl Message {
    /// A JSON message without metadata.
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self {
            body: MessageBody::Json(body),
            metadata: Map::new(),
        }
    }

    /// A binary message without metadata.
    #[must_use]
    pub fn binary(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            body: MessageBody::Binary {
                content_type: content_type.into(),
                bytes: bytes.into(),
            },
            metadata: Map::new(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Content type: metadata `contentType`/`content-type` wins over the body's own.
    #[must_use]
    pub fn content_type(&self) -> &str {
        ["contentType", "content-type"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(Value::as_str))
            .unwrap_or(match &self.body {
                MessageBody::Json(_) => "application/json",
                MessageBody::Binary { content_type, .. } => content_type,
            })
    }
}
