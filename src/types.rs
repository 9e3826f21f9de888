use crate::error::Error;
use crate::template::Template;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model selection for a completion request.
///
/// The wire format accepts either a bare model name or an object carrying a
/// context length. Both collapse into this one type: a `Model` without `ctx`
/// serializes as a plain string, one with `ctx` as `{"name", "ctx"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub name: String,
    pub ctx: Option<u32>,
}

impl Model {
    /// Model by name, leaving the context length to the server default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ctx: None,
        }
    }

    /// Set the context length.
    pub fn with_ctx(mut self, ctx: u32) -> Self {
        self.ctx = Some(ctx);
        self
    }
}

impl Serialize for Model {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.ctx {
            None => serializer.serialize_str(&self.name),
            Some(ctx) => {
                let mut s = serializer.serialize_struct("Model", 2)?;
                s.serialize_field("name", &self.name)?;
                s.serialize_field("ctx", &ctx)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Model {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Full {
                name: String,
                #[serde(default)]
                ctx: Option<u32>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) => Model { name, ctx: None },
            Repr::Full { name, ctx } => Model { name, ctx },
        })
    }
}

impl From<&str> for Model {
    fn from(name: &str) -> Self {
        Model::new(name)
    }
}

/// A completion request.
///
/// Optional fields are omitted from the wire body so the server applies its
/// own defaults. Construct one directly or through
/// [`crate::client::RequestBuilder`].
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: Option<Model>,
    pub prompt: String,
    pub template: Option<Template>,
    pub stream: bool,
    // Sampling
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub min_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub tfs: Option<f32>,
    // Generation
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    /// Extra fields passed through to the server verbatim.
    pub extra: Option<Value>,
}

impl CompletionRequest {
    /// A request with just a prompt; everything else is server defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Build the JSON request body.
    pub(crate) fn to_body(&self) -> Value {
        let mut body = serde_json::json!({
            "prompt": self.prompt,
        });

        if let Some(model) = &self.model {
            body["model"] = serde_json::to_value(model).unwrap_or(Value::Null);
        }
        if let Some(template) = &self.template {
            body["template"] = Value::String(template.as_str().to_string());
        }
        if self.stream {
            body["stream"] = Value::Bool(true);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(min_p) = self.min_p {
            body["min_p"] = serde_json::json!(min_p);
        }
        if let Some(top_k) = self.top_k {
            body["top_k"] = Value::Number(top_k.into());
        }
        if let Some(repeat_penalty) = self.repeat_penalty {
            body["repeat_penalty"] = serde_json::json!(repeat_penalty);
        }
        if let Some(frequency_penalty) = self.frequency_penalty {
            body["frequency_penalty"] = serde_json::json!(frequency_penalty);
        }
        if let Some(presence_penalty) = self.presence_penalty {
            body["presence_penalty"] = serde_json::json!(presence_penalty);
        }
        if let Some(tfs) = self.tfs {
            body["tfs"] = serde_json::json!(tfs);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = Value::Number(max_tokens.into());
        }
        if let Some(stop) = &self.stop {
            body["stop"] = serde_json::to_value(stop).unwrap_or(Value::Null);
        }

        // Merge extra fields verbatim
        if let Some(Value::Object(map)) = &self.extra {
            if let Value::Object(ref mut body_map) = body {
                for (k, v) in map {
                    body_map.insert(k.clone(), v.clone());
                }
            }
        }

        body
    }
}

/// Timing statistics attached to a completion result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InferStats {
    pub thinking_time: f64,
    pub thinking_time_format: String,
    pub emit_time: f64,
    pub emit_time_format: String,
    pub total_time: f64,
    pub total_time_format: String,
    pub tokens_per_second: f64,
    pub total_tokens: u64,
}

/// A non-result `system` message forwarded mid-stream.
#[derive(Debug, Clone)]
pub struct SystemMessage {
    /// Free-form label, e.g. `start_emitting`.
    pub content: String,
    /// Ordinal assigned by the server, if any.
    pub num: Option<u64>,
    /// Attached payload, e.g. thinking-time measurements.
    pub data: Map<String, Value>,
}

/// An event delivered to the caller while streaming.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An incremental fragment of generated text, in arrival order.
    Token { text: String, num: Option<u64> },
    /// An informational/diagnostic message; streaming continues.
    Diagnostic(SystemMessage),
}

impl StreamEvent {
    /// Token text, if this event carries any.
    #[inline]
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEvent::Token { text, .. } => Some(text),
            StreamEvent::Diagnostic(_) => None,
        }
    }
}

/// Terminal payload of a completion, produced exactly once per request.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    /// The full generated text.
    pub text: String,
    /// Timing statistics, when the server attaches them.
    pub stats: Option<InferStats>,
    /// The complete payload, for metadata beyond `text` and `stats`.
    pub data: Map<String, Value>,
}

impl CompletionResult {
    /// Parse a result from a JSON payload.
    ///
    /// Accepts both the bare `{text, stats}` object a non-streaming response
    /// carries and a result-event envelope nesting that object under `data`.
    pub(crate) fn from_payload(value: Value) -> Result<Self, Error> {
        let Value::Object(mut map) = value else {
            return Err(Error::parse("result payload is not a JSON object"));
        };

        let obj = match map.remove("data") {
            Some(Value::Object(inner)) if inner.contains_key("text") => inner,
            _ => map,
        };

        let text = obj
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::parse("result payload missing `text`"))?;

        let stats = obj
            .get("stats")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Ok(Self {
            text,
            stats,
            data: obj,
        })
    }
}
