//! HTTP client, configuration builder, and request builder.

use crate::error::Error;
use crate::stream::CompletionStream;
use crate::template::Template;
use crate::types::{CompletionRequest, CompletionResult, Model};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::env;
use std::time::Duration;

const ENDPOINT_ENV: &str = "INFERSTREAM_ENDPOINT";
const API_KEY_ENV: &str = "INFERSTREAM_API_KEY";

/// Client for a local inference server.
///
/// Holds a pooled HTTP client plus the endpoint, bearer token, and default
/// context length. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    default_ctx: Option<u32>,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    default_ctx: Option<u32>,
    timeout: Option<Duration>,
    http_builder: reqwest::ClientBuilder,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            default_ctx: None,
            timeout: None,
            http_builder: reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_nodelay(true),
        }
    }

    /// Set the server base URL, e.g. `http://localhost:5143`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer token sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Context length applied to requests whose model does not set one.
    pub fn default_ctx(mut self, ctx: u32) -> Self {
        self.default_ctx = Some(ctx);
        self
    }

    /// Whole-request timeout, covering the full stream lifetime.
    ///
    /// Off by default: a hard timeout also cuts off long generations.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Load endpoint and API key from `INFERSTREAM_ENDPOINT` /
    /// `INFERSTREAM_API_KEY`.
    pub fn from_env(mut self) -> Self {
        if let Ok(endpoint) = env::var(ENDPOINT_ENV) {
            self.endpoint = Some(endpoint);
        }
        if let Ok(key) = env::var(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, Error> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::Config("endpoint is required".into()))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        reqwest::Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {endpoint}: {e}")))?;

        let api_key = self
            .api_key
            .ok_or_else(|| Error::Config("API key is required".into()))?;
        if api_key.is_empty() {
            return Err(Error::Config("API key is empty".into()));
        }

        let mut http_builder = self.http_builder;
        if let Some(timeout) = self.timeout {
            http_builder = http_builder.timeout(timeout);
        }
        let http = http_builder
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Client {
            http,
            endpoint,
            api_key,
            default_ctx: self.default_ctx,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, Error> {
        ClientBuilder::new().from_env().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Start building a completion request for `prompt`.
    pub fn completion(&self, prompt: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            request: CompletionRequest::new(prompt),
        }
    }

    /// Run a non-streaming completion.
    ///
    /// Exactly one request goes out; there is no hidden retry. The response
    /// body is parsed into a [`CompletionResult`].
    pub async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResult, Error> {
        request.stream = false;
        self.apply_default_ctx(&mut request);

        let url = format!("{}/completion", self.endpoint);
        tracing::debug!(%url, "sending completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers(false))
            .json(&request.to_body())
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let text = response.text().await.map_err(send_error)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| Error::parse(e.to_string()))?;
        CompletionResult::from_payload(value)
    }

    /// Open a streaming completion.
    ///
    /// Connects once (no retry) and hands back the event stream; transport
    /// and auth failures surface here, before any event is produced.
    pub async fn stream(
        &self,
        mut request: CompletionRequest,
    ) -> Result<CompletionStream<impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin>, Error>
    {
        request.stream = true;
        self.apply_default_ctx(&mut request);

        let url = format!("{}/completion", self.endpoint);
        tracing::debug!(%url, "opening completion stream");

        let response = self
            .http
            .post(&url)
            .headers(self.headers(true))
            .json(&request.to_body())
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_response(response).await);
        }

        Ok(CompletionStream::new(Box::pin(response.bytes_stream())))
    }

    /// Ask the server to load a model before inference.
    ///
    /// The server answers `204 No Content` on success.
    pub async fn load_model(&self, model: &Model) -> Result<(), Error> {
        let url = format!("{}/model/load", self.endpoint);
        tracing::debug!(%url, model = %model.name, "loading model");

        // The load route keys the model name under `model`, unlike the
        // completion body
        let mut body = serde_json::json!({ "model": model.name });
        if let Some(ctx) = model.ctx.or(self.default_ctx) {
            body["ctx"] = serde_json::Value::Number(ctx.into());
        }

        let response = self
            .http
            .post(&url)
            .headers(self.headers(false))
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }
        if !status.is_success() {
            return Err(self.handle_error_response(response).await);
        }
        Err(Error::api(status.as_u16(), "expected 204 from model load"))
    }

    /// Abort the inference currently running on the server.
    pub async fn abort(&self) -> Result<(), Error> {
        let url = format!("{}/completion/abort", self.endpoint);
        tracing::debug!(%url, "aborting inference");

        let response = self
            .http
            .get(&url)
            .headers(self.headers(false))
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(self.handle_error_response(response).await)
    }

    /// Fill in the configured default context length.
    fn apply_default_ctx(&self, request: &mut CompletionRequest) {
        if let (Some(model), Some(ctx)) = (&mut request.model, self.default_ctx) {
            if model.ctx.is_none() {
                model.ctx = Some(ctx);
            }
        }
    }

    /// Build request headers including auth.
    fn headers(&self, streaming: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if streaming {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, auth);
        }
        headers
    }

    /// Convert a non-success response into an [`Error`].
    async fn handle_error_response(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status, "request failed");

        match status {
            401 => Error::Unauthorized,
            500..=599 => Error::Server(status),
            _ => {
                // Try to extract an error message from the JSON body
                let message = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v["error"]
                            .as_str()
                            .or_else(|| v["error"]["message"].as_str())
                            .or_else(|| v["message"].as_str())
                            .map(std::string::ToString::to_string)
                    })
                    .unwrap_or(body);
                Error::api(status, message)
            }
        }
    }
}

/// Map a failed send to [`Error`], distinguishing timeouts.
fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

/// Builder for individual completion requests.
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: CompletionRequest,
}

impl RequestBuilder<'_> {
    /// Set the model (a bare name or a [`Model`] with context length).
    pub fn model(mut self, model: impl Into<Model>) -> Self {
        self.request.model = Some(model.into());
        self
    }

    /// Set the prompt template.
    pub fn template(mut self, template: Template) -> Self {
        self.request.template = Some(template);
        self
    }

    /// Set temperature for sampling.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.request.temperature = Some(temp);
        self
    }

    /// Set top-p for nucleus sampling.
    pub fn top_p(mut self, p: f32) -> Self {
        self.request.top_p = Some(p);
        self
    }

    /// Set minimum token probability.
    pub fn min_p(mut self, p: f32) -> Self {
        self.request.min_p = Some(p);
        self
    }

    /// Set top-k sampling cutoff.
    pub fn top_k(mut self, k: u32) -> Self {
        self.request.top_k = Some(k);
        self
    }

    /// Set repetition penalty.
    pub fn repeat_penalty(mut self, penalty: f32) -> Self {
        self.request.repeat_penalty = Some(penalty);
        self
    }

    /// Set frequency penalty.
    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.request.frequency_penalty = Some(penalty);
        self
    }

    /// Set presence penalty.
    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.request.presence_penalty = Some(penalty);
        self
    }

    /// Set tail-free sampling z.
    pub fn tfs(mut self, z: f32) -> Self {
        self.request.tfs = Some(z);
        self
    }

    /// Set maximum tokens to generate.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.request.max_tokens = Some(tokens);
        self
    }

    /// Set stop sequences.
    pub fn stop(mut self, sequences: Vec<String>) -> Self {
        self.request.stop = Some(sequences);
        self
    }

    /// Add extra server-specific fields, passed through verbatim.
    pub fn extra(mut self, extra: serde_json::Value) -> Self {
        self.request.extra = Some(extra);
        self
    }

    /// Send as a non-streaming request.
    pub async fn complete(self) -> Result<CompletionResult, Error> {
        self.client.complete(self.request).await
    }

    /// Send as a streaming request.
    pub async fn stream(
        self,
    ) -> Result<CompletionStream<impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin>, Error>
    {
        self.client.stream(self.request).await
    }
}
