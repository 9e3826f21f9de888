//! Streaming completion handler.
//!
//! Drives one SSE response to completion: tokens and diagnostics are
//! forwarded to the caller in arrival order, the terminal `result` event is
//! captured for [`CompletionStream::finalize`], and every failure mode ends
//! the stream for good. States: streaming, completed, failed — the last two
//! are terminal.

use crate::error::Error;
use crate::sse::SseParser;
use crate::types::{CompletionResult, StreamEvent, SystemMessage};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;

/// `content` value of the terminal `system` event.
const RESULT_MARKER: &str = "result";

pin_project! {
    /// A streaming completion response.
    ///
    /// Yields [`StreamEvent`] items; after the stream is exhausted,
    /// [`finalize`](CompletionStream::finalize) returns the
    /// [`CompletionResult`] carried by the terminal event.
    pub struct CompletionStream<S> {
        #[pin]
        inner: S,
        parser: SseParser,
        // Tokens forwarded so far, kept so a truncated stream still has
        // its partial output available.
        content: String,
        result: Option<CompletionResult>,
        done: bool,
    }
}

impl<S> std::fmt::Debug for CompletionStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("content", &self.content)
            .field("result", &self.result)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<S> CompletionStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    /// Wrap a raw byte stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            content: String::with_capacity(4096),
            result: None,
            done: false,
        }
    }

    /// Get the next event from the stream.
    ///
    /// Returns `None` once the stream has completed or failed. Events come
    /// back in the exact order the server sent them; nothing is batched or
    /// reordered.
    pub async fn next(&mut self) -> Option<Result<StreamEvent, Error>> {
        use futures::StreamExt;

        if self.done {
            return None;
        }

        loop {
            // Drain buffered frames before touching the transport
            if let Some(frame) = self.parser.next_frame() {
                if SseParser::is_done(&frame.data) {
                    // Sentinel after the result; without a result it means
                    // the server gave up
                    self.done = true;
                    if self.result.is_some() {
                        return None;
                    }
                    return Some(Err(Error::Interrupted));
                }

                match self.dispatch(&frame.data) {
                    Ok(Some(event)) => {
                        if let StreamEvent::Token { text, .. } = &event {
                            self.content.push_str(text);
                        }
                        return Some(Ok(event));
                    }
                    Ok(None) => {
                        // Result captured; nothing further is processed
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            // Need more data from the transport
            match self.inner.next().await {
                Some(Ok(bytes)) => {
                    self.parser.feed(&bytes);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(Error::Http(e)));
                }
                None => {
                    // Connection closed without a result event
                    tracing::debug!(
                        partial_len = self.content.len(),
                        "stream closed before result event"
                    );
                    self.done = true;
                    return Some(Err(Error::Interrupted));
                }
            }
        }
    }

    /// Decode one event payload and dispatch by `msg_type`.
    ///
    /// `Ok(None)` means the terminal result was captured.
    fn dispatch(&mut self, data: &str) -> Result<Option<StreamEvent>, Error> {
        let value: Value = serde_json::from_str(data).map_err(|e| Error::parse(e.to_string()))?;

        let msg_type = value
            .get("msg_type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parse("event missing `msg_type`"))?;

        match msg_type {
            "token" => {
                let text = value
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::parse("token event missing `content`"))?
                    .to_string();
                let num = value.get("num").and_then(Value::as_u64);
                Ok(Some(StreamEvent::Token { text, num }))
            }
            "system" => {
                let content = value
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::parse("system event missing `content`"))?
                    .to_string();

                if content == RESULT_MARKER {
                    let result = CompletionResult::from_payload(value)?;
                    tracing::debug!(text_len = result.text.len(), "result event received");
                    self.result = Some(result);
                    return Ok(None);
                }

                let num = value.get("num").and_then(Value::as_u64);
                let data = match value.get("data") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                Ok(Some(StreamEvent::Diagnostic(SystemMessage {
                    content,
                    num,
                    data,
                })))
            }
            "error" => {
                let message = value
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified")
                    .to_string();
                Err(Error::Inference(message))
            }
            other => Err(Error::UnknownMsgType(other.to_string())),
        }
    }

    /// Consume the stream and return the terminal result.
    ///
    /// Fails with [`Error::Interrupted`] if the stream ended (or failed)
    /// without delivering a `result` event — a truncated stream is never
    /// mistaken for a clean finish.
    pub fn finalize(mut self) -> Result<CompletionResult, Error> {
        self.result.take().ok_or(Error::Interrupted)
    }

    /// Tokens received so far, concatenated.
    ///
    /// Remains available after a failure, so partial output is not lost.
    pub fn partial_text(&self) -> &str {
        &self.content
    }

    /// True once the stream has completed or failed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True if the terminal result event has been received.
    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn stream_of(
        frames: Vec<&'static str>,
    ) -> CompletionStream<impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin> {
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            frames.into_iter().map(|f| Ok(Bytes::from(f))).collect();
        CompletionStream::new(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_tokens_in_order_then_result() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"token\",\"content\":\"Mercury\",\"num\":1}\n\n",
            "data: {\"msg_type\":\"token\",\"content\":\", Venus\",\"num\":2}\n\n",
            "data: {\"msg_type\":\"system\",\"content\":\"result\",\"data\":{\"text\":\"Mercury, Venus\"}}\n\n",
            "data: [DONE]\n\n",
        ]);

        let mut tokens = Vec::new();
        while let Some(event) = stream.next().await {
            if let Some(text) = event.unwrap().text() {
                tokens.push(text.to_string());
            }
        }

        assert_eq!(tokens, vec!["Mercury", ", Venus"]);
        assert!(stream.is_completed());
        assert_eq!(stream.partial_text(), "Mercury, Venus");

        let result = stream.finalize().unwrap();
        assert_eq!(result.text, "Mercury, Venus");
    }

    #[tokio::test]
    async fn test_no_events_after_result() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"system\",\"content\":\"result\",\"data\":{\"text\":\"hi\"}}\n\ndata: {\"msg_type\":\"token\",\"content\":\"stray\"}\n\n",
        ]);

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.finalize().unwrap().text, "hi");
    }

    #[tokio::test]
    async fn test_diagnostic_does_not_terminate() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"system\",\"content\":\"start_emitting\",\"num\":0,\"data\":{\"thinking_time_format\":\"1.2s\"}}\n\n",
            "data: {\"msg_type\":\"token\",\"content\":\"ok\",\"num\":1}\n\n",
            "data: {\"msg_type\":\"system\",\"content\":\"result\",\"data\":{\"text\":\"ok\"}}\n\n",
        ]);

        let first = stream.next().await.unwrap().unwrap();
        match first {
            StreamEvent::Diagnostic(msg) => {
                assert_eq!(msg.content, "start_emitting");
                assert_eq!(msg.num, Some(0));
                assert_eq!(msg.data["thinking_time_format"], "1.2s");
            }
            StreamEvent::Token { .. } => panic!("expected diagnostic"),
        }

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.text(), Some("ok"));

        assert!(stream.next().await.is_none());
        assert!(stream.is_completed());
    }

    #[tokio::test]
    async fn test_interrupted_without_result() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"token\",\"content\":\"partial\",\"num\":1}\n\n",
        ]);

        assert_eq!(stream.next().await.unwrap().unwrap().text(), Some("partial"));

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(err.kind(), ErrorKind::Transport);

        // Partial output stays visible
        assert_eq!(stream.partial_text(), "partial");
        assert!(matches!(stream.finalize(), Err(Error::Interrupted)));
    }

    #[tokio::test]
    async fn test_done_sentinel_without_result_is_interrupted() {
        let mut stream = stream_of(vec!["data: [DONE]\n\n"]);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[tokio::test]
    async fn test_malformed_json_aborts() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"token\",\"content\":\"a\"}\n\n",
            "data: {not json\n\n",
            "data: {\"msg_type\":\"token\",\"content\":\"never seen\"}\n\n",
        ]);

        assert_eq!(stream.next().await.unwrap().unwrap().text(), Some("a"));

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);

        // Failed is terminal
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_msg_type_is_decode_error() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"telemetry\",\"content\":\"x\"}\n\n",
        ]);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::UnknownMsgType(ref t) if t == "telemetry"));
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_server_error_event_fails_stream() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"token\",\"content\":\"a\"}\n\n",
            "data: {\"msg_type\":\"error\",\"content\":\"model crashed\"}\n\n",
        ]);

        assert_eq!(stream.next().await.unwrap().unwrap().text(), Some("a"));

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Inference(ref m) if m == "model crashed"));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let mut stream = stream_of(vec![
            "data: {\"msg_type\":\"tok",
            "en\",\"content\":\"He",
            "llo\",\"num\":1}\n",
            "\ndata: {\"msg_type\":\"system\",\"content\":\"result\",\"data\":{\"text\":\"Hello\"}}\n\n",
        ]);

        assert_eq!(stream.next().await.unwrap().unwrap().text(), Some("Hello"));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.finalize().unwrap().text, "Hello");
    }
}
