//! An in-process backend whose answers are scripted by the test.

use async_trait::async_trait;
use parking_lot::Mutex;
use plughost_core::{
    Backend, BackendConfig, BackendError, BackendResult, InitializationRequest, LogicalRequest,
    LogicalResponse, Operation,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// What the backend answers for a request.
pub type Reply = BackendResult<Option<LogicalResponse>>;

/// Build a response whose data is `value` (which must be a JSON object).
pub fn data_response(value: Value) -> LogicalResponse {
    match value {
        Value::Object(map) => LogicalResponse::with_data(map),
        other => panic!("response data must be an object, got {other}"),
    }
}

/// Backend that records every call and replies from a script.
///
/// Replies are keyed by operation and path; anything unscripted answers
/// `Ok(None)`.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<(Operation, String), Reply>>,
    requests: Mutex<Vec<LogicalRequest>>,
    events: Mutex<Vec<String>>,
    setup_config: Mutex<Option<HashMap<String, String>>>,
    setup_error: Mutex<Option<BackendError>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply for `operation` on `path`.
    pub fn respond(self, operation: Operation, path: &str, reply: Reply) -> Self {
        self.set_reply(operation, path, reply);
        self
    }

    /// Answer help requests with `doc` as the `openapi` object.
    pub fn with_openapi(self, doc: Value) -> Self {
        let mut data = Map::new();
        data.insert("openapi".to_string(), doc);
        self.respond(Operation::Help, "", Ok(Some(LogicalResponse::with_data(data))))
    }

    /// Make `setup` fail with `err`.
    pub fn fail_setup(self, err: BackendError) -> Self {
        *self.setup_error.lock() = Some(err);
        self
    }

    /// Delay every `handle_request` by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Replace a scripted reply while the backend is in use.
    pub fn set_reply(&self, operation: Operation, path: &str, reply: Reply) {
        self.replies.lock().insert((operation, path.to_string()), reply);
    }

    /// Every request handled so far.
    pub fn requests(&self) -> Vec<LogicalRequest> {
        self.requests.lock().clone()
    }

    /// Requests handled so far with the given operation.
    pub fn requests_for(&self, operation: Operation) -> Vec<LogicalRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.operation == operation)
            .cloned()
            .collect()
    }

    /// Lifecycle calls in order, e.g. `setup`, `initialize`, `invalidate:shutdown`, `cleanup`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Configuration map received by `setup`.
    pub fn setup_config(&self) -> Option<HashMap<String, String>> {
        self.setup_config.lock().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn setup(&self, config: BackendConfig) -> BackendResult<()> {
        self.events.lock().push("setup".to_string());
        *self.setup_config.lock() = Some(config.config);
        match self.setup_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn initialize(&self, _request: InitializationRequest) -> BackendResult<()> {
        self.events.lock().push("initialize".to_string());
        Ok(())
    }

    async fn handle_request(&self, request: LogicalRequest) -> Reply {
        let key = (request.operation, request.path.clone());
        self.requests.lock().push(request);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.replies.lock().get(&key).cloned().unwrap_or(Ok(None))
    }

    async fn invalidate_key(&self, key: &str) {
        self.events.lock().push(format!("invalidate:{key}"));
    }

    async fn cleanup(&self) {
        self.events.lock().push("cleanup".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_reply_and_recording() {
        let backend = ScriptedBackend::new().respond(
            Operation::Read,
            "creds/app",
            Ok(Some(data_response(json!({"user": "u1"})))),
        );

        let resp = backend
            .handle_request(LogicalRequest::new(Operation::Read, "creds/app"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.data.unwrap()["user"], "u1");

        let resp = backend
            .handle_request(LogicalRequest::new(Operation::Read, "other"))
            .await
            .unwrap();
        assert!(resp.is_none());

        assert_eq!(backend.requests().len(), 2);
        assert_eq!(backend.requests_for(Operation::Read).len(), 2);
        assert!(backend.requests_for(Operation::Delete).is_empty());
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let backend = ScriptedBackend::new().respond(
            Operation::Update,
            "locked",
            Err(BackendError::PermissionDenied),
        );
        let err = backend
            .handle_request(LogicalRequest::new(Operation::Update, "locked"))
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::PermissionDenied);
    }
}
