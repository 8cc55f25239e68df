//! HTTP request to logical request translation, plus lease emulation.
//!
//! The [`Translator`] reads the live backend out of the [`BackendSlot`] for
//! every request, so it keeps working across plugin restarts. Reads that
//! return data mint a lease; renewals notify the backend before touching
//! the lease, revocations drop the lease before notifying.

pub mod envelope;
pub mod lease;
pub mod operation;

pub use envelope::{AuthView, Envelope, RenewResponse};
pub use lease::{LeaseRecord, LeaseTable, DEFAULT_LEASE_DURATION};
pub use operation::{decode_component, normalize_path, resolve_operation};

use crate::error::{ApiError, ApiResult};
use axum::http::{Method, Uri};
use chrono::Utc;
use plughost_config::parse_duration;
use plughost_core::{
    BackendRef, BackendResult, BackendSlot, LogicalRequest, LogicalResponse, Operation, Storage,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Turns HTTP requests into backend calls.
pub struct Translator {
    slot: Arc<BackendSlot>,
    storage: Arc<dyn Storage>,
    leases: LeaseTable,
    mount: String,
    request_timeout: Option<Duration>,
}

impl Translator {
    pub fn new(slot: Arc<BackendSlot>, storage: Arc<dyn Storage>, mount: impl Into<String>) -> Self {
        Self {
            slot,
            storage,
            leases: LeaseTable::new(),
            mount: mount.into().trim_matches('/').to_string(),
            request_timeout: None,
        }
    }

    /// Bound every backend call; expired calls answer 504.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Whether a backend is published.
    pub fn plugin_running(&self) -> bool {
        self.slot.is_set()
    }

    /// Forward one HTTP request to the backend.
    pub async fn handle(&self, method: &Method, uri: &Uri, body: &[u8]) -> ApiResult<Envelope> {
        let backend = self.slot.current().ok_or(ApiError::PluginNotStarted)?;

        let data = if *method == Method::POST || *method == Method::PUT {
            parse_body(body)?
        } else {
            None
        };

        let path = normalize_path(uri.path(), &self.mount);
        let (operation, path) = resolve_operation(method, &path, uri.query())?;
        debug!(%method, path = %path, %operation, "handling request");

        let mut request = LogicalRequest::new(operation, path.clone()).with_storage(self.storage.clone());
        request.data = data;

        let response = self.dispatch(backend, request).await?.map_err(|e| {
            error!(error = %e, "request failed");
            ApiError::from(e)
        })?;

        let Some(response) = response else {
            return Ok(Envelope::empty(&self.mount));
        };

        let lease = match (&response.data, operation) {
            (Some(data), Operation::Read) => Some(self.issue_lease(&path, data.clone(), &response)),
            _ => None,
        };
        let envelope = Envelope::from_response(response, &self.mount);
        Ok(match lease {
            Some(lease) => envelope.with_lease(&lease),
            None => envelope,
        })
    }

    fn issue_lease(&self, path: &str, data: Map<String, Value>, response: &LogicalResponse) -> LeaseRecord {
        let duration = response
            .secret
            .as_ref()
            .map(|s| s.ttl)
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(DEFAULT_LEASE_DURATION);
        let record = LeaseRecord::issue(
            lease::generate_lease_id(&self.mount, path),
            path,
            data,
            response.secret.clone(),
            duration,
            Utc::now(),
        );
        debug!(lease_id = %record.lease_id, duration_secs = duration.as_secs(), "lease issued");
        self.leases.insert(record.clone());
        record
    }

    /// Renew a lease from a `{lease_id, increment?}` body.
    ///
    /// The backend is told first; the lease only changes once it agrees.
    pub async fn renew(&self, body: &[u8]) -> ApiResult<RenewResponse> {
        let body = parse_body(body)?.unwrap_or_default();
        let lease_id = lease_id_field(&body)?;
        let increment = parse_increment(body.get("increment"));

        let entry = self.leases.get(&lease_id).ok_or_else(ApiError::lease_not_found)?;
        let mut record = entry.lock().await;
        if !self.leases.is_current(&lease_id, &entry) {
            return Err(ApiError::lease_not_found());
        }
        if !record.renewable {
            return Err(ApiError::BadRequest("lease is not renewable".to_string()));
        }
        let now = Utc::now();
        if record.is_expired_at(now) {
            return Err(ApiError::BadRequest("lease has expired".to_string()));
        }
        let new_expire_time = lease::expiry(now, increment);

        if let Some(backend) = self.slot.current() {
            let mut data = Map::new();
            data.insert("lease_id".to_string(), json!(lease_id));
            data.insert("increment".to_string(), json!(increment.as_secs()));
            data.insert("issue_time".to_string(), json!(record.issue_time));
            let request = LogicalRequest::new(Operation::Renew, record.path.clone())
                .with_data(data)
                .with_secret(record.secret.clone())
                .with_storage(self.storage.clone());

            if let Err(e) = self.dispatch(backend, request).await? {
                error!(error = %e, lease_id = %lease_id, "plugin renewal notification failed");
                return Err(ApiError::Backend(format!("failed to renew lease: {e}")));
            }
        }

        record.expire_time = new_expire_time;
        record.duration = increment;
        info!(
            lease_id = %lease_id,
            increment_secs = increment.as_secs(),
            new_expire_time = %new_expire_time,
            "lease renewed"
        );

        Ok(RenewResponse {
            lease_id,
            lease_duration: increment.as_secs(),
            renewable: true,
            data: record.data.clone(),
        })
    }

    /// Revoke a lease named in a `{lease_id}` body.
    pub async fn revoke_body(&self, body: &[u8]) -> ApiResult<()> {
        let body = parse_body(body)?.unwrap_or_default();
        let lease_id = lease_id_field(&body)?;
        self.revoke(&lease_id).await
    }

    /// Revoke a lease: remove it, then tell the backend.
    ///
    /// A failed notification is logged; the lease stays revoked.
    pub async fn revoke(&self, lease_id: &str) -> ApiResult<()> {
        let entry = self.leases.get(lease_id).ok_or_else(ApiError::lease_not_found)?;
        let record = {
            let record = entry.lock().await;
            if !self.leases.remove_if_current(lease_id, &entry) {
                return Err(ApiError::lease_not_found());
            }
            record.clone()
        };

        if let Some(backend) = self.slot.current() {
            let mut data = Map::new();
            data.insert("lease_id".to_string(), json!(lease_id));
            data.insert("issue_time".to_string(), json!(record.issue_time));
            data.insert("data".to_string(), Value::Object(record.data));
            let request = LogicalRequest::new(Operation::Revoke, record.path)
                .with_data(data)
                .with_secret(record.secret)
                .with_storage(self.storage.clone());

            match self.dispatch(backend, request).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(error = %e, lease_id = %lease_id, "plugin revocation notification failed")
                }
                Err(e) => {
                    error!(error = %e, lease_id = %lease_id, "plugin revocation notification failed")
                }
            }
        }

        info!(lease_id = %lease_id, "lease revoked");
        Ok(())
    }

    /// Run the backend call on its own task so a dropped HTTP request
    /// cannot cancel it.
    ///
    /// The outer error is the harness's own (timeout, task failure); the
    /// inner result is the backend's answer.
    async fn dispatch(
        &self,
        backend: BackendRef,
        request: LogicalRequest,
    ) -> ApiResult<BackendResult<Option<LogicalResponse>>> {
        let task = tokio::spawn(async move { backend.handle_request(request).await });
        let joined = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| ApiError::Timeout(limit))?,
            None => task.await,
        };
        joined.map_err(|e| ApiError::Internal(format!("backend call failed: {e}")))
    }
}

/// Decode a JSON object body. Empty and `null` bodies mean no data.
pub fn parse_body(body: &[u8]) -> ApiResult<Option<Map<String, Value>>> {
    if body.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(body).map_err(ApiError::invalid_json)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(ApiError::invalid_json(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn lease_id_field(body: &Map<String, Value>) -> ApiResult<String> {
    match body.get("lease_id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        _ => Err(ApiError::BadRequest("lease_id is required".to_string())),
    }
}

/// Renewal increment: seconds as a number, or a duration string such as
/// `"90s"` or `"3600"`. Missing, unparseable or zero means the default.
pub fn parse_increment(value: Option<&Value>) -> Duration {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 1.0)
            .map(|secs| Duration::from_secs(secs.trunc() as u64)),
        Some(Value::String(s)) => parse_duration(s).ok(),
        _ => None,
    };
    parsed
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_LEASE_DURATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_core::{BackendError, InMemoryStorage, Secret};
    use plughost_test_utils::{data_response, ScriptedBackend};

    fn translator() -> (Translator, Arc<ScriptedBackend>) {
        let slot = Arc::new(BackendSlot::new());
        let backend = Arc::new(ScriptedBackend::new());
        slot.publish(backend.clone());
        let translator = Translator::new(slot, Arc::new(InMemoryStorage::new()), "plugin");
        (translator, backend)
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_increment() {
        assert_eq!(parse_increment(None), DEFAULT_LEASE_DURATION);
        assert_eq!(parse_increment(Some(&json!(120))), Duration::from_secs(120));
        assert_eq!(parse_increment(Some(&json!(90.7))), Duration::from_secs(90));
        assert_eq!(parse_increment(Some(&json!("1h30m"))), Duration::from_secs(5400));
        assert_eq!(parse_increment(Some(&json!("3600"))), Duration::from_secs(3600));
        assert_eq!(parse_increment(Some(&json!("500ms"))), Duration::from_millis(500));
        assert_eq!(parse_increment(Some(&json!(0))), DEFAULT_LEASE_DURATION);
        assert_eq!(parse_increment(Some(&json!("soon"))), DEFAULT_LEASE_DURATION);
        assert_eq!(parse_increment(Some(&json!(-5))), DEFAULT_LEASE_DURATION);
        assert_eq!(parse_increment(Some(&json!(true))), DEFAULT_LEASE_DURATION);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), None);
        assert_eq!(parse_body(b"null").unwrap(), None);
        assert_eq!(parse_body(br#"{"a":1}"#).unwrap().unwrap()["a"], 1);

        let err = parse_body(b"{not json").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse JSON: "));
        let err = parse_body(b"[1,2]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse JSON: expected a JSON object, got array"
        );
    }

    #[tokio::test]
    async fn test_no_backend() {
        let translator = Translator::new(
            Arc::new(BackendSlot::new()),
            Arc::new(InMemoryStorage::new()),
            "plugin",
        );
        let err = translator
            .handle(&Method::GET, &uri("/v1/plugin/x"), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PluginNotStarted));
        assert!(!translator.plugin_running());
    }

    #[tokio::test]
    async fn test_read_mints_lease_with_secret_ttl() {
        let (translator, backend) = translator();
        let mut response = data_response(json!({"password": "hunter2"}));
        response.secret = Some(Secret {
            ttl: Duration::from_secs(300),
            ..Default::default()
        });
        backend.set_reply(Operation::Read, "creds/app", Ok(Some(response)));

        let envelope = translator
            .handle(&Method::GET, &uri("/v1/plugin/creds/app"), b"")
            .await
            .unwrap();
        assert_eq!(envelope.lease_duration, Some(300));
        let lease_id = envelope.lease_id.unwrap();
        assert!(lease_id.starts_with("plugin/creds/app/"));
        assert!(translator.leases().contains(&lease_id));

        let request = &backend.requests()[0];
        assert_eq!(request.path, "creds/app");
        assert!(request.storage.is_some());
        assert!(request.data.is_none());
    }

    #[tokio::test]
    async fn test_write_does_not_mint_lease() {
        let (translator, backend) = translator();
        backend.set_reply(
            Operation::Update,
            "config",
            Ok(Some(data_response(json!({"ok": true})))),
        );

        let envelope = translator
            .handle(&Method::POST, &uri("/v1/plugin/config"), br#"{"ttl":"1h"}"#)
            .await
            .unwrap();
        assert!(envelope.lease_id.is_none());
        assert!(translator.leases().is_empty());
        assert_eq!(backend.requests()[0].data.as_ref().unwrap()["ttl"], "1h");
    }

    #[tokio::test]
    async fn test_get_body_is_ignored() {
        let (translator, backend) = translator();
        translator
            .handle(&Method::GET, &uri("/v1/plugin/x"), b"{not json")
            .await
            .unwrap();
        assert!(backend.requests()[0].data.is_none());
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let (translator, backend) = translator();
        backend.set_reply(Operation::Delete, "locked", Err(BackendError::PermissionDenied));
        let err = translator
            .handle(&Method::DELETE, &uri("/v1/plugin/locked"), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_renew_failure_leaves_lease_untouched() {
        let (translator, backend) = translator();
        backend.set_reply(Operation::Read, "creds", Ok(Some(data_response(json!({"u": 1})))));
        let lease_id = translator
            .handle(&Method::GET, &uri("/v1/plugin/creds"), b"")
            .await
            .unwrap()
            .lease_id
            .unwrap();
        let before = translator.leases().get(&lease_id).unwrap().lock().await.clone();

        backend.set_reply(Operation::Renew, "creds", Err(BackendError::message("nope")));
        let body = json!({"lease_id": lease_id, "increment": 60}).to_string();
        let err = translator.renew(body.as_bytes()).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to renew lease: nope");

        let after = translator.leases().get(&lease_id).unwrap().lock().await.clone();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_renew_notifies_backend() {
        let (translator, backend) = translator();
        backend.set_reply(Operation::Read, "creds", Ok(Some(data_response(json!({"u": 1})))));
        let lease_id = translator
            .handle(&Method::GET, &uri("/v1/plugin/creds"), b"")
            .await
            .unwrap()
            .lease_id
            .unwrap();

        let body = json!({"lease_id": lease_id, "increment": "2h"}).to_string();
        let renewed = translator.renew(body.as_bytes()).await.unwrap();
        assert_eq!(renewed.lease_duration, 7200);
        assert_eq!(renewed.data["u"], 1);

        let renewals = backend.requests_for(Operation::Renew);
        assert_eq!(renewals.len(), 1);
        assert_eq!(renewals[0].path, "creds");
        let data = renewals[0].data.as_ref().unwrap();
        assert_eq!(data["lease_id"], json!(lease_id));
        assert_eq!(data["increment"], 7200);
        assert!(data["issue_time"].is_string());

        let record = translator.leases().get(&lease_id).unwrap().lock().await.clone();
        assert_eq!(record.duration, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_renew_without_increment_extends_by_default() {
        let (translator, backend) = translator();
        let mut response = data_response(json!({"u": 1}));
        response.secret = Some(Secret {
            ttl: Duration::from_secs(60),
            ..Default::default()
        });
        backend.set_reply(Operation::Read, "creds", Ok(Some(response)));
        let lease_id = translator
            .handle(&Method::GET, &uri("/v1/plugin/creds"), b"")
            .await
            .unwrap()
            .lease_id
            .unwrap();

        let default = chrono::Duration::from_std(DEFAULT_LEASE_DURATION).unwrap();
        let body = json!({"lease_id": lease_id}).to_string();
        for _ in 0..3 {
            let before = Utc::now();
            let renewed = translator.renew(body.as_bytes()).await.unwrap();
            let after = Utc::now();
            assert_eq!(renewed.lease_duration, 86400);

            let record = translator.leases().get(&lease_id).unwrap().lock().await.clone();
            assert_eq!(record.duration, DEFAULT_LEASE_DURATION);
            assert!(record.expire_time >= before + default);
            assert!(record.expire_time <= after + default);
        }
    }

    #[tokio::test]
    async fn test_renew_rejections() {
        let (translator, _backend) = translator();

        let err = translator.renew(b"{}").await.unwrap_err();
        assert_eq!(err.to_string(), "lease_id is required");

        let err = translator.renew(br#"{"lease_id": "nope"}"#).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let mut stuck = LeaseRecord::issue(
            "plugin/stuck/1".into(),
            "stuck",
            Map::new(),
            None,
            Duration::from_secs(60),
            Utc::now(),
        );
        stuck.renewable = false;
        translator.leases().insert(stuck);
        let err = translator
            .renew(br#"{"lease_id": "plugin/stuck/1"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "lease is not renewable");

        let expired = LeaseRecord::issue(
            "plugin/old/1".into(),
            "old",
            Map::new(),
            None,
            Duration::from_secs(60),
            Utc::now() - chrono::Duration::hours(2),
        );
        let expire_time = expired.expire_time;
        translator.leases().insert(expired);
        let err = translator
            .renew(br#"{"lease_id": "plugin/old/1"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "lease has expired");
        let record = translator.leases().get("plugin/old/1").unwrap().lock().await.clone();
        assert_eq!(record.expire_time, expire_time);
    }

    #[tokio::test]
    async fn test_revoke_survives_backend_failure() {
        let (translator, backend) = translator();
        backend.set_reply(Operation::Read, "creds", Ok(Some(data_response(json!({"u": 1})))));
        backend.set_reply(Operation::Revoke, "creds", Err(BackendError::message("gone")));
        let lease_id = translator
            .handle(&Method::GET, &uri("/v1/plugin/creds"), b"")
            .await
            .unwrap()
            .lease_id
            .unwrap();

        translator.revoke(&lease_id).await.unwrap();
        assert!(!translator.leases().contains(&lease_id));

        let revokes = backend.requests_for(Operation::Revoke);
        assert_eq!(revokes.len(), 1);
        assert_eq!(revokes[0].data.as_ref().unwrap()["data"], json!({"u": 1}));

        assert!(matches!(
            translator.revoke(&lease_id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_answers_504() {
        let slot = Arc::new(BackendSlot::new());
        let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_secs(60)));
        slot.publish(backend.clone());
        let translator = Translator::new(slot, Arc::new(InMemoryStorage::new()), "plugin")
            .with_request_timeout(Some(Duration::from_secs(1)));

        let err = translator
            .handle(&Method::GET, &uri("/v1/plugin/slow"), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)));
        // The call itself was still delivered.
        assert_eq!(backend.requests().len(), 1);
    }
}
