use super::frame::{ErrorBody, Frame, RequestFrame, ResponseFrame};
use super::transport::{BoxedReader, BoxedWriter};
use crate::error::RpcError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Serves calls arriving from the other end.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, ErrorBody>;
}

type Waiter = oneshot::Sender<Result<Value, RpcError>>;

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<u64, Waiter>,
}

/// One end of an RPC connection.
///
/// Outbound calls wait on a oneshot keyed by frame id; a reader task routes
/// responses to those waiters and spawns a task per inbound request, so a
/// call made while serving a callback never blocks the reader.
pub struct RpcPeer {
    writer: Mutex<BoxedWriter>,
    pending: parking_lot::Mutex<Pending>,
    next_id: AtomicU64,
    closed: watch::Sender<bool>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RpcPeer {
    /// Create a peer writing to `writer`. Nothing is read until [`RpcPeer::start`].
    pub fn new(writer: BoxedWriter) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            writer: Mutex::new(writer),
            pending: parking_lot::Mutex::new(Pending::default()),
            next_id: AtomicU64::new(1),
            closed,
            reader: parking_lot::Mutex::new(None),
        })
    }

    /// Start reading frames, serving inbound calls with `dispatcher`.
    pub fn start(self: &Arc<Self>, reader: BoxedReader, dispatcher: Arc<dyn Dispatcher>) {
        let handle = tokio::spawn(read_loop(Arc::downgrade(self), reader, dispatcher));
        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Call `method` and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(RpcError::Closed);
            }
            pending.waiters.insert(id, tx);
        }

        trace!(id, method, "rpc call");
        let frame = Frame::Request(RequestFrame {
            id,
            method: method.to_string(),
            params,
        });
        if let Err(e) = self.send(&frame).await {
            self.pending.lock().waiters.remove(&id);
            return Err(e);
        }

        rx.await.unwrap_or(Err(RpcError::Closed))
    }

    /// Typed wrapper around [`RpcPeer::call`].
    pub async fn call_as<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let value = self.call(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Stop reading, shut the writer and fail every pending call.
    pub async fn close(&self) {
        let reader = self.reader.lock().take();
        if let Some(handle) = reader {
            handle.abort();
        }
        self.fail_pending();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "rpc writer shutdown failed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once the connection is closed from either side.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn send(&self, frame: &Frame) -> Result<(), RpcError> {
        let line = frame.encode()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn respond(&self, id: u64, outcome: Result<Value, ErrorBody>) {
        let frame = match outcome {
            Ok(result) => ResponseFrame {
                id,
                result,
                error: None,
            },
            Err(error) => ResponseFrame {
                id,
                result: Value::Null,
                error: Some(error),
            },
        };
        if let Err(e) = self.send(&Frame::Response(frame)).await {
            warn!(id, error = %e, "failed to send rpc response");
        }
    }

    fn complete(&self, response: ResponseFrame) {
        let waiter = self.pending.lock().waiters.remove(&response.id);
        let Some(waiter) = waiter else {
            debug!(id = response.id, "response for unknown call");
            return;
        };
        let outcome = match response.error {
            Some(ErrorBody { code, message }) => Err(RpcError::Remote { code, message }),
            None => Ok(response.result),
        };
        let _ = waiter.send(outcome);
    }

    fn fail_pending(&self) {
        let waiters = {
            let mut pending = self.pending.lock();
            pending.closed = true;
            std::mem::take(&mut pending.waiters)
        };
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(RpcError::Closed));
        }
        self.closed.send_replace(true);
    }
}

async fn read_loop(peer: Weak<RpcPeer>, reader: BoxedReader, dispatcher: Arc<dyn Dispatcher>) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "rpc connection read failed");
                break;
            }
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let Some(peer) = peer.upgrade() else {
            return;
        };

        match Frame::decode(text) {
            Ok(Frame::Response(response)) => peer.complete(response),
            Ok(Frame::Request(request)) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    trace!(id = request.id, method = %request.method, "rpc dispatch");
                    let outcome = dispatcher.dispatch(&request.method, request.params).await;
                    peer.respond(request.id, outcome).await;
                });
            }
            Err(e) => warn!(error = %e, "dropping malformed rpc frame"),
        }
    }

    debug!("rpc connection closed");
    if let Some(peer) = peer.upgrade() {
        peer.fail_pending();
    }
}
