//! Per-call transaction state machine.
//!
//! One [`Transaction`] owns the bidirectional message stream of a single
//! invocation: the initiator side drives Invoke/Next and consumes
//! Return/Yield/Error/Throw; the acceptor side services the call and emits
//! Yield and exactly one terminal message.
//!
//! Messages addressed to the transaction arrive through a bounded FIFO
//! inbox fed by the connection dispatch loop; arrival order is preserved.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::core::value::{Kwargs, Name, ObjectRef, Value};
use crate::error::{constants, BusError, RemoteException, Result};
use crate::protocol::connection::Connection;
use crate::protocol::message::{Message, TransactionId};
use crate::protocol::object::{CallFault, CallResult};

/// Reserved method answered from `ServiceObject::responds_to`.
pub(crate) const METHOD_RESPOND_TO: &str = "__respond_to__";
/// Reserved method answered from `ServiceObject::describe`.
pub(crate) const METHOD_DESCRIBE: &str = "__describe__";

/// Result of one block callback run on the initiator side.
pub type BlockResult = std::result::Result<Value, RemoteException>;

/// Callback invoked for each tuple the remote method yields.
///
/// Wrap a synchronous closure in [`BlockFn`]; implement the trait by hand
/// when the callback needs to await.
#[async_trait]
pub trait BlockCallback: Send {
    /// Handle one yielded tuple; the return value travels back as Next.
    async fn on_yield(&mut self, values: Vec<Value>) -> BlockResult;
}

/// [`BlockCallback`] adapter for synchronous closures.
pub struct BlockFn<F>(pub F);

#[async_trait]
impl<F> BlockCallback for BlockFn<F>
where
    F: FnMut(Vec<Value>) -> BlockResult + Send,
{
    async fn on_yield(&mut self, values: Vec<Value>) -> BlockResult {
        (self.0)(values)
    }
}

/// Reply observed by an acceptor after yielding a tuple.
#[derive(Debug, PartialEq)]
pub enum YieldReply {
    /// The caller's block produced a value.
    Next(Value),
    /// The caller ended the iteration (Close, timeout, or disappearance).
    Closed,
}

/// Handle through which a serviced method streams values to its caller.
pub struct Yielder<'a> {
    txn: &'a mut Transaction,
}

impl Yielder<'_> {
    /// Yield a tuple to the caller's block and wait for its reply.
    ///
    /// # Errors
    /// Returns [`BusError::Remote`] when the caller's block raised; the
    /// error is meant to propagate out of the serviced method.
    pub async fn yield_values(&mut self, values: Vec<Value>) -> Result<YieldReply> {
        let id = self.txn.id;
        self.txn.conn.write(Message::Yield { id, values }).await?;
        crate::utils::metrics::global_metrics().value_yielded();
        loop {
            match self.txn.read().await? {
                None => return Ok(YieldReply::Closed),
                Some(Message::Next { value, .. }) => return Ok(YieldReply::Next(value)),
                Some(Message::Error { exception, .. }) => {
                    return Err(BusError::Remote(exception))
                }
                Some(Message::Close { .. }) => return Ok(YieldReply::Closed),
                Some(other) => {
                    trace!(id, kind = other.kind(), "ignoring message while awaiting next");
                }
            }
        }
    }

    /// Yield a single value.
    pub async fn yield_value(&mut self, value: Value) -> Result<YieldReply> {
        self.yield_values(vec![value]).await
    }
}

/// State of one in-flight call.
pub(crate) struct Transaction {
    id: TransactionId,
    conn: Connection,
    inbox: mpsc::Receiver<Message>,
    timeout: Option<Duration>,
    terminated: bool,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        conn: Connection,
        inbox: mpsc::Receiver<Message>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            conn,
            inbox,
            timeout,
            terminated: false,
            closed: false,
        }
    }

    /// Await the next inbox message.
    ///
    /// `Ok(None)` means the read timed out; the initiator treats that as an
    /// implicit `Return(nil)`. A closed inbox means the connection died.
    async fn read(&mut self) -> Result<Option<Message>> {
        let msg = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inbox.recv()).await {
                Ok(msg) => msg,
                Err(_) => {
                    debug!(id = self.id, "transaction read timed out");
                    return Ok(None);
                }
            },
            None => self.inbox.recv().await,
        };
        match msg {
            Some(msg) => Ok(Some(msg)),
            None => Err(BusError::ConnectionClosed),
        }
    }

    /// Drive an outgoing invocation to its terminal state.
    pub(crate) async fn invoke(
        mut self,
        target: Name,
        method: String,
        args: Vec<Value>,
        kwargs: Kwargs,
        mut block: Option<&mut dyn BlockCallback>,
    ) -> Result<Value> {
        let invoke = Message::Invoke {
            id: self.id,
            target,
            method,
            args,
            kwargs,
            has_block: block.is_some(),
        };
        let result = match self.conn.write(invoke).await {
            Ok(()) => self.await_outcome(&mut block).await,
            Err(e) => Err(e),
        };
        self.close().await;
        result
    }

    async fn await_outcome(
        &mut self,
        block: &mut Option<&mut dyn BlockCallback>,
    ) -> Result<Value> {
        loop {
            match self.read().await? {
                // Timeout: implicit Return(nil); close() sends Close.
                None => return Ok(Value::Nil),
                Some(Message::Return { value, .. }) => {
                    self.terminated = true;
                    return Ok(value);
                }
                Some(Message::Yield { values, .. }) => self.handle_yield(values, block).await?,
                Some(Message::Error { exception, .. }) => {
                    self.terminated = true;
                    return Err(BusError::Remote(exception));
                }
                Some(Message::Throw { tag, value, .. }) => {
                    self.terminated = true;
                    return Err(BusError::RemoteThrow { tag, value });
                }
                Some(Message::Close { .. }) => {
                    // Close outside a block callback: equivalent to Return(nil).
                    self.terminated = true;
                    return Ok(Value::Nil);
                }
                Some(other) => {
                    warn!(id = self.id, kind = other.kind(), "unexpected response message");
                }
            }
        }
    }

    async fn handle_yield(
        &mut self,
        values: Vec<Value>,
        block: &mut Option<&mut dyn BlockCallback>,
    ) -> Result<()> {
        let id = self.id;
        let reply = match block {
            Some(callback) => callback.on_yield(values).await,
            None => Err(RemoteException::new(
                constants::CLASS_LOCAL_JUMP_ERROR,
                "no block given (yield)",
            )),
        };
        match reply {
            Ok(value) => self.conn.write(Message::Next { id, value }).await,
            // The block raised: relay and keep reading, a terminal follows.
            Err(exception) => self.conn.write(Message::Error { id, exception }).await,
        }
    }

    /// Service an incoming invocation and emit exactly one terminal.
    pub(crate) async fn accept(
        mut self,
        object: ObjectRef,
        method: String,
        args: Vec<Value>,
        kwargs: Kwargs,
        has_block: bool,
    ) {
        let id = self.id;
        let outcome = self.dispatch_call(&object, &method, args, kwargs, has_block).await;
        let terminal = match outcome {
            Ok(value) => Message::Return { id, value },
            Err(CallFault::Exception(exception)) => Message::Error { id, exception },
            Err(CallFault::Throw { tag, value }) => Message::Throw { id, tag, value },
        };
        self.terminated = true;
        if let Err(e) = self.conn.write(terminal).await {
            debug!(id, error = %e, "dropping terminal for dead connection");
        }
        self.close().await;
    }

    async fn dispatch_call(
        &mut self,
        object: &ObjectRef,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        has_block: bool,
    ) -> CallResult {
        match method {
            METHOD_RESPOND_TO => {
                let queried = args
                    .first()
                    .and_then(|v| v.as_symbol().or_else(|| v.as_str()))
                    .unwrap_or_default()
                    .to_string();
                Ok(Value::Bool(object.responds_to(&queried)))
            }
            METHOD_DESCRIBE => Ok(Value::string(object.describe())),
            _ if has_block => {
                let mut yielder = Yielder { txn: self };
                object.call(method, args, kwargs, Some(&mut yielder)).await
            }
            _ => object.call(method, args, kwargs, None).await,
        }
    }

    /// Tear the transaction down; idempotent.
    ///
    /// Removes it from the connection, closes the inbox, and, when no
    /// terminal was exchanged (timeout path), tells the peer with a
    /// best-effort Close.
    pub(crate) async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.conn.remove_transaction(self.id);
        self.inbox.close();
        if !self.terminated {
            let _ = self.conn.write(Message::Close { id: self.id }).await;
        }
    }
}
