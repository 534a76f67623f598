//! Connection: multiplexes transactions over one framed stream.
//!
//! A [`Connection`] owns the socket, the object registry, the proxy table,
//! the active-transactions map, and the release queue. `run` drives the
//! inbound dispatch loop and the finalizer task; writes from any task are
//! serialized at the codec boundary through an async mutex so logical
//! messages never interleave.
//!
//! Cloning a `Connection` clones a cheap handle to the same shared state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::ConnectionOptions;
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::core::value::{
    DecodeContext, EncodeContext, Kwargs, Name, ObjectRef, Value, TAG_REFERENCE_BASE,
};
use crate::error::{BusError, RemoteException, Result};
use crate::protocol::message::{decode_message, encode_message, Message, TransactionId};
use crate::protocol::proxy::Proxy;
use crate::protocol::proxy_table::ProxyTable;
use crate::protocol::registry::ObjectRegistry;
use crate::protocol::transaction::{BlockCallback, Transaction};
use crate::utils::metrics::global_metrics;

/// Duplex byte stream usable under a connection.
pub trait BusStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> BusStream for T {}

type BoxedStream = Box<dyn BusStream>;
type Writer = SplitSink<Framed<BoxedStream, FrameCodec>, Frame>;
type Reader = SplitStream<Framed<BoxedStream, FrameCodec>>;

/// Process-wide connection id counter, for proxy identity and logging.
static CONNECTION_IDS: AtomicU64 = AtomicU64::new(1);

/// Recover from lock poisoning instead of cascading panics; the guarded
/// maps stay structurally valid under any interrupted mutation.
fn locked<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) struct Core {
    id: u64,
    options: ConnectionOptions,
    registry: StdMutex<ObjectRegistry>,
    proxies: StdMutex<ProxyTable>,
    transactions: StdMutex<HashMap<TransactionId, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    writer: Mutex<Writer>,
    reader: StdMutex<Option<Reader>>,
    release_tx: mpsc::UnboundedSender<Name>,
    release_rx: StdMutex<Option<mpsc::UnboundedReceiver<Name>>>,
    cancel: CancellationToken,
}

/// One side of a bus connection.
#[derive(Clone)]
pub struct Connection {
    core: Arc<Core>,
}

impl Connection {
    /// Wrap a duplex stream in a connection with the given options.
    pub fn new<S>(stream: S, options: ConnectionOptions) -> Self
    where
        S: BusStream + 'static,
    {
        let framed = Framed::new(Box::new(stream) as BoxedStream, FrameCodec);
        let (writer, reader) = framed.split();
        let (release_tx, release_rx) = mpsc::unbounded_channel();

        let core = Arc::new(Core {
            id: CONNECTION_IDS.fetch_add(1, Ordering::Relaxed),
            next_id: AtomicU64::new(options.initial_id),
            options,
            registry: StdMutex::new(ObjectRegistry::new()),
            proxies: StdMutex::new(ProxyTable::new()),
            transactions: StdMutex::new(HashMap::new()),
            writer: Mutex::new(writer),
            reader: StdMutex::new(Some(reader)),
            release_tx,
            release_rx: StdMutex::new(Some(release_rx)),
            cancel: CancellationToken::new(),
        });

        global_metrics().connection_established();
        Self { core }
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// The options this connection was constructed with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.core.options
    }

    /// Bind `object` under `name` for the lifetime of the connection.
    pub fn bind(&self, name: impl Into<Name>, object: ObjectRef) {
        locked(&self.core.registry).bind_explicit(name.into(), object);
    }

    /// A proxy to the *remote* object of that name.
    ///
    /// The two sides of a connection have independent registries, so this
    /// is always a proxy, never a local round-trip.
    pub fn proxy(&self, name: impl Into<Name>) -> Proxy {
        let name = name.into();
        locked(&self.core.proxies).get_or_create(&name, self)
    }

    /// Whether `name` is currently bound on this side.
    pub fn bound(&self, name: &Name) -> bool {
        locked(&self.core.registry).contains(name)
    }

    /// Number of live bindings on this side.
    pub fn binding_count(&self) -> usize {
        locked(&self.core.registry).len()
    }

    /// Number of in-flight transactions.
    pub fn active_transactions(&self) -> usize {
        locked(&self.core.transactions).len()
    }

    /// True once the connection has been cancelled or its loop exited.
    pub fn is_closed(&self) -> bool {
        self.core.cancel.is_cancelled()
    }

    /// Cancel the connection: stops the dispatch loop, the finalizer, and
    /// every in-flight transaction.
    pub fn close(&self) {
        self.core.cancel.cancel();
    }

    /// Invoke `method` on the object bound under `target` on the peer.
    ///
    /// Allocates a transaction, drives it to a terminal state, and closes
    /// it on exit. `block` receives every tuple the method yields.
    #[instrument(skip(self, args, kwargs, block), fields(connection = self.id()))]
    pub async fn invoke(
        &self,
        target: &Name,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<&mut dyn BlockCallback>,
    ) -> Result<Value> {
        let id = self.core.next_id.fetch_add(2, Ordering::Relaxed);
        let inbox = self.register_transaction(id);
        global_metrics().invoke_started();

        let txn = Transaction::new(id, self.clone(), inbox, self.core.options.timeout);
        let result = txn
            .invoke(target.clone(), method.to_string(), args, kwargs, block)
            .await;
        if matches!(
            result,
            Err(BusError::Remote(_)) | Err(BusError::RemoteThrow { .. })
        ) {
            global_metrics().invoke_faulted();
        }
        result
    }

    /// Serialize and flush one message; writes are serialized across tasks.
    pub(crate) async fn write(&self, msg: Message) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::ConnectionClosed);
        }
        let payload = encode_message(&msg, &ResolverCx { conn: self })?;
        global_metrics().message_sent(payload.len() as u64);

        let mut writer = self.core.writer.lock().await;
        writer.send(Frame::new(payload)).await
    }

    /// Run the inbound dispatch loop until EOF, a fatal error, or cancel.
    ///
    /// Also starts the finalizer task that drains the proxy release queue
    /// into `Release` messages. On exit every outstanding transaction is
    /// closed, acceptor tasks are aborted, and the proxy table is cleared.
    #[instrument(skip(self), fields(connection = self.id()))]
    pub async fn run(&self) -> Result<()> {
        let mut reader = locked(&self.core.reader)
            .take()
            .ok_or(BusError::AlreadyRunning)?;
        let release_rx = locked(&self.core.release_rx)
            .take()
            .ok_or(BusError::AlreadyRunning)?;

        let finalizer = tokio::spawn(Self::run_finalizer(self.clone(), release_rx));

        let mut acceptors = JoinSet::new();
        let result = self.dispatch_loop(&mut reader, &mut acceptors).await;

        self.core.cancel.cancel();
        acceptors.shutdown().await;
        locked(&self.core.transactions).clear();
        locked(&self.core.proxies).clear();
        finalizer.abort();
        global_metrics().connection_closed();

        debug!("connection terminated");
        result
    }

    async fn dispatch_loop(
        &self,
        reader: &mut Reader,
        acceptors: &mut JoinSet<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.core.cancel.cancelled() => return Ok(()),

                // Reap finished acceptor tasks as they complete.
                Some(_) = acceptors.join_next(), if !acceptors.is_empty() => {}

                frame = reader.next() => match frame {
                    None => {
                        debug!("peer closed the stream");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        global_metrics().protocol_error();
                        error!(error = %e, "fatal stream error");
                        return Err(e);
                    }
                    Some(Ok(frame)) => {
                        global_metrics().message_received(frame.payload.len() as u64);
                        let msg =
                            match decode_message(&frame.payload, &ResolverCx { conn: self }) {
                                Ok(msg) => msg,
                                Err(e) => {
                                    global_metrics().protocol_error();
                                    error!(error = %e, "fatal codec error");
                                    return Err(e);
                                }
                            };
                        self.dispatch(msg, acceptors).await;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, msg: Message, acceptors: &mut JoinSet<()>) {
        trace!(kind = msg.kind(), "dispatching inbound message");
        match msg {
            Message::Invoke {
                id,
                target,
                method,
                args,
                kwargs,
                has_block,
            } => {
                let object = locked(&self.core.registry).lookup(&target);
                match object {
                    Some(object) => {
                        let inbox = self.register_transaction(id);
                        let txn =
                            Transaction::new(id, self.clone(), inbox, self.core.options.timeout);
                        acceptors.spawn(async move {
                            txn.accept(object, method, args, kwargs, has_block).await;
                        });
                    }
                    None => {
                        debug!(target = %target, id, "invoke for unbound name");
                        let reply = Message::Error {
                            id,
                            exception: RemoteException::not_found(target.as_str()),
                        };
                        if let Err(e) = self.write(reply).await {
                            debug!(error = %e, "failed to report unbound name");
                        }
                    }
                }
            }
            Message::Release { name } => {
                global_metrics().release_received();
                locked(&self.core.registry).release(&name);
            }
            other => {
                // Response traffic: route to the transaction's inbox,
                // preserving arrival order; stale ids drop silently.
                let Some(id) = other.transaction_id() else {
                    warn!(kind = other.kind(), "unroutable message");
                    return;
                };
                let sender = locked(&self.core.transactions).get(&id).cloned();
                match sender {
                    Some(sender) => {
                        if sender.send(other).await.is_err() {
                            trace!(id, "transaction inbox closed, dropping message");
                        }
                    }
                    None => trace!(id, "dropping message for unknown transaction"),
                }
            }
        }
    }

    async fn run_finalizer(conn: Connection, mut release_rx: mpsc::UnboundedReceiver<Name>) {
        loop {
            tokio::select! {
                _ = conn.core.cancel.cancelled() => break,
                name = release_rx.recv() => match name {
                    Some(name) => conn.send_release(name).await,
                    None => break,
                },
            }
        }
        // Remaining queued releases are dropped with the connection.
    }

    async fn send_release(&self, name: Name) {
        locked(&self.core.proxies).remove_dead(&name);
        global_metrics().release_sent();
        if let Err(e) = self.write(Message::Release { name }).await {
            debug!(error = %e, "dropping release for unwritable connection");
        }
    }

    fn register_transaction(&self, id: TransactionId) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.core.options.inbox_capacity);
        locked(&self.core.transactions).insert(id, tx);
        rx
    }

    pub(crate) fn remove_transaction(&self, id: TransactionId) {
        locked(&self.core.transactions).remove(&id);
    }

    /// Queue a Release for the finalizer; callable from `Drop` impls
    /// outside the runtime.
    pub(crate) fn enqueue_release(&self, name: Name) {
        let _ = self.core.release_tx.send(name);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.core.id)
            .field("bindings", &self.binding_count())
            .field("transactions", &self.active_transactions())
            .finish()
    }
}

/// Resolver bridging the pure codec to this connection's registries.
struct ResolverCx<'a> {
    conn: &'a Connection,
}

impl EncodeContext for ResolverCx<'_> {
    fn encode_proxy(&self, proxy: &Proxy) -> Name {
        if proxy.connection().id() == self.conn.id() {
            return proxy.name().clone();
        }
        // Round-trip of a foreign proxy: re-advertise it here under a
        // fresh implicit name; invocations then forward hop by hop.
        locked(&self.conn.core.registry).bind_implicit(proxy.as_object())
    }

    fn encode_object(&self, object: &ObjectRef) -> Result<(i8, Name)> {
        let kind = object.kind();
        let index = self
            .conn
            .core
            .options
            .reference_types
            .iter()
            .position(|registered| registered == kind)
            .ok_or_else(|| BusError::Unserializable(kind.to_string()))?;
        let name = locked(&self.conn.core.registry).bind_implicit(object.clone());
        Ok((TAG_REFERENCE_BASE + index as i8, name))
    }
}

impl DecodeContext for ResolverCx<'_> {
    fn resolve_reference(&self, name: Name) -> Value {
        if let Some(object) = locked(&self.conn.core.registry).lookup(&name) {
            // Round-trip identity: the bound object itself comes back.
            return Value::Object(object);
        }
        Value::Proxy(locked(&self.conn.core.proxies).get_or_create(&name, self.conn))
    }
}
