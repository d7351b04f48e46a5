//! The dispatch runtime: [`ServerManager`].
//!
//! The manager owns one UDP and one TCP transport and a background thread
//! that polls them.  Every packet the transports produce is routed to the
//! callback registered for its data ID and to the "any" callback; packets
//! nobody claims go into a bounded FIFO read with [`ServerHandle::next`].
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──init()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ Stopped
//! ```
//!
//! # Locking
//!
//! The transports sit behind one mutex.  The loop takes it only for the
//! non-blocking accept/read calls and releases it before invoking
//! callbacks, so a callback may itself call [`ServerHandle::write`] or
//! [`ServerHandle::send_to`] without deadlocking.  Callbacks run
//! synchronously on the loop thread; a slow callback delays the packets
//! behind it but not socket readiness.

use std::collections::VecDeque;
use std::io;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rovecomm_core::protocol::{system, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use rovecomm_core::{build_packet, Element, ElementType, EncodeError, Endpoint, Manifest, Packet};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::callbacks::{CallbackRegistry, ExactMatch};
use crate::application::transport::{Protocol, Protocols, Transport, TransportError};

/// Error type for runtime lifecycle operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `init` was called on a runtime that is not `Uninitialized`.
    #[error("runtime cannot start from state {0:?}")]
    InvalidState(RuntimeState),

    /// A transport failed to initialize.
    #[error("{protocol:?} transport failed to start: {source}")]
    Transport {
        protocol: Protocol,
        #[source]
        source: TransportError,
    },

    /// The dispatch thread could not be spawned.
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Lifecycle state of a [`ServerManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// Tunables for one runtime instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub udp_port: u16,
    pub tcp_port: u16,
    /// How long the loop sleeps after an iteration that produced nothing.
    pub poll_interval: Duration,
    /// Capacity of the unclaimed-packet FIFO.  The oldest packet is dropped
    /// when it is full.
    pub max_queued_packets: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            poll_interval: Duration::from_millis(10),
            max_queued_packets: 1024,
        }
    }
}

struct Transports {
    udp: Box<dyn Transport>,
    tcp: Box<dyn Transport>,
}

impl Transports {
    fn get_mut(&mut self, protocol: Protocol) -> &mut dyn Transport {
        match protocol {
            Protocol::Udp => self.udp.as_mut(),
            Protocol::Tcp => self.tcp.as_mut(),
        }
    }

    fn selected(&mut self, mask: Protocols) -> impl Iterator<Item = &mut Box<dyn Transport>> {
        [&mut self.udp, &mut self.tcp]
            .into_iter()
            .filter(move |t| mask.contains(t.protocol()))
    }
}

struct Shared {
    transports: Mutex<Transports>,
    callbacks: RwLock<CallbackRegistry>,
    queue: Mutex<VecDeque<Packet>>,
    state: Mutex<RuntimeState>,
    running: AtomicBool,
    manifest: Arc<dyn Manifest>,
    settings: RuntimeSettings,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to a runtime.
///
/// Handles can be moved into callbacks and other threads.  They do not keep
/// the background thread alive: when the owning [`ServerManager`] is shut
/// down or dropped, handle operations see uninitialized transports and
/// report zero sends.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

/// Owner of a dispatch runtime.  Dropping it shuts the runtime down.
///
/// All packet operations are available through [`Deref`] to
/// [`ServerHandle`].
pub struct ServerManager {
    handle: ServerHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ServerManager {
    /// Creates a runtime around the two transports.  Nothing is bound until
    /// [`ServerManager::init`].
    pub fn new(
        udp: Box<dyn Transport>,
        tcp: Box<dyn Transport>,
        manifest: Arc<dyn Manifest>,
        settings: RuntimeSettings,
    ) -> Self {
        let shared = Shared {
            transports: Mutex::new(Transports { udp, tcp }),
            callbacks: RwLock::new(CallbackRegistry::new()),
            queue: Mutex::new(VecDeque::new()),
            state: Mutex::new(RuntimeState::Uninitialized),
            running: AtomicBool::new(false),
            manifest,
            settings,
        };
        Self {
            handle: ServerHandle {
                shared: Arc::new(shared),
            },
            worker: Mutex::new(None),
        }
    }

    /// Binds both transports and starts the dispatch thread.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidState`] unless the runtime is `Uninitialized`.
    /// - [`RuntimeError::Transport`] if either transport fails to bind; the
    ///   other one is shut down again and the runtime stays `Uninitialized`.
    /// - [`RuntimeError::Spawn`] if the thread cannot be created.
    pub fn init(&self) -> Result<(), RuntimeError> {
        let shared = &self.handle.shared;
        let mut state = lock(&shared.state);
        if *state != RuntimeState::Uninitialized {
            return Err(RuntimeError::InvalidState(*state));
        }

        {
            let mut transports = lock(&shared.transports);
            transports
                .udp
                .init(shared.settings.udp_port)
                .map_err(|source| RuntimeError::Transport {
                    protocol: Protocol::Udp,
                    source,
                })?;
            if let Err(source) = transports.tcp.init(shared.settings.tcp_port) {
                transports.udp.shutdown();
                return Err(RuntimeError::Transport {
                    protocol: Protocol::Tcp,
                    source,
                });
            }
        }

        shared.running.store(true, Ordering::Release);
        let loop_shared = Arc::clone(shared);
        let worker = thread::Builder::new()
            .name("rovecomm-dispatch".to_string())
            .spawn(move || dispatch_loop(loop_shared));
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                let mut transports = lock(&shared.transports);
                transports.udp.shutdown();
                transports.tcp.shutdown();
                return Err(RuntimeError::Spawn(e));
            }
        };
        *lock(&self.worker) = Some(worker);
        *state = RuntimeState::Running;

        info!(
            "rovecomm runtime running (udp {:?}, tcp {:?})",
            self.udp_port(),
            self.tcp_port()
        );
        Ok(())
    }

    /// Stops the dispatch thread, waits for it, and closes both transports.
    ///
    /// Idempotent.  When called from inside a callback the thread is not
    /// joined (it cannot join itself); it exits after the current iteration.
    pub fn shutdown(&self) {
        let shared = &self.handle.shared;
        {
            let mut state = lock(&shared.state);
            match *state {
                RuntimeState::Running => *state = RuntimeState::ShuttingDown,
                RuntimeState::Uninitialized => {
                    *state = RuntimeState::Stopped;
                    return;
                }
                RuntimeState::ShuttingDown | RuntimeState::Stopped => return,
            }
        }

        shared.running.store(false, Ordering::Release);
        if let Some(worker) = lock(&self.worker).take() {
            if worker.thread().id() == thread::current().id() {
                debug!("shutdown requested from the dispatch thread; not joining");
            } else if worker.join().is_err() {
                error!("dispatch thread panicked");
            }
        }

        {
            let mut transports = lock(&shared.transports);
            transports.udp.shutdown();
            transports.tcp.shutdown();
        }

        *lock(&shared.state) = RuntimeState::Stopped;
        info!("rovecomm runtime stopped");
    }

    /// A cloneable handle for use in callbacks and other threads.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }
}

impl Deref for ServerManager {
    type Target = ServerHandle;

    fn deref(&self) -> &ServerHandle {
        &self.handle
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ServerHandle {
    pub fn state(&self) -> RuntimeState {
        *lock(&self.shared.state)
    }

    /// Port the UDP transport is bound to, once running.
    pub fn udp_port(&self) -> Option<u16> {
        lock(&self.shared.transports).udp.local_port()
    }

    /// Port the TCP listener is bound to, once running.
    pub fn tcp_port(&self) -> Option<u16> {
        lock(&self.shared.transports).tcp.local_port()
    }

    pub fn manifest(&self) -> &dyn Manifest {
        self.shared.manifest.as_ref()
    }

    /// Fans `packet` out on every transport selected by `mask`.
    ///
    /// Returns the total number of destinations reached.
    pub fn write(&self, packet: &Packet, mask: Protocols) -> usize {
        let mut transports = lock(&self.shared.transports);
        transports.selected(mask).map(|t| t.write(packet)).sum()
    }

    /// Builds a packet from typed values (checked against the manifest) and
    /// fans it out like [`ServerHandle::write`].
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the values do not fit the declared
    /// element type, count, or size limit.
    pub fn write_elements<T: Element>(
        &self,
        data_id: u16,
        element_type: ElementType,
        elements: &[T],
        mask: Protocols,
    ) -> Result<usize, EncodeError> {
        let packet = build_packet(data_id, element_type, elements, self.manifest())?;
        Ok(self.write(&packet, mask))
    }

    /// Sends `packet` to one endpoint on every transport selected by `mask`.
    ///
    /// Returns the number of transports that accepted the packet.  Failures
    /// are logged.
    pub fn send_to(&self, packet: &Packet, endpoint: Endpoint, mask: Protocols) -> usize {
        let mut transports = lock(&self.shared.transports);
        let mut accepted = 0;
        for transport in transports.selected(mask) {
            match transport.send_to(packet, endpoint) {
                Ok(_) => accepted += 1,
                Err(e) => warn!("{:?} send of {packet} failed: {e}", transport.protocol()),
            }
        }
        accepted
    }

    /// Asks `endpoint` to include this node in its fan-out, on every
    /// transport selected by `mask`.
    ///
    /// Returns the number of transports on which the request went out.
    pub fn subscribe_to(&self, endpoint: Endpoint, mask: Protocols) -> usize {
        let mut transports = lock(&self.shared.transports);
        let mut requested = 0;
        for transport in transports.selected(mask) {
            match transport.subscribe_to(endpoint) {
                Ok(()) => requested += 1,
                Err(e) => warn!("{:?} subscribe to {endpoint} failed: {e}", transport.protocol()),
            }
        }
        requested
    }

    /// Asks `endpoint` to stop including this node in its fan-out, on every
    /// transport selected by `mask`.
    ///
    /// Returns the number of transports on which the request went out.
    pub fn unsubscribe_from(&self, endpoint: Endpoint, mask: Protocols) -> usize {
        let mut transports = lock(&self.shared.transports);
        let mut requested = 0;
        for transport in transports.selected(mask) {
            match transport.unsubscribe_from(endpoint) {
                Ok(()) => requested += 1,
                Err(e) => warn!(
                    "{:?} unsubscribe from {endpoint} failed: {e}",
                    transport.protocol()
                ),
            }
        }
        requested
    }

    /// Registers `callback` for `data_id` (0 for every packet).
    ///
    /// A later registration for the same ID replaces this one.  If the
    /// manifest declares the ID, packets of another element type are not
    /// passed to the callback.
    pub fn set_callback<F>(&self, data_id: u16, callback: F)
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let expected = self.shared.manifest.lookup(data_id).map(|e| e.element_type);
        let replaced = self
            .shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(data_id, Arc::new(callback), expected);
        if replaced {
            debug!("callback for data id {data_id} replaced");
        }
    }

    /// Removes the callback for `data_id`.  Returns `true` if one existed.
    pub fn clear_callback(&self, data_id: u16) -> bool {
        self.shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(data_id)
    }

    /// Pops the oldest packet no callback claimed.
    pub fn next(&self) -> Option<Packet> {
        lock(&self.shared.queue).pop_front()
    }

    /// Number of packets waiting in the FIFO.
    pub fn pending(&self) -> usize {
        lock(&self.shared.queue).len()
    }
}

// ── Dispatch loop ─────────────────────────────────────────────────────────────

fn dispatch_loop(shared: Arc<Shared>) {
    debug!("dispatch loop started");

    while shared.running.load(Ordering::Acquire) {
        let packets = shared.poll_transports();
        if packets.is_empty() {
            thread::sleep(shared.settings.poll_interval);
            continue;
        }
        for (protocol, packet) in packets {
            shared.dispatch(protocol, packet);
        }
    }

    debug!("dispatch loop stopped");
}

impl Shared {
    /// One non-blocking pass over both transports.
    fn poll_transports(&self) -> Vec<(Protocol, Packet)> {
        let mut transports = lock(&self.transports);
        let accepted = transports.tcp.accept_incoming();
        if accepted > 0 {
            debug!("accepted {accepted} tcp connection(s)");
        }

        let mut packets = Vec::new();
        for protocol in [Protocol::Udp, Protocol::Tcp] {
            packets.extend(
                transports
                    .get_mut(protocol)
                    .read()
                    .into_iter()
                    .map(|p| (protocol, p)),
            );
        }
        packets
    }

    fn dispatch(&self, protocol: Protocol, packet: Packet) {
        if packet.data_id() == system::PING {
            self.reply_to_ping(protocol, &packet);
        }

        let targets = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .route(&packet);

        let mut claimed = false;
        match targets.exact {
            ExactMatch::Matched(callback) => {
                invoke(&*callback, &packet);
                claimed = true;
            }
            ExactMatch::TypeMismatch { expected } => {
                warn!(
                    "{packet} does not carry the declared {expected:?} elements; not delivered to its callback"
                );
            }
            ExactMatch::NotRegistered => {}
        }
        if let Some(wildcard) = targets.wildcard {
            invoke(&*wildcard, &packet);
            claimed = true;
        }

        if !claimed {
            self.enqueue(packet);
        }
    }

    fn reply_to_ping(&self, protocol: Protocol, ping: &Packet) {
        let Some(source) = ping.source() else {
            return;
        };
        let reply = match Packet::from_wire(
            system::PING_REPLY,
            ping.element_type(),
            ping.element_count(),
            ping.payload().to_vec(),
        ) {
            Ok(reply) => reply,
            Err(e) => {
                error!("could not build ping reply: {e}");
                return;
            }
        };

        let mut transports = lock(&self.transports);
        match transports.get_mut(protocol).send_to(&reply, source) {
            Ok(_) => debug!("answered ping from {source} over {protocol:?}"),
            Err(e) => warn!("ping reply to {source} failed: {e}"),
        }
    }

    fn enqueue(&self, packet: Packet) {
        let mut queue = lock(&self.queue);
        if queue.len() >= self.settings.max_queued_packets {
            if let Some(dropped) = queue.pop_front() {
                warn!("packet queue full; dropped oldest {dropped}");
            }
        }
        queue.push_back(packet);
    }
}

fn invoke(callback: &(dyn Fn(&Packet) + Send + Sync), packet: &Packet) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(packet))).is_err() {
        error!("callback for data id {} panicked", packet.data_id());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::MockTransport;
    use rovecomm_core::{ManifestEntry, StaticManifest};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn settings() -> RuntimeSettings {
        RuntimeSettings {
            udp_port: 0,
            tcp_port: 0,
            poll_interval: Duration::from_millis(1),
            max_queued_packets: 4,
        }
    }

    fn manager_with_mocks(manifest: StaticManifest) -> (ServerManager, MockTransport, MockTransport) {
        let udp = MockTransport::new(Protocol::Udp);
        let tcp = MockTransport::new(Protocol::Tcp);
        let manager = ServerManager::new(
            Box::new(udp.clone()),
            Box::new(tcp.clone()),
            Arc::new(manifest),
            settings(),
        );
        (manager, udp, tcp)
    }

    fn packet(data_id: u16) -> Packet {
        Packet::new(data_id, ElementType::UInt8, &[1u8]).unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_new_runtime_is_uninitialized() {
        let (manager, _, _) = manager_with_mocks(StaticManifest::empty());
        assert_eq!(manager.state(), RuntimeState::Uninitialized);
    }

    #[test]
    fn test_init_then_shutdown_walks_the_state_machine() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());

        // Act
        manager.init().expect("init");
        let running = manager.state();
        manager.shutdown();

        // Assert
        assert_eq!(running, RuntimeState::Running);
        assert_eq!(manager.state(), RuntimeState::Stopped);
        assert!(udp.was_shut_down());
        assert!(tcp.was_shut_down());
    }

    #[test]
    fn test_second_init_is_rejected() {
        let (manager, _, _) = manager_with_mocks(StaticManifest::empty());
        manager.init().expect("init");

        assert!(matches!(
            manager.init(),
            Err(RuntimeError::InvalidState(RuntimeState::Running))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (manager, _, _) = manager_with_mocks(StaticManifest::empty());
        manager.init().expect("init");

        manager.shutdown();
        manager.shutdown();

        assert_eq!(manager.state(), RuntimeState::Stopped);
    }

    #[test]
    fn test_tcp_bind_failure_rolls_back_udp() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        tcp.fail_next_init();

        // Act
        let result = manager.init();

        // Assert
        assert!(matches!(
            result,
            Err(RuntimeError::Transport {
                protocol: Protocol::Tcp,
                ..
            })
        ));
        assert!(udp.was_shut_down());
        assert_eq!(manager.state(), RuntimeState::Uninitialized);
    }

    #[test]
    fn test_exact_callback_only_sees_its_id_and_wildcard_sees_all() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        let exact_hits = Arc::new(AtomicUsize::new(0));
        let any_hits = Arc::new(AtomicUsize::new(0));
        {
            let exact_hits = Arc::clone(&exact_hits);
            manager.set_callback(3000, move |_| {
                exact_hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let any_hits = Arc::clone(&any_hits);
            manager.set_callback(system::ANY, move |_| {
                any_hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        manager.init().expect("init");

        // Act
        udp.inject(packet(3000));
        tcp.inject(packet(3001));

        // Assert
        assert!(wait_until(|| any_hits.load(Ordering::SeqCst) == 2));
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn test_unclaimed_packets_are_queued_in_order() {
        let (manager, udp, _) = manager_with_mocks(StaticManifest::empty());
        manager.init().expect("init");

        udp.inject(packet(10));
        udp.inject(packet(11));

        assert!(wait_until(|| manager.pending() == 2));
        assert_eq!(manager.next().map(|p| p.data_id()), Some(10));
        assert_eq!(manager.next().map(|p| p.data_id()), Some(11));
        assert!(manager.next().is_none());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        // Arrange – capacity 4
        let (manager, udp, _) = manager_with_mocks(StaticManifest::empty());
        manager.init().expect("init");

        // Act
        for id in 100..106 {
            udp.inject(packet(id));
        }

        // Assert
        assert!(wait_until(|| udp.queued() == 0));
        assert!(wait_until(|| manager.pending() == 4));
        assert_eq!(manager.next().map(|p| p.data_id()), Some(102));
    }

    #[test]
    fn test_cleared_callback_no_longer_fires() {
        let (manager, udp, _) = manager_with_mocks(StaticManifest::empty());
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            manager.set_callback(3000, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(manager.clear_callback(3000));
        manager.init().expect("init");

        udp.inject(packet(3000));

        assert!(wait_until(|| manager.pending() == 1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_packet_with_wrong_type_bypasses_typed_callback() {
        // Arrange – manifest says 2100 carries one f32
        let mut manifest = StaticManifest::empty();
        manifest.insert(ManifestEntry::new(2100, 1, ElementType::Float32));
        let (manager, udp, _) = manager_with_mocks(manifest);
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            manager.set_callback(2100, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        manager.init().expect("init");

        // Act
        udp.inject(packet(2100));

        // Assert
        assert!(wait_until(|| manager.pending() == 1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_the_loop() {
        let (manager, udp, _) = manager_with_mocks(StaticManifest::empty());
        manager.set_callback(1000, |_| panic!("boom"));
        manager.init().expect("init");

        udp.inject(packet(1000));
        udp.inject(packet(1001));

        assert!(wait_until(|| manager.pending() == 1));
        assert_eq!(manager.state(), RuntimeState::Running);
    }

    #[test]
    fn test_ping_is_answered_on_the_same_transport() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        let peer = Endpoint::new([10, 0, 0, 5], 11000);
        manager.init().expect("init");

        // Act
        tcp.inject(packet(system::PING).with_source(peer));

        // Assert
        assert!(wait_until(|| !tcp.sent_to().is_empty()));
        let (reply, dest) = tcp.sent_to()[0].clone();
        assert_eq!(reply.data_id(), system::PING_REPLY);
        assert_eq!(dest, peer);
        assert!(udp.sent_to().is_empty());
    }

    #[test]
    fn test_write_respects_protocol_mask() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        udp.set_fan_out(3);
        tcp.set_fan_out(2);

        // Act
        let udp_only = manager.write(&packet(5000), Protocols::UDP);
        let both = manager.write(&packet(5000), Protocols::ALL);

        // Assert
        assert_eq!(udp_only, 3);
        assert_eq!(both, 5);
        assert_eq!(udp.written().len(), 2);
        assert_eq!(tcp.written().len(), 1);
    }

    #[test]
    fn test_write_elements_checks_manifest() {
        let (manager, udp, _) = manager_with_mocks(StaticManifest::builtin());
        udp.set_fan_out(1);

        let ok = manager.write_elements(2101, ElementType::Float32, &[48.0f32], Protocols::UDP);
        let bad = manager.write_elements(2101, ElementType::Float32, &[1.0f32, 2.0], Protocols::UDP);

        assert_eq!(ok, Ok(1));
        assert!(matches!(bad, Err(EncodeError::CountMismatch { .. })));
    }

    #[test]
    fn test_send_to_and_subscribe_to_count_transports() {
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        let peer = Endpoint::new([10, 0, 0, 9], 11000);
        tcp.fail_sends();

        assert_eq!(manager.send_to(&packet(7000), peer, Protocols::ALL), 1);
        assert_eq!(manager.subscribe_to(peer, Protocols::ALL), 2);
        assert_eq!(udp.subscriptions(), vec![peer]);
        assert_eq!(tcp.subscriptions(), vec![peer]);
    }

    #[test]
    fn test_unsubscribe_from_reaches_only_masked_transports() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        let peer = Endpoint::new([192, 168, 2, 100], 11000);

        // Act
        let requested = manager.unsubscribe_from(peer, Protocols::UDP);

        // Assert
        assert_eq!(requested, 1);
        assert_eq!(udp.unsubscriptions(), vec![peer]);
        assert!(tcp.unsubscriptions().is_empty());
    }

    #[test]
    fn test_callback_can_write_through_handle() {
        // Arrange
        let (manager, udp, tcp) = manager_with_mocks(StaticManifest::empty());
        tcp.set_fan_out(1);
        let handle = manager.handle();
        manager.set_callback(4000, move |p| {
            handle.write(p, Protocols::TCP);
        });
        manager.init().expect("init");

        // Act
        udp.inject(packet(4000));

        // Assert
        assert!(wait_until(|| tcp.written().len() == 1));
    }
}
