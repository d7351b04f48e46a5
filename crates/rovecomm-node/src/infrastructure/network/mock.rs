//! Mock transport for unit testing.
//!
//! Lets tests inject received packets and inspect what the runtime sent,
//! without binding sockets.  Clones share state, so a test keeps one clone
//! and hands the other to the [`ServerManager`](crate::application::dispatch::ServerManager).

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use rovecomm_core::{Endpoint, Packet};

use crate::application::transport::{Protocol, Transport, TransportError};

#[derive(Default)]
struct MockState {
    inbound: VecDeque<Packet>,
    written: Vec<Packet>,
    sent_to: Vec<(Packet, Endpoint)>,
    subscriptions: Vec<Endpoint>,
    unsubscriptions: Vec<Endpoint>,
    fan_out: usize,
    port: Option<u16>,
    shut_down: bool,
    fail_next_init: bool,
    fail_sends: bool,
}

/// A [`Transport`] backed by in-memory queues.
#[derive(Clone)]
pub struct MockTransport {
    protocol: Protocol,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queues `packet` to be returned by the next `read`.
    pub fn inject(&self, packet: Packet) {
        self.state.lock().expect("lock poisoned").inbound.push_back(packet);
    }

    /// Injected packets not yet read.
    pub fn queued(&self) -> usize {
        self.state.lock().expect("lock poisoned").inbound.len()
    }

    /// Number of destinations each `write` reports reaching.
    pub fn set_fan_out(&self, destinations: usize) {
        self.state.lock().expect("lock poisoned").fan_out = destinations;
    }

    /// Makes the next `init` fail with a bind error.
    pub fn fail_next_init(&self) {
        self.state.lock().expect("lock poisoned").fail_next_init = true;
    }

    /// Makes every `send_to` fail.
    pub fn fail_sends(&self) {
        self.state.lock().expect("lock poisoned").fail_sends = true;
    }

    pub fn written(&self) -> Vec<Packet> {
        self.state.lock().expect("lock poisoned").written.clone()
    }

    pub fn sent_to(&self) -> Vec<(Packet, Endpoint)> {
        self.state.lock().expect("lock poisoned").sent_to.clone()
    }

    pub fn subscriptions(&self) -> Vec<Endpoint> {
        self.state.lock().expect("lock poisoned").subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<Endpoint> {
        self.state.lock().expect("lock poisoned").unsubscriptions.clone()
    }

    pub fn was_shut_down(&self) -> bool {
        self.state.lock().expect("lock poisoned").shut_down
    }
}

impl Transport for MockTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn init(&mut self, port: u16) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if std::mem::take(&mut state.fail_next_init) {
            return Err(TransportError::Bind {
                port,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }
        state.port = Some(port);
        state.shut_down = false;
        Ok(())
    }

    fn local_port(&self) -> Option<u16> {
        self.state.lock().expect("lock poisoned").port
    }

    fn shutdown(&mut self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.port = None;
        state.shut_down = true;
    }

    fn write(&mut self, packet: &Packet) -> usize {
        let mut state = self.state.lock().expect("lock poisoned");
        state.written.push(packet.clone());
        state.fan_out
    }

    fn send_to(&mut self, packet: &Packet, endpoint: Endpoint) -> Result<usize, TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_sends {
            return Err(TransportError::Send {
                endpoint,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        state.sent_to.push((packet.clone(), endpoint));
        Ok(packet.wire_len())
    }

    fn subscribe_to(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .subscriptions
            .push(endpoint);
        Ok(())
    }

    fn unsubscribe_from(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.state
            .lock()
            .expect("lock poisoned")
            .unsubscriptions
            .push(endpoint);
        Ok(())
    }

    fn read(&mut self) -> Vec<Packet> {
        self.state
            .lock()
            .expect("lock poisoned")
            .inbound
            .drain(..)
            .collect()
    }
}
