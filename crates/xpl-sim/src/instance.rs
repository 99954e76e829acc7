//! Virtual simulator instance
//!
//! A synchronous, protocol-accurate stand-in for a running simulator: it
//! holds a dataref table, tracks subscriptions keyed by the client's index,
//! and queues protocol-encoded reply datagrams as its state changes. The
//! async serve loop in [`crate::task`] moves bytes; everything here is
//! plain state, which keeps tests deterministic.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use xpl_protocol::beacon::ROLE_PRIMARY;
use xpl_protocol::dataref::{
    encode_updates, PublishRequest, SubscribeRequest, DREF_REQUEST_TAG, RREF_REQUEST_TAG,
};
use xpl_protocol::Beacon;

/// One client subscription as the simulator sees it
#[derive(Debug, Clone, PartialEq, Eq)]
struct SimSubscription {
    name: String,
    frequency: i32,
}

/// Configuration for creating a virtual simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualSimulatorConfig {
    /// Computer name advertised in beacons
    pub computer_name: String,
    /// Simulator build number advertised in beacons
    pub version: i32,
    /// Instance role advertised in beacons (primary by default)
    pub role: u32,
    /// Initial dataref table
    pub datarefs: Vec<(String, f32)>,
}

impl Default for VirtualSimulatorConfig {
    fn default() -> Self {
        Self {
            computer_name: "virtual-sim".to_string(),
            version: 115501,
            role: ROLE_PRIMARY,
            datarefs: Vec::new(),
        }
    }
}

/// A simulated simulator instance
#[derive(Debug)]
pub struct VirtualSimulator {
    computer_name: String,
    version: i32,
    role: u32,
    datarefs: HashMap<String, f32>,
    subscriptions: HashMap<u32, SimSubscription>,
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualSimulator {
    /// Create an empty virtual simulator with default settings
    pub fn new() -> Self {
        Self::from_config(VirtualSimulatorConfig::default())
    }

    /// Create a virtual simulator from configuration
    pub fn from_config(config: VirtualSimulatorConfig) -> Self {
        Self {
            computer_name: config.computer_name,
            version: config.version,
            role: config.role,
            datarefs: config.datarefs.into_iter().collect(),
            subscriptions: HashMap::new(),
            pending_output: VecDeque::new(),
        }
    }

    /// Current value of a dataref, if known
    pub fn dataref(&self, name: &str) -> Option<f32> {
        self.datarefs.get(name).copied()
    }

    /// Number of live client subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Set a dataref and queue an update for every subscription watching it
    ///
    /// All matching records are batched into a single reply datagram, the
    /// same way the real simulator multiplexes its stream.
    pub fn set_dataref(&mut self, name: &str, value: f32) {
        self.datarefs.insert(name.to_owned(), value);

        let mut records: Vec<(u32, f32)> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.name == name)
            .map(|(&index, _)| (index, value))
            .collect();
        if records.is_empty() {
            return;
        }
        records.sort_by_key(|&(index, _)| index);
        self.pending_output.push_back(encode_updates(&records));
    }

    /// Process one inbound request datagram
    ///
    /// Subscribe records with a positive frequency register the index and
    /// queue an immediate update with the current value; frequency 0
    /// cancels. Publish records write the value (and notify any watchers).
    /// Anything else is ignored — the real simulator shares its port with
    /// several request families.
    pub fn handle_datagram(&mut self, bytes: &[u8]) {
        if bytes.starts_with(RREF_REQUEST_TAG) {
            match SubscribeRequest::decode(bytes) {
                Ok(request) if request.is_cancel() => {
                    self.subscriptions.remove(&request.index);
                    debug!(name = %request.name, index = request.index, "subscription cancelled");
                }
                Ok(request) => {
                    let value = *self.datarefs.entry(request.name.clone()).or_insert(0.0);
                    debug!(
                        name = %request.name,
                        index = request.index,
                        frequency = request.frequency,
                        "subscription registered"
                    );
                    self.subscriptions.insert(
                        request.index,
                        SimSubscription {
                            name: request.name,
                            frequency: request.frequency,
                        },
                    );
                    self.pending_output
                        .push_back(encode_updates(&[(request.index, value)]));
                }
                Err(err) => warn!(error = %err, "dropping bad subscribe record"),
            }
        } else if bytes.starts_with(DREF_REQUEST_TAG) {
            match PublishRequest::decode(bytes) {
                Ok(request) => self.set_dataref(&request.name, request.value),
                Err(err) => warn!(error = %err, "dropping bad publish record"),
            }
        } else {
            debug!(len = bytes.len(), "ignoring unrecognized datagram");
        }
    }

    /// Queue one reply datagram carrying the current value of every
    /// subscription
    pub fn tick(&mut self) {
        let mut records: Vec<(u32, f32)> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.frequency > 0)
            .map(|(&index, sub)| (index, self.datarefs.get(&sub.name).copied().unwrap_or(0.0)))
            .collect();
        if records.is_empty() {
            return;
        }
        records.sort_by_key(|&(index, _)| index);
        self.pending_output.push_back(encode_updates(&records));
    }

    /// Take the next queued reply datagram
    pub fn poll_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Encode the discovery beacon this instance would broadcast
    ///
    /// `port` is where the instance accepts dataref traffic (the serve
    /// loop's bound port).
    pub fn beacon_bytes(&self, port: u16) -> Vec<u8> {
        Beacon {
            source: std::net::SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, 0)),
            major: 1,
            minor: 2,
            host_id: 1,
            version: self.version,
            role: self.role,
            port,
            computer_name: self.computer_name.clone(),
            raknet_port: 0,
        }
        .encode()
    }
}

impl Default for VirtualSimulator {
    fn default() -> Self {
        Self::new()
    }
}
