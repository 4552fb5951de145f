// File: testing-framework/src/foundation/ports.rs
//
// Port Leasing
//
// Every node of a foundation needs an rpc, a p2p and a prometheus port.
// Foundations of concurrently running suites must never share a port, so
// ports are leased in contiguous ranges and only handed out again once the
// lease is released.

use crate::error::HarnessError;
use parking_lot::Mutex;
use serde::Serialize;
use std::net::TcpListener;
use std::ops::Range;
use std::sync::Arc;

/// Ports needed by one node: rpc, p2p, prometheus.
pub const PORTS_PER_NODE: u16 = 3;

/// Ports assigned to a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodePorts {
    /// HTTP/WS RPC
    pub rpc: u16,
    /// libp2p listen port
    pub p2p: u16,
    /// Prometheus exporter
    pub prometheus: u16,
}

type LeaseTable = Arc<Mutex<Vec<(u64, Range<u16>)>>>;

/// Hands out disjoint port ranges starting at a base port.
#[derive(Clone)]
pub struct PortAllocator {
    base_port: u16,
    leases: LeaseTable,
    next_id: Arc<Mutex<u64>>,
}

impl PortAllocator {
    /// Allocator handing out ports at or above `base_port`.
    pub fn new(base_port: u16) -> Self {
        Self {
            base_port,
            leases: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(0)),
        }
    }

    /// First port considered
    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Number of outstanding leases
    pub fn active_leases(&self) -> usize {
        self.leases.lock().len()
    }

    /// Lease `count` contiguous ports that are neither leased nor bound by
    /// another process.
    ///
    /// Ranges containing a port that cannot be bound are skipped; running out
    /// of port space is a [`HarnessError::ProvisionConflict`].
    pub fn lease(&self, count: u16) -> Result<PortLease, HarnessError> {
        if count == 0 {
            return Err(HarnessError::ProvisionConflict(
                "cannot lease an empty port range".to_string(),
            ));
        }

        let mut leases = self.leases.lock();
        let mut start = u32::from(self.base_port);
        // Range<u16> cannot express an end of 65536, so 65535 is never leased
        let end_of_space = u32::from(u16::MAX);

        'search: while start + u32::from(count) <= end_of_space {
            let candidate = start as u16..(start + u32::from(count)) as u16;

            if let Some((_, taken)) = leases
                .iter()
                .find(|(_, r)| r.start < candidate.end && candidate.start < r.end)
            {
                start = u32::from(taken.end);
                continue;
            }

            for port in candidate.clone() {
                if !is_bindable(port) {
                    log::debug!("Port {} is in use, skipping", port);
                    start = u32::from(port) + 1;
                    continue 'search;
                }
            }

            let id = {
                let mut next_id = self.next_id.lock();
                *next_id += 1;
                *next_id
            };
            leases.push((id, candidate.clone()));
            log::debug!("Leased ports {:?} (lease #{})", candidate, id);

            return Ok(PortLease {
                id,
                range: candidate,
                table: self.leases.clone(),
                released: false,
            });
        }

        Err(HarnessError::ProvisionConflict(format!(
            "no free range of {} ports at or above {}",
            count, self.base_port
        )))
    }
}

fn is_bindable(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// A leased port range, returned to the allocator on release or drop.
#[derive(Debug)]
pub struct PortLease {
    id: u64,
    range: Range<u16>,
    table: LeaseTable,
    released: bool,
}

impl PortLease {
    /// Leased range
    pub fn range(&self) -> Range<u16> {
        self.range.clone()
    }

    /// Ports of the node at `index` within this lease, if it fits.
    pub fn node_ports(&self, index: usize) -> Option<NodePorts> {
        let offset = u32::try_from(index).ok()? * u32::from(PORTS_PER_NODE);
        let rpc = u32::from(self.range.start) + offset;
        if rpc + u32::from(PORTS_PER_NODE) > u32::from(self.range.end) {
            return None;
        }
        Some(NodePorts {
            rpc: rpc as u16,
            p2p: (rpc + 1) as u16,
            prometheus: (rpc + 2) as u16,
        })
    }

    /// Return the range to the allocator. Calling twice is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.table.lock().retain(|(id, _)| *id != self.id);
        self.released = true;
        log::debug!("Released ports {:?} (lease #{})", self.range, self.id);
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.release();
    }
}
