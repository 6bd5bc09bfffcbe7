use gtpv1u::{GtpTeid, TunnelEndpoint};
use slog::{Logger, info};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::Ipv4Addr;

/// Which side of a subscriber's tunnel pair an endpoint belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Radio,
    Core,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Radio => write!(f, "eNodeB"),
            Side::Core => write!(f, "EPC"),
        }
    }
}

/// A subscriber's two tunnel endpoints.  Both sides are always present -
/// a partial binding is unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TunnelPair {
    pub radio: TunnelEndpoint,
    pub core: TunnelEndpoint,
}

impl TunnelPair {
    pub fn endpoint(&self, side: Side) -> &TunnelEndpoint {
        match side {
            Side::Radio => &self.radio,
            Side::Core => &self.core,
        }
    }
}

impl std::fmt::Display for TunnelPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.radio, self.core)
    }
}

/// Gate consulted before any binding is created or revised.
pub trait BindingObserver {
    /// Return false to reject the change; the upsert is then a silent no-op.
    fn before_upsert(&mut self, subscriber: Ipv4Addr, candidate: &TunnelPair) -> bool;
}

/// Default observer: log the candidate binding and accept it.
pub struct LogBindings {
    logger: Logger,
}

impl LogBindings {
    pub fn new(logger: Logger) -> Self {
        LogBindings { logger }
    }
}

impl BindingObserver for LogBindings {
    fn before_upsert(&mut self, subscriber: Ipv4Addr, candidate: &TunnelPair) -> bool {
        info!(
            self.logger,
            "Inserting UE IP: {} --> (eNB <-> EPC) {}", subscriber, candidate
        );
        true
    }
}

/// Map from subscriber user-plane address to its tunnel endpoints, learned
/// from control-plane signaling.  Entries are never evicted.
pub struct TunnelTable {
    map: HashMap<Ipv4Addr, TunnelPair>,
    observer: Box<dyn BindingObserver>,
    logger: Logger,
}

impl TunnelTable {
    pub fn new(logger: Logger) -> Self {
        let observer = Box::new(LogBindings::new(logger.clone()));
        Self::with_observer(observer, logger)
    }

    pub fn with_observer(observer: Box<dyn BindingObserver>, logger: Logger) -> Self {
        TunnelTable {
            map: HashMap::new(),
            observer,
            logger,
        }
    }

    pub fn lookup(&self, subscriber: Ipv4Addr) -> Option<&TunnelPair> {
        self.map.get(&subscriber)
    }

    /// Create or revise the binding for `subscriber` from a signaling
    /// observation.  The most recent observation wins: each side whose
    /// tunnel id differs from the stored one is updated, the other side is
    /// left untouched.
    pub fn upsert(&mut self, subscriber: Ipv4Addr, observed: TunnelPair) {
        if !self.observer.before_upsert(subscriber, &observed) {
            return;
        }
        match self.map.entry(subscriber) {
            Entry::Vacant(entry) => {
                entry.insert(observed);
                info!(
                    self.logger,
                    "New tunnel binding for UE {}: {}", subscriber, observed
                );
            }
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                if stored.radio.teid != observed.radio.teid {
                    info!(
                        self.logger,
                        "Updating {} GTP TEID for UE {} from {} to {}",
                        Side::Radio,
                        subscriber,
                        stored.radio.teid,
                        observed.radio.teid
                    );
                    stored.radio.teid = observed.radio.teid;
                }
                if stored.core.teid != observed.core.teid {
                    info!(
                        self.logger,
                        "Updating {} GTP TEID for UE {} from {} to {}",
                        Side::Core,
                        subscriber,
                        stored.core.teid,
                        observed.core.teid
                    );
                    stored.core.teid = observed.core.teid;
                }
            }
        }
    }

    /// Targeted single-side revision, used for TEID drift self-healing.
    /// Returns true if the stored id actually changed.
    pub fn update_tunnel_id(&mut self, subscriber: Ipv4Addr, side: Side, teid: GtpTeid) -> bool {
        let Some(pair) = self.map.get_mut(&subscriber) else {
            return false;
        };
        let endpoint = match side {
            Side::Radio => &mut pair.radio,
            Side::Core => &mut pair.core,
        };
        if endpoint.teid == teid {
            return false;
        }
        info!(
            self.logger,
            "Updating {} GTP TEID for UE {} from {} to {}", side, subscriber, endpoint.teid, teid
        );
        endpoint.teid = teid;
        true
    }

    /// All bindings, in implementation-defined order.
    pub fn snapshot(&self) -> Vec<(Ipv4Addr, TunnelPair)> {
        self.map.iter().map(|(ue, pair)| (*ue, *pair)).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
