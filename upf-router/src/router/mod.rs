mod counters;
mod encap;

pub use counters::RouterCounters;
pub use encap::{BridgeOutput, DumpUnknown, EncapsulationBridge, UnknownSubscriberHook};

use crate::data::{BindingObserver, Config, LogBindings, Side, TunnelTable};
use crate::management::split_rule_items;
use crate::packet::{
    DecodedPacket, GtpuView, Ipv4View, PacketContext, is_tunnel_port, opposite_tunnel_port, ports,
};
use crate::rules::{Rule, RuleStore};
use anyhow::{Context, Result};
use atomic_counter::AtomicCounter;
use slog::Logger;

/// Terminal outcome of classifying one packet.  The host emits the carried
/// buffer on the named port, or does nothing for a drop; either way the
/// original buffer has been consumed exactly once.
#[derive(Debug)]
pub enum Outcome {
    /// Emit `packet` unmodified on outbound `port`.
    Forward { port: usize, packet: Vec<u8> },
    /// Emit the decapsulated subscriber payload on the VNF port.
    DecapsulateToVnf { packet: Vec<u8> },
    /// Emit the freshly encapsulated tunnel packet on `port`.
    EncapsulateForward { port: usize, packet: Vec<u8> },
    /// Nothing to emit; the buffer has been released.
    Drop,
}

/// The router core: learns tunnel bindings from signaling, classifies every
/// inbound packet, and diverts rule-matching subscriber traffic to the VNF
/// port.
///
/// Single-threaded and run-to-completion: each call to [`UpfRouter::classify`]
/// fully resolves one packet before the next is accepted.
pub struct UpfRouter {
    tunnel_table: TunnelTable,
    rules: RuleStore,
    bridge: EncapsulationBridge,
    sink_connected: bool,
    counters: RouterCounters,
    logger: Logger,
}

impl UpfRouter {
    pub fn new(config: Config, logger: Logger) -> Result<Self> {
        let observer = Box::new(LogBindings::new(logger.clone()));
        let hook = Box::new(DumpUnknown::new(
            config.enable_unknown_traffic_dump,
            logger.clone(),
        ));
        Self::with_hooks(config, observer, hook, logger)
    }

    /// Build a router with caller-supplied strategy hooks.  The hooks own
    /// their dump behavior; the configured dump toggle only applies to the
    /// default hook.
    pub fn with_hooks(
        config: Config,
        observer: Box<dyn BindingObserver>,
        unknown_hook: Box<dyn UnknownSubscriberHook>,
        logger: Logger,
    ) -> Result<Self> {
        let mut rules = RuleStore::new();
        if let Some(batch) = &config.initial_rules {
            for item in split_rule_items(batch) {
                let rule: Rule = item
                    .parse()
                    .context("Error while parsing startup rules")?;
                rules.append(rule);
            }
        }

        Ok(UpfRouter {
            tunnel_table: TunnelTable::with_observer(observer, logger.clone()),
            rules,
            bridge: EncapsulationBridge::new(config.enable_udp_checksum, unknown_hook),
            sink_connected: config.sink_connected,
            counters: RouterCounters::new(),
            logger,
        })
    }

    /// Classify one packet.  Strict priority cascade; the first matching
    /// case decides the outcome.
    pub fn classify(&mut self, ctx: PacketContext) -> Outcome {
        self.counters.rx_packets.inc();
        let PacketContext {
            ingress,
            buffer,
            decoded,
        } = ctx;

        match decoded {
            DecodedPacket::NonIpv4 => {
                // Only IPv4 is expected on any port.
                self.counters.non_ipv4.inc();
                self.unexpected_traffic(buffer)
            }
            DecodedPacket::Ipv4 {
                outer,
                gtpu,
                signaling,
            } => {
                // Bindings revealed by signaling are learned before any
                // forwarding decision.
                let is_signaling = !signaling.is_empty();
                for observation in signaling {
                    self.tunnel_table
                        .upsert(observation.subscriber, observation.tunnels);
                }

                match gtpu {
                    Some(gtpu) if is_tunnel_port(ingress) => {
                        self.intercepted_tunnel_traffic(ingress, buffer, gtpu)
                    }
                    _ if is_signaling => self.common_traffic(ingress, buffer),
                    _ => self.post_process_ipv4(ingress, buffer, &outer),
                }
            }
        }
    }

    /// Case 1: GTP-U user traffic seen between the two tunnel-facing ports.
    fn intercepted_tunnel_traffic(
        &mut self,
        ingress: usize,
        buffer: Vec<u8>,
        gtpu: GtpuView,
    ) -> Outcome {
        // Radio-to-core traffic identifies the subscriber by the inner
        // source and carries the core-side TEID; core-to-radio is the
        // mirror image.
        let (subscriber, drift_side) = match ingress {
            ports::RADIO => (gtpu.inner.src, Side::Core),
            _ => (gtpu.inner.dst, Side::Radio),
        };

        if self.tunnel_table.lookup(subscriber).is_some() {
            // The observed TEID wins over the stored one (self-healing for
            // sessions rekeyed behind our back).
            if self
                .tunnel_table
                .update_tunnel_id(subscriber, drift_side, gtpu.teid)
            {
                self.counters.teid_repairs.inc();
            }

            if self.rules.matches(&gtpu.inner) {
                let start = gtpu.inner.offset;
                let Some(inner) = buffer.get(start..start + gtpu.inner.total_len) else {
                    // Malformed inner view; drop rather than emit garbage.
                    self.counters.decode_errors.inc();
                    return Outcome::Drop;
                };
                let packet = inner.to_vec();
                self.counters.decapsulated.inc();
                return Outcome::DecapsulateToVnf { packet };
            }
        }

        // Unknown UE and/or no matching rule: tunnel pass-through.
        self.counters.tunnel_passthrough.inc();
        Outcome::Forward {
            port: opposite_tunnel_port(ingress),
            packet: buffer,
        }
    }

    /// Case 2: plain IPv4 traffic nothing else claimed.
    fn post_process_ipv4(&mut self, ingress: usize, buffer: Vec<u8>, outer: &Ipv4View) -> Outcome {
        let Some(packet_bytes) = buffer.get(outer.offset..outer.offset + outer.total_len) else {
            self.counters.decode_errors.inc();
            return Outcome::Drop;
        };
        self.bridge
            .consume_ipv4(outer, packet_bytes, &self.tunnel_table);

        match self.bridge.take_last_output() {
            Some(BridgeOutput::Encapsulated { packet, egress }) => {
                self.counters.encapsulated.inc();
                Outcome::EncapsulateForward {
                    port: egress,
                    packet,
                }
            }
            Some(BridgeOutput::Unknown) if is_tunnel_port(ingress) => {
                // Plain inter-node traffic unrelated to any subscriber.
                self.common_traffic(ingress, buffer)
            }
            Some(BridgeOutput::Unknown) => self.unexpected_traffic(buffer),
            Some(BridgeOutput::Consumed) | None => {
                self.counters.dropped.inc();
                Outcome::Drop
            }
        }
    }

    /// Case 4: residual common traffic is reflected to the opposite
    /// tunnel-facing port.
    fn common_traffic(&mut self, ingress: usize, buffer: Vec<u8>) -> Outcome {
        if !is_tunnel_port(ingress) {
            // Residual traffic from a non-tunnel port has no opposite side.
            return self.unexpected_traffic(buffer);
        }
        self.counters.common_forwarded.inc();
        Outcome::Forward {
            port: opposite_tunnel_port(ingress),
            packet: buffer,
        }
    }

    /// Traffic the router was never supposed to see: route it to the sink
    /// port when one is wired up, else drop it.
    fn unexpected_traffic(&mut self, buffer: Vec<u8>) -> Outcome {
        if self.sink_connected {
            self.counters.sink_routed.inc();
            Outcome::Forward {
                port: ports::SINK,
                packet: buffer,
            }
        } else {
            self.counters.dropped.inc();
            Outcome::Drop
        }
    }

    pub fn tunnel_table(&self) -> &TunnelTable {
        &self.tunnel_table
    }

    pub fn tunnel_table_mut(&mut self) -> &mut TunnelTable {
        &mut self.tunnel_table
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleStore {
        &mut self.rules
    }

    pub fn counters(&self) -> &RouterCounters {
        &self.counters
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn set_udp_checksum(&mut self, enabled: bool) {
        self.bridge.set_udp_checksum(enabled);
    }

    pub fn set_unknown_dump(&mut self, enabled: bool) {
        self.bridge.set_unknown_dump(enabled);
    }
}
