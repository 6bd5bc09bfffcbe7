//! Stateful traffic-classification and tunnel-redirection core of a 4G UPF.

mod data;
mod management;
mod packet;
mod router;
mod rules;

pub use data::{BindingObserver, Config, LogBindings, Side, TunnelPair, TunnelTable, tunnels};
pub use management::ManagementError;
pub use packet::{
    BindingObservation, DecodeError, DecodedPacket, GtpuView, Ipv4View, PacketContext, decode_ipv4,
    is_tunnel_port, opposite_tunnel_port, ports,
};
pub use router::{
    BridgeOutput, DumpUnknown, EncapsulationBridge, Outcome, RouterCounters, UnknownSubscriberHook,
    UpfRouter,
};
pub use rules::{Rule, RuleError, RuleStore};
