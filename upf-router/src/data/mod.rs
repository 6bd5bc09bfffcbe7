mod config;
mod tunnel_table;
pub mod tunnels;

pub use config::Config;
pub use tunnel_table::{BindingObserver, LogBindings, Side, TunnelPair, TunnelTable};
