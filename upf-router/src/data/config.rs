/// Startup configuration of the router core.
#[derive(Debug, Clone)]
pub struct Config {
    // Compute the outer UDP checksum when encapsulating into GTPv1-U.
    pub enable_udp_checksum: bool,

    // Dump plain IPv4 traffic that belongs to no known UE.
    pub enable_unknown_traffic_dump: bool,

    // Whether outbound port 3 (unconnected-traffic sink) is wired up.
    pub sink_connected: bool,

    // Rules installed at startup, comma- or newline-separated.
    pub initial_rules: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enable_udp_checksum: true,
            enable_unknown_traffic_dump: true,
            sink_connected: false,
            initial_rules: None,
        }
    }
}
