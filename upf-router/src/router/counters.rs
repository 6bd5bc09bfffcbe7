use atomic_counter::{AtomicCounter, RelaxedCounter};

/// Per-case packet counters, dumped through the management surface.
pub struct RouterCounters {
    pub rx_packets: RelaxedCounter,
    pub decapsulated: RelaxedCounter,
    pub encapsulated: RelaxedCounter,
    pub tunnel_passthrough: RelaxedCounter,
    pub common_forwarded: RelaxedCounter,
    pub teid_repairs: RelaxedCounter,
    pub non_ipv4: RelaxedCounter,
    pub sink_routed: RelaxedCounter,
    pub dropped: RelaxedCounter,
    pub decode_errors: RelaxedCounter,
}

impl RouterCounters {
    pub fn new() -> Self {
        RouterCounters {
            rx_packets: RelaxedCounter::new(0),
            decapsulated: RelaxedCounter::new(0),
            encapsulated: RelaxedCounter::new(0),
            tunnel_passthrough: RelaxedCounter::new(0),
            common_forwarded: RelaxedCounter::new(0),
            teid_repairs: RelaxedCounter::new(0),
            non_ipv4: RelaxedCounter::new(0),
            sink_routed: RelaxedCounter::new(0),
            dropped: RelaxedCounter::new(0),
            decode_errors: RelaxedCounter::new(0),
        }
    }

    pub fn dump(&self) -> String {
        format!(
            "rx={} decap={} encap={} passthrough={} common={} teid_repairs={} \
             non_ipv4={} sink={} dropped={} decode_errors={}\n",
            self.rx_packets.get(),
            self.decapsulated.get(),
            self.encapsulated.get(),
            self.tunnel_passthrough.get(),
            self.common_forwarded.get(),
            self.teid_repairs.get(),
            self.non_ipv4.get(),
            self.sink_routed.get(),
            self.dropped.get(),
            self.decode_errors.get(),
        )
    }
}

impl Default for RouterCounters {
    fn default() -> Self {
        Self::new()
    }
}
