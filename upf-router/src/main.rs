//! main - offline pcap replay host for the UPF router core

use anyhow::{Context, Result, anyhow, bail, ensure};
use atomic_counter::AtomicCounter;
use clap::Parser;
use pcap_parser::pcap::{self, LegacyPcapBlock, PcapHeader};
use pcap_parser::{Linktype, ToVec};
use slog::{Drain, Logger, info, o, warn};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use upf_router::{Config, DecodedPacket, Outcome, PacketContext, UpfRouter, ports, tunnels};

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture to replay, as <port>:<file.pcap> where port is the ingress
    /// port (0 = core-facing, 1 = radio-facing, 2 = VNF-facing).  May be
    /// given multiple times; files are replayed in order.
    #[arg(long = "input", required = true)]
    inputs: Vec<String>,

    /// Directory where per-port output captures (port0.pcap..port3.pcap)
    /// are written.
    #[arg(long, default_value = "out")]
    output_dir: PathBuf,

    /// File with rules to install at startup, comma- or newline-separated.
    /// `//` and `/* */` comments are skipped.
    #[arg(long)]
    rules_file: Option<PathBuf>,

    /// TOML file with subscriber tunnel bindings to preload, for replays
    /// captured without the signaling exchange.
    #[arg(long)]
    tunnels_file: Option<String>,

    /// Skip computing the outer UDP checksum when encapsulating.
    #[arg(long)]
    disable_udp_checksum: bool,

    /// Skip dumping plain IPv4 traffic that belongs to no known UE.
    #[arg(long)]
    disable_unknown_dump: bool,

    /// Treat outbound port 3 as connected and capture unexpected traffic
    /// there instead of dropping it.
    #[arg(long)]
    sink_connected: bool,
}

fn main() -> Result<()> {
    let logger = init_logging();
    let args = Args::parse();

    let initial_rules = match &args.rules_file {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read rules file {}", path.display()))?,
        ),
        None => None,
    };

    let config = Config {
        enable_udp_checksum: !args.disable_udp_checksum,
        enable_unknown_traffic_dump: !args.disable_unknown_dump,
        sink_connected: args.sink_connected,
        initial_rules,
    };
    let mut router = UpfRouter::new(config, logger.clone())?;

    if let Some(file) = &args.tunnels_file {
        for (subscriber, pair) in tunnels::load_tunnels_file(file, &logger)? {
            router.tunnel_table_mut().upsert(subscriber, pair);
        }
    }

    fs::create_dir_all(&args.output_dir)?;
    let mut outputs = PortWriters::create(&args.output_dir)?;

    for input in &args.inputs {
        let (port, path) = parse_input_spec(input)?;
        replay_file(&mut router, port, path, &mut outputs, &logger)?;
    }

    info!(logger, "{}", router.counters().dump());
    Ok(())
}

fn init_logging() -> Logger {
    // Use info level logging by default
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info") }
    }
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

fn parse_input_spec(spec: &str) -> Result<(usize, &str)> {
    let Some((port, path)) = spec.split_once(':') else {
        bail!("Input |{spec}| is not of the form <port>:<file.pcap>");
    };
    let port: usize = port
        .parse()
        .map_err(|_| anyhow!("|{port}| is not a valid ingress port"))?;
    ensure!(
        port <= ports::VNF,
        "Ingress port must be 0 (core), 1 (radio) or 2 (VNF)"
    );
    Ok((port, path))
}

fn replay_file(
    router: &mut UpfRouter,
    ingress: usize,
    path: &str,
    outputs: &mut PortWriters,
    logger: &Logger,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read capture {path}"))?;
    let (mut rest, header) = pcap::parse_pcap_header(&bytes)
        .map_err(|e| anyhow!("{path} is not a pcap capture: {e:?}"))?;
    let linktype = header.network;
    info!(
        logger,
        "Replaying {path} into port {ingress} (linktype {})", linktype.0
    );

    while !rest.is_empty() {
        let (next, block) = pcap::parse_pcap_frame(rest)
            .map_err(|e| anyhow!("Corrupt pcap record in {path}: {e:?}"))?;
        rest = next;

        let Some(ctx) = frame_to_context(linktype, block.data, ingress) else {
            router.counters().decode_errors.inc();
            warn!(logger, "Dropping undecodable packet from {path}");
            continue;
        };
        match router.classify(ctx) {
            Outcome::Forward { port, packet } => outputs.write(port, &packet)?,
            Outcome::DecapsulateToVnf { packet } => outputs.write(ports::VNF, &packet)?,
            Outcome::EncapsulateForward { port, packet } => outputs.write(port, &packet)?,
            Outcome::Drop => {}
        }
    }
    Ok(())
}

/// Turn one captured frame into a packet context.  RAW captures carry the
/// IPv4 packet directly; Ethernet captures are stripped of their link
/// header first, and frames with a non-IPv4 ethertype go straight to the
/// classifier's non-IPv4 case.
fn frame_to_context(linktype: Linktype, data: &[u8], ingress: usize) -> Option<PacketContext> {
    if linktype == Linktype::RAW {
        PacketContext::from_ipv4_buffer(data.to_vec(), ingress).ok()
    } else if linktype == Linktype::ETHERNET {
        if data.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        let ethertype = u16::from_be_bytes([data[12], data[13]]);
        if ethertype != ETHERTYPE_IPV4 {
            return Some(PacketContext {
                ingress,
                buffer: data.to_vec(),
                decoded: DecodedPacket::NonIpv4,
            });
        }
        let payload = data[ETHERNET_HEADER_LEN..].to_vec();
        PacketContext::from_ipv4_buffer(payload, ingress).ok()
    } else {
        None
    }
}

/// One legacy-pcap writer per outbound port, all RAW IPv4.
struct PortWriters {
    files: Vec<File>,
}

impl PortWriters {
    fn create(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for port in 0..=ports::SINK {
            let mut file = File::create(dir.join(format!("port{port}.pcap")))?;
            let mut header = PcapHeader {
                magic_number: 0xa1b2c3d4,
                version_major: 2,
                version_minor: 4,
                thiszone: 0,
                sigfigs: 0,
                snaplen: 65535,
                network: Linktype::RAW,
            };
            let header_bytes = header
                .to_vec()
                .map_err(|e| anyhow!("Failed to serialize pcap header: {e:?}"))?;
            file.write_all(&header_bytes)?;
            files.push(file);
        }
        Ok(PortWriters { files })
    }

    fn write(&mut self, port: usize, packet: &[u8]) -> Result<()> {
        let Some(file) = self.files.get_mut(port) else {
            return Ok(());
        };
        let mut block = LegacyPcapBlock {
            ts_sec: 0,
            ts_usec: 0,
            caplen: packet.len() as u32,
            origlen: packet.len() as u32,
            data: packet,
        };
        let block_bytes = block
            .to_vec()
            .map_err(|e| anyhow!("Failed to serialize pcap record: {e:?}"))?;
        file.write_all(&block_bytes)?;
        Ok(())
    }
}
