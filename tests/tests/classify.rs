use gtpv1u::GtpTeid;
use hex_literal::hex;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::udp::UdpPacket;
use std::net::Ipv4Addr;
use upf_router::{
    BindingObservation, BridgeOutput, Config, DecodedPacket, DumpUnknown, EncapsulationBridge,
    LogBindings, Outcome, Side, TunnelTable, UnknownSubscriberHook, UpfRouter, ports,
};
use upf_router_tests::framework::*;

const DN_ADDR: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

#[test]
fn decapsulates_matching_subscriber_traffic_to_vnf() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);
    router.handle_write("rule-append", "src 45.45.0.10")?;

    let inner = build_udp_ipv4(UE_ADDR, DN_ADDR, 1111, 53, b"x");
    let tunnel = build_gtp_packet(ENB_ADDR, EPC_ADDR, RADIO_TEID, &inner);
    let outcome = router.classify(make_ctx(tunnel, ports::RADIO));

    // Exactly one output: the inner packet, byte for byte, on the VNF port.
    let Outcome::DecapsulateToVnf { packet } = outcome else {
        panic!("expected decapsulation, got {outcome:?}");
    };
    assert_eq!(packet, inner);

    // The stored radio-side id is left unchanged.
    let binding = *router.tunnel_table().lookup(UE_ADDR).unwrap();
    assert_eq!(binding.radio.teid.as_u32(), RADIO_TEID);
    Ok(())
}

#[test]
fn passes_tunnel_traffic_through_when_no_rule_matches() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);

    let inner = build_udp_ipv4(UE_ADDR, DN_ADDR, 1111, 53, b"x");
    let tunnel = build_gtp_packet(ENB_ADDR, EPC_ADDR, CORE_TEID, &inner);
    let outcome = router.classify(make_ctx(tunnel.clone(), ports::RADIO));

    // Empty rule store: forwarded byte-identical to the opposite tunnel port.
    let Outcome::Forward { port, packet } = outcome else {
        panic!("expected pass-through, got {outcome:?}");
    };
    assert_eq!(port, ports::CORE);
    assert_eq!(packet, tunnel);
    Ok(())
}

#[test]
fn passes_unknown_subscriber_tunnel_traffic_through() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    router.handle_write("rule-append", "any")?;

    // No binding installed, so even a matching rule must not divert.
    let inner = build_udp_ipv4(UE_ADDR, DN_ADDR, 1111, 53, b"x");
    let tunnel = build_gtp_packet(EPC_ADDR, ENB_ADDR, RADIO_TEID, &inner);
    let outcome = router.classify(make_ctx(tunnel.clone(), ports::CORE));

    let Outcome::Forward { port, packet } = outcome else {
        panic!("expected pass-through, got {outcome:?}");
    };
    assert_eq!(port, ports::RADIO);
    assert_eq!(packet, tunnel);
    Ok(())
}

#[test]
fn decapsulates_downlink_traffic_by_inner_destination() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);
    router.handle_write("rule-append", "dst 45.45.0.10")?;

    let inner = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"answer");
    let tunnel = build_gtp_packet(EPC_ADDR, ENB_ADDR, RADIO_TEID, &inner);
    let outcome = router.classify(make_ctx(tunnel, ports::CORE));

    let Outcome::DecapsulateToVnf { packet } = outcome else {
        panic!("expected decapsulation, got {outcome:?}");
    };
    assert_eq!(packet, inner);

    // The observed TEID matches the stored radio-side id, so nothing moved.
    let binding = *router.tunnel_table().lookup(UE_ADDR).unwrap();
    assert_eq!(binding.radio.teid.as_u32(), RADIO_TEID);
    assert_eq!(binding.core.teid.as_u32(), CORE_TEID);
    Ok(())
}

#[test]
fn repairs_core_side_teid_drift_on_uplink() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);

    let inner = build_udp_ipv4(UE_ADDR, DN_ADDR, 1111, 53, b"x");
    let tunnel = build_gtp_packet(ENB_ADDR, EPC_ADDR, 0x00ab0001, &inner);
    let outcome = router.classify(make_ctx(tunnel, ports::RADIO));
    assert!(matches!(outcome, Outcome::Forward { .. }));

    // Repair happens whether or not a rule diverted the packet.
    let binding = *router.tunnel_table().lookup(UE_ADDR).unwrap();
    assert_eq!(binding.core.teid.as_u32(), 0x00ab0001);
    assert_eq!(binding.radio.teid.as_u32(), RADIO_TEID);
    Ok(())
}

#[test]
fn repairs_radio_side_teid_drift_on_downlink() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);

    let inner = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"x");
    let tunnel = build_gtp_packet(EPC_ADDR, ENB_ADDR, 0x00cd0002, &inner);
    router.classify(make_ctx(tunnel, ports::CORE));

    let binding = *router.tunnel_table().lookup(UE_ADDR).unwrap();
    assert_eq!(binding.radio.teid.as_u32(), 0x00cd0002);
    assert_eq!(binding.core.teid.as_u32(), CORE_TEID);
    Ok(())
}

#[test]
fn encapsulates_vnf_response_toward_the_subscriber() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);

    let response = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"answer");
    let outcome = router.classify(make_ctx(response.clone(), ports::VNF));

    // Downlink: tunneled to the eNodeB with the stored radio-side TEID.
    let Outcome::EncapsulateForward { port, packet } = outcome else {
        panic!("expected encapsulation, got {outcome:?}");
    };
    assert_eq!(port, ports::RADIO);

    let outer = Ipv4Packet::new(&packet).unwrap();
    assert_eq!(outer.get_source(), EPC_ADDR);
    assert_eq!(outer.get_destination(), ENB_ADDR);
    // G-PDU header: flags, message type, payload length, radio-side TEID.
    assert_eq!(packet[28..36], hex!("30 ff 0022 00ee0003"));
    assert_eq!(packet[36..], response);

    // The outer UDP checksum is present and correct by default.
    let udp = UdpPacket::new(&packet[20..]).unwrap();
    let expected = pnet_packet::udp::ipv4_checksum(&udp, &EPC_ADDR, &ENB_ADDR);
    assert_eq!(udp.get_checksum(), expected);
    assert_ne!(udp.get_checksum(), 0);
    Ok(())
}

#[test]
fn encapsulates_subscriber_sourced_traffic_toward_the_core() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);

    let forwarded = build_udp_ipv4(UE_ADDR, DN_ADDR, 1111, 53, b"x");
    let outcome = router.classify(make_ctx(forwarded.clone(), ports::VNF));

    // Uplink continuation: tunneled to the EPC with the core-side TEID.
    let Outcome::EncapsulateForward { port, packet } = outcome else {
        panic!("expected encapsulation, got {outcome:?}");
    };
    assert_eq!(port, ports::CORE);

    let outer = Ipv4Packet::new(&packet).unwrap();
    assert_eq!(outer.get_source(), ENB_ADDR);
    assert_eq!(outer.get_destination(), EPC_ADDR);
    assert_eq!(packet[32..36], CORE_TEID.to_be_bytes());
    assert_eq!(packet[36..], forwarded);
    Ok(())
}

#[test]
fn checksum_mode_toggle_controls_the_outer_udp_checksum() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);
    router.handle_write("set-checksum-mode", "false")?;

    let response = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"x");
    let Outcome::EncapsulateForward { packet, .. } =
        router.classify(make_ctx(response, ports::VNF))
    else {
        panic!("expected encapsulation");
    };
    assert_eq!(packet[26..28], [0, 0]);
    Ok(())
}

#[test]
fn forwards_plain_inter_node_traffic_between_tunnel_ports() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;

    // Not GTP-U, no subscriber involved: plain traffic between nodes.
    let packet = build_udp_ipv4(EPC_ADDR, ENB_ADDR, 36412, 36412, b"keepalive");
    let outcome = router.classify(make_ctx(packet.clone(), ports::CORE));

    let Outcome::Forward { port, packet: out } = outcome else {
        panic!("expected forward, got {outcome:?}");
    };
    assert_eq!(port, ports::RADIO);
    assert_eq!(out, packet);
    Ok(())
}

#[test]
fn drops_unknown_plain_traffic_from_the_vnf_port() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;

    let packet = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"x");
    let outcome = router.classify(make_ctx(packet, ports::VNF));
    assert!(matches!(outcome, Outcome::Drop));
    Ok(())
}

#[test]
fn routes_unknown_plain_traffic_to_the_sink_when_connected() -> anyhow::Result<()> {
    let config = Config {
        sink_connected: true,
        ..Config::default()
    };
    let (mut router, _logger) = init_with_config(config)?;

    let packet = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"x");
    let outcome = router.classify(make_ctx(packet.clone(), ports::VNF));

    let Outcome::Forward { port, packet: out } = outcome else {
        panic!("expected sink routing, got {outcome:?}");
    };
    assert_eq!(port, ports::SINK);
    assert_eq!(out, packet);
    Ok(())
}

#[test]
fn drops_non_ipv4_traffic() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;

    // An IPv6 version nibble.
    let outcome = router.classify(make_ctx(vec![0x60, 0, 0, 0], ports::RADIO));
    assert!(matches!(outcome, Outcome::Drop));
    Ok(())
}

#[test]
fn routes_non_ipv4_traffic_to_the_sink_when_connected() -> anyhow::Result<()> {
    let config = Config {
        sink_connected: true,
        ..Config::default()
    };
    let (mut router, _logger) = init_with_config(config)?;

    let frame = vec![0x60, 0, 0, 0];
    let outcome = router.classify(make_ctx(frame.clone(), ports::RADIO));

    let Outcome::Forward { port, packet } = outcome else {
        panic!("expected sink routing, got {outcome:?}");
    };
    assert_eq!(port, ports::SINK);
    assert_eq!(packet, frame);
    Ok(())
}

#[test]
fn learns_bindings_from_signaling_and_forwards_the_signaling_packet() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;

    // The external signaling decoder attaches its discoveries to the
    // decoded view; the packet itself is residual common traffic.
    let signaling_packet = build_udp_ipv4(ENB_ADDR, EPC_ADDR, 36412, 36412, b"setup");
    let mut ctx = make_ctx(signaling_packet.clone(), ports::RADIO);
    let DecodedPacket::Ipv4 { signaling, .. } = &mut ctx.decoded else {
        panic!("expected IPv4");
    };
    signaling.push(BindingObservation {
        subscriber: UE_ADDR,
        tunnels: test_binding(),
    });

    let outcome = router.classify(ctx);
    let Outcome::Forward { port, packet } = outcome else {
        panic!("expected forward, got {outcome:?}");
    };
    assert_eq!(port, ports::CORE);
    assert_eq!(packet, signaling_packet);

    // The learned binding immediately serves encapsulation.
    let response = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"x");
    let outcome = router.classify(make_ctx(response, ports::VNF));
    assert!(matches!(
        outcome,
        Outcome::EncapsulateForward {
            port: ports::RADIO,
            ..
        }
    ));
    Ok(())
}

#[test]
fn bridge_output_is_retrievable_exactly_once() -> anyhow::Result<()> {
    let (_, logger) = init()?;
    let mut bridge = EncapsulationBridge::new(true, Box::new(DumpUnknown::new(false, logger.clone())));
    let table = TunnelTable::new(logger);

    let packet = build_udp_ipv4(DN_ADDR, UE_ADDR, 53, 1111, b"x");
    let ctx = make_ctx(packet.clone(), ports::VNF);
    let DecodedPacket::Ipv4 { outer, .. } = &ctx.decoded else {
        panic!("expected IPv4");
    };

    bridge.consume_ipv4(outer, &packet, &table);
    assert!(matches!(
        bridge.take_last_output(),
        Some(BridgeOutput::Unknown)
    ));
    assert!(bridge.take_last_output().is_none());
    Ok(())
}

struct Swallow;
impl UnknownSubscriberHook for Swallow {
    fn on_unknown(&mut self, _ipv4_packet: &[u8]) -> bool {
        false
    }
}

#[test]
fn consuming_unknown_hook_suppresses_default_handling() -> anyhow::Result<()> {
    let (_, logger) = init()?;
    let mut router = UpfRouter::with_hooks(
        Config::default(),
        Box::new(LogBindings::new(logger.clone())),
        Box::new(Swallow),
        logger,
    )?;

    // Unknown plain traffic on a tunnel port would normally be forwarded;
    // a hook that reports the packet handled turns that into a drop.
    let packet = build_udp_ipv4(EPC_ADDR, ENB_ADDR, 36412, 36412, b"x");
    let outcome = router.classify(make_ctx(packet, ports::CORE));
    assert!(matches!(outcome, Outcome::Drop));
    Ok(())
}

#[test]
fn teid_repair_counts_and_side_accessors_agree() -> anyhow::Result<()> {
    let (mut router, _logger) = init()?;
    bind_test_ue(&mut router);

    router
        .tunnel_table_mut()
        .update_tunnel_id(UE_ADDR, Side::Core, GtpTeid::from(0x13));
    let binding = *router.tunnel_table().lookup(UE_ADDR).unwrap();
    assert_eq!(binding.endpoint(Side::Core).teid.as_u32(), 0x13);
    assert_eq!(binding.endpoint(Side::Radio).teid.as_u32(), RADIO_TEID);
    Ok(())
}
