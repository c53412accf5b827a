//! Packet attribute extraction and text rendering.
//!
//! Decodes an Ethernet frame just deep enough to produce the indexable
//! attribute tuple: MACs, IPs, ports and the IP protocol number. Fields are
//! absent when the corresponding layer is absent. Also renders the layer
//! summary and the verbose hex dump served on `show_all` queries.

use std::fmt::Write as _;
use std::net::IpAddr;

use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice,
};

/// EtherType values we descend into.
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_ICMPV6: u8 = 58;

/// The parsed attribute tuple of one packet.
///
/// Ports are present only for TCP and UDP; IPs and the protocol number only
/// when a network layer is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMeta {
    pub ip_version: Option<u8>,
    pub src_mac: Option<[u8; 6]>,
    pub dst_mac: Option<[u8; 6]>,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub proto: Option<u8>,
}

impl PacketMeta {
    /// Symbolic name of the IP protocol, when it is one we know.
    pub fn proto_name(&self) -> &'static str {
        match self.proto {
            Some(IP_PROTO_TCP) => "TCP",
            Some(IP_PROTO_UDP) => "UDP",
            Some(IP_PROTO_ICMP) => "ICMP",
            Some(IP_PROTO_ICMPV6) => "ICMPv6",
            _ => "",
        }
    }
}

/// Map a query protocol name to its IP protocol number.
pub fn proto_number(name: &str) -> Option<u8> {
    match name.to_ascii_lowercase().as_str() {
        "tcp" => Some(IP_PROTO_TCP),
        "udp" => Some(IP_PROTO_UDP),
        "icmp" => Some(IP_PROTO_ICMP),
        "icmp6" => Some(IP_PROTO_ICMPV6),
        _ => None,
    }
}

/// Parse a colon- or dash-separated MAC address string.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(|c| c == ':' || c == '-');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Format 6 bytes as a colon-separated hex MAC address string.
pub fn format_mac(b: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    )
}

/// Extract the attribute tuple from an Ethernet frame.
///
/// Uses zero-copy header slices; any layer that fails to parse simply leaves
/// its fields unset. IPv6 extension header chains are not walked.
pub fn extract(data: &[u8]) -> PacketMeta {
    let mut meta = PacketMeta::default();

    let eth = match Ethernet2HeaderSlice::from_slice(data) {
        Ok(eth) => eth,
        Err(_) => return meta,
    };
    meta.src_mac = Some(eth.source());
    meta.dst_mac = Some(eth.destination());

    let payload = &data[eth.slice().len()..];
    match eth.ether_type().0 {
        ETHERTYPE_IPV4 => {
            if let Ok(ipv4) = Ipv4HeaderSlice::from_slice(payload) {
                meta.ip_version = Some(4);
                meta.src_ip = Some(IpAddr::V4(ipv4.source_addr()));
                meta.dst_ip = Some(IpAddr::V4(ipv4.destination_addr()));
                meta.proto = Some(ipv4.protocol().0);
                extract_ports(&mut meta, &payload[ipv4.slice().len()..]);
            }
        }
        ETHERTYPE_IPV6 => {
            if let Ok(ipv6) = Ipv6HeaderSlice::from_slice(payload) {
                meta.ip_version = Some(6);
                meta.src_ip = Some(IpAddr::V6(ipv6.source_addr()));
                meta.dst_ip = Some(IpAddr::V6(ipv6.destination_addr()));
                meta.proto = Some(ipv6.next_header().0);
                extract_ports(&mut meta, &payload[ipv6.slice().len()..]);
            }
        }
        _ => {}
    }

    meta
}

fn extract_ports(meta: &mut PacketMeta, transport: &[u8]) {
    match meta.proto {
        Some(IP_PROTO_TCP) => {
            if let Ok(tcp) = TcpHeaderSlice::from_slice(transport) {
                meta.src_port = Some(tcp.source_port());
                meta.dst_port = Some(tcp.destination_port());
            }
        }
        Some(IP_PROTO_UDP) => {
            if let Ok(udp) = UdpHeaderSlice::from_slice(transport) {
                meta.src_port = Some(udp.source_port());
                meta.dst_port = Some(udp.destination_port());
            }
        }
        _ => {}
    }
}

/// One line per decoded layer; the plain-text form of a `show_all` response.
pub fn render(meta: &PacketMeta, data: &[u8]) -> String {
    let mut out = String::new();
    if let (Some(src), Some(dst)) = (&meta.src_mac, &meta.dst_mac) {
        let _ = writeln!(out, "Ethernet: {} > {}", format_mac(src), format_mac(dst));
    }
    if let (Some(src), Some(dst)) = (meta.src_ip, meta.dst_ip) {
        let _ = writeln!(
            out,
            "IPv{}: {} > {} proto {}",
            meta.ip_version.unwrap_or(4),
            src,
            dst,
            meta.proto.unwrap_or(0)
        );
    }
    if let (Some(src), Some(dst)) = (meta.src_port, meta.dst_port) {
        let _ = writeln!(out, "{}: {} > {}", meta.proto_name(), src, dst);
    } else if !meta.proto_name().is_empty() {
        let _ = writeln!(out, "{}", meta.proto_name());
    }
    let _ = writeln!(out, "{} bytes", data.len());
    out
}

/// The verbose multiline form: layer summary plus a hex/ASCII dump.
pub fn dump(meta: &PacketMeta, data: &[u8]) -> String {
    let mut out = render(meta, data);
    for (i, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x} ", i * 16);
        for j in 0..16 {
            match chunk.get(j) {
                Some(b) => {
                    let _ = write!(out, " {b:02x}");
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        for b in chunk {
            out.push(if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            });
        }
        out.push_str("|\n");
    }
    out
}

pub mod test_utils {
    //! Hand-built Ethernet frames shared by unit and integration tests.

    /// Ethernet/IPv4/UDP frame.
    pub fn udp_frame(
        src_ip: [u8; 4],
        dst_ip: [u8; 4],
        src_port: u16,
        dst_port: u16,
        payload_len: usize,
    ) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]); // dst MAC
        packet.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // src MAC
        packet.extend_from_slice(&[0x08, 0x00]); // ethertype: IPv4

        let total_len = (20 + 8 + payload_len) as u16;
        packet.push(0x45);
        packet.push(0x00);
        packet.extend_from_slice(&total_len.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x01]); // identification
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.push(0x40); // TTL
        packet.push(17); // protocol: UDP
        packet.extend_from_slice(&[0x00, 0x00]); // checksum
        packet.extend_from_slice(&src_ip);
        packet.extend_from_slice(&dst_ip);

        packet.extend_from_slice(&src_port.to_be_bytes());
        packet.extend_from_slice(&dst_port.to_be_bytes());
        packet.extend_from_slice(&((8 + payload_len) as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]); // checksum
        packet.resize(packet.len() + payload_len, 0);
        packet
    }

    /// Ethernet/IPv4/TCP SYN frame.
    pub fn tcp_frame(src_ip: [u8; 4], dst_ip: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]); // dst MAC
        packet.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // src MAC
        packet.extend_from_slice(&[0x08, 0x00]);

        packet.push(0x45);
        packet.push(0x00);
        packet.extend_from_slice(&40u16.to_be_bytes()); // total length
        packet.extend_from_slice(&[0x00, 0x01]);
        packet.extend_from_slice(&[0x40, 0x00]); // don't fragment
        packet.push(0x40);
        packet.push(6); // protocol: TCP
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&src_ip);
        packet.extend_from_slice(&dst_ip);

        packet.extend_from_slice(&src_port.to_be_bytes());
        packet.extend_from_slice(&dst_port.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]); // seq
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // ack
        packet.push(0x50); // data offset: 5
        packet.push(0x02); // flags: SYN
        packet.extend_from_slice(&[0xff, 0xff]); // window
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&[0x00, 0x00]);
        packet
    }

    /// Ethernet/IPv4/ICMP echo request frame.
    pub fn icmp_frame(src_ip: [u8; 4], dst_ip: [u8; 4]) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        packet.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        packet.extend_from_slice(&[0x08, 0x00]);

        packet.push(0x45);
        packet.push(0x00);
        packet.extend_from_slice(&28u16.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x02]);
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.push(0x40);
        packet.push(1); // protocol: ICMP
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&src_ip);
        packet.extend_from_slice(&dst_ip);

        packet.extend_from_slice(&[0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01]); // echo request
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_udp_tuple() {
        let frame = test_utils::udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 53, 55000, 4);
        let meta = extract(&frame);
        assert_eq!(meta.ip_version, Some(4));
        assert_eq!(meta.src_ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(meta.dst_ip, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(meta.src_port, Some(53));
        assert_eq!(meta.dst_port, Some(55000));
        assert_eq!(meta.proto, Some(IP_PROTO_UDP));
        assert_eq!(meta.src_mac, Some([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(meta.proto_name(), "UDP");
    }

    #[test]
    fn extract_icmp_has_no_ports() {
        let frame = test_utils::icmp_frame([10, 0, 0, 2], [10, 0, 0, 1]);
        let meta = extract(&frame);
        assert_eq!(meta.proto, Some(IP_PROTO_ICMP));
        assert_eq!(meta.src_port, None);
        assert_eq!(meta.dst_port, None);
    }

    #[test]
    fn extract_non_ip_leaves_network_unset() {
        // ARP ethertype; no network layer extracted.
        let mut frame = test_utils::tcp_frame([1, 1, 1, 1], [2, 2, 2, 2], 1, 2);
        frame[12] = 0x08;
        frame[13] = 0x06;
        let meta = extract(&frame);
        assert!(meta.src_mac.is_some());
        assert_eq!(meta.src_ip, None);
        assert_eq!(meta.proto, None);
    }

    #[test]
    fn extract_truncated_frame() {
        let meta = extract(&[0xaa, 0xbb]);
        assert_eq!(meta, PacketMeta::default());
    }

    #[test]
    fn mac_string_round_trip() {
        let mac = [0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03];
        assert_eq!(parse_mac(&format_mac(&mac)), Some(mac));
        assert_eq!(parse_mac("aa-bb-cc-01-02-03"), Some(mac));
        assert_eq!(parse_mac("aa:bb"), None);
        assert_eq!(parse_mac("zz:bb:cc:01:02:03"), None);
    }

    #[test]
    fn proto_names() {
        assert_eq!(proto_number("tcp"), Some(6));
        assert_eq!(proto_number("UDP"), Some(17));
        assert_eq!(proto_number("icmp"), Some(1));
        assert_eq!(proto_number("icmp6"), Some(58));
        assert_eq!(proto_number("gre"), None);
    }

    #[test]
    fn dump_contains_hex_and_layers() {
        let frame = test_utils::udp_frame([10, 0, 0, 1], [8, 8, 8, 8], 49152, 53, 8);
        let meta = extract(&frame);
        let text = dump(&meta, &frame);
        assert!(text.contains("UDP: 49152 > 53"));
        assert!(text.contains("00000000 "));
    }
}
