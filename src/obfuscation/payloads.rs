//! Heartbeat payload mimicry (§4.3): each kind produces a fully-formed byte
//! sequence shaped like a benign protocol frame. All field values are derived
//! from `(seed, sequence, tag)`; no real secrets leak into these buffers.
//!
//! No teacher analog — built directly to the literal layouts in
//! `SPEC_FULL.md` §4.3.

use crate::obfuscation::profile::{ObfuscationProfile, PayloadMimicKind};

impl ObfuscationProfile {
    /// Synthesizes a heartbeat payload of the configured kind.
    pub fn synth_heartbeat_payload(&self, seq: u64) -> Vec<u8> {
        match self.config.payload_mimic {
            PayloadMimicKind::Empty => Vec::new(),
            PayloadMimicKind::Timestamp => self.mimic_timestamp(seq),
            PayloadMimicKind::IotSensor => self.mimic_iot_sensor(seq),
            PayloadMimicKind::GenericTelemetry => self.mimic_generic_telemetry(seq),
            PayloadMimicKind::RandomSize => self.mimic_random_size(seq),
            PayloadMimicKind::MimicDns => self.mimic_dns(seq),
            PayloadMimicKind::MimicStun => self.mimic_stun(seq),
            PayloadMimicKind::MimicRtp => self.mimic_rtp(seq),
        }
    }

    fn derive_bytes(&self, seq: u64, tag: &str, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u64 = 0;
        while out.len() < len {
            let v = self.derive(seq, &[tag.as_bytes(), &counter.to_be_bytes()].concat());
            out.extend_from_slice(&v.to_be_bytes());
            counter += 1;
        }
        out.truncate(len);
        out
    }

    fn mimic_timestamp(&self, seq: u64) -> Vec<u8> {
        self.derive(seq, b"hb_ts").to_be_bytes().to_vec()
    }

    /// `type(1) + device_id(1) + seq16(2) + temperature(4 BE float) +
    /// humidity(4) + battery(4) + ts_offset(4) + rotating-XOR checksum(4)`.
    fn mimic_iot_sensor(&self, seq: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        buf.push(0x01); // type: sensor-report
        buf.push(self.derive(seq, b"iot_dev") as u8);
        buf.extend_from_slice(&(seq as u16).to_be_bytes());

        let temp_raw = self.derive(seq, b"iot_temp");
        let temperature = -10.0 + (temp_raw % 500) as f32 / 10.0; // -10.0..40.0 C
        buf.extend_from_slice(&temperature.to_be_bytes());

        let humidity_raw = self.derive(seq, b"iot_humid");
        let humidity = (humidity_raw % 1000) as f32 / 10.0; // 0.0..100.0 %
        buf.extend_from_slice(&humidity.to_be_bytes());

        let battery_raw = self.derive(seq, b"iot_batt");
        let battery = (battery_raw % 1000) as f32 / 10.0;
        buf.extend_from_slice(&battery.to_be_bytes());

        let ts_offset = self.derive(seq, b"iot_ts") as u32;
        buf.extend_from_slice(&ts_offset.to_be_bytes());

        let mut checksum: u32 = 0;
        for (i, b) in buf.iter().enumerate() {
            checksum = checksum.rotate_left(1) ^ (*b as u32) ^ (i as u32);
        }
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf
    }

    /// `magic "TELM"(4) + version(2) + length(2) + seq(8) + ts(8)`.
    fn mimic_generic_telemetry(&self, seq: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        buf.extend_from_slice(b"TELM");
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&16u16.to_be_bytes()); // seq(8) + ts(8)
        buf.extend_from_slice(&seq.to_be_bytes());
        let ts = self.derive(seq, b"telm_ts");
        buf.extend_from_slice(&ts.to_be_bytes());
        buf
    }

    fn mimic_random_size(&self, seq: u64) -> Vec<u8> {
        let len = 8 + (self.derive(seq, b"rand_len") % 193) as usize; // 8..=200
        self.derive_bytes(seq, "rand_content", len)
    }

    /// RFC 1035 response skeleton: 12 B header + one question for
    /// "example.com." A IN + one answer (A IN) with a compressed name
    /// pointer, TTL and RDATA from seed.
    fn mimic_dns(&self, seq: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(40);
        let id = self.derive(seq, b"dns_id") as u16;
        buf.extend_from_slice(&id.to_be_bytes());
        buf.extend_from_slice(&0x8180u16.to_be_bytes()); // standard response, no error
        buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
        buf.extend_from_slice(&1u16.to_be_bytes()); // ancount
        buf.extend_from_slice(&0u16.to_be_bytes()); // nscount
        buf.extend_from_slice(&0u16.to_be_bytes()); // arcount

        // Question: example.com.
        let qname_start = buf.len();
        for label in ["example", "com"] {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0); // root label
        buf.extend_from_slice(&1u16.to_be_bytes()); // QTYPE A
        buf.extend_from_slice(&1u16.to_be_bytes()); // QCLASS IN

        // Answer: compressed name pointer back to the question's qname.
        buf.extend_from_slice(&(0xC000u16 | qname_start as u16).to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
        buf.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
        let ttl = (self.derive(seq, b"dns_ttl") % 3600) as u32 + 60;
        buf.extend_from_slice(&ttl.to_be_bytes());
        buf.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
        let ip_bytes = self.derive_bytes(seq, "dns_rdata", 4);
        buf.extend_from_slice(&ip_bytes);
        buf
    }

    /// RFC 5389 Binding Response: 20 B header with magic cookie
    /// `0x2112A442` and an XOR-MAPPED-ADDRESS attribute.
    fn mimic_stun(&self, seq: u64) -> Vec<u8> {
        const MAGIC_COOKIE: u32 = 0x2112_A442;
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(&0x0101u16.to_be_bytes()); // Binding Success Response
        buf.extend_from_slice(&0u16.to_be_bytes()); // message length, patched below
        buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        let transaction_id = self.derive_bytes(seq, "stun_txid", 12);
        buf.extend_from_slice(&transaction_id);

        // XOR-MAPPED-ADDRESS attribute.
        let port = (self.derive(seq, b"stun_port") % 60000 + 1024) as u16;
        let xport = port ^ ((MAGIC_COOKIE >> 16) as u16);
        let addr = self.derive_bytes(seq, "stun_addr", 4);
        let cookie_bytes = MAGIC_COOKIE.to_be_bytes();
        let xaddr: Vec<u8> = addr.iter().zip(cookie_bytes.iter()).map(|(a, c)| a ^ c).collect();

        buf.extend_from_slice(&0x0020u16.to_be_bytes()); // XOR-MAPPED-ADDRESS type
        buf.extend_from_slice(&8u16.to_be_bytes()); // attribute length
        buf.push(0); // reserved
        buf.push(0x01); // family: IPv4
        buf.extend_from_slice(&xport.to_be_bytes());
        buf.extend_from_slice(&xaddr);

        let msg_len = (buf.len() - 20) as u16;
        buf[2..4].copy_from_slice(&msg_len.to_be_bytes());
        buf
    }

    /// 12 B RTP header: `V=2,P=0,X=0,CC=0,M=0,PT=96, seq, timestamp, SSRC`.
    fn mimic_rtp(&self, seq: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.push(0b1000_0000); // V=2, P=0, X=0, CC=0
        buf.push(96); // M=0, PT=96 (dynamic)
        buf.extend_from_slice(&(seq as u16).to_be_bytes());
        let ts = self.derive(seq, b"rtp_ts") as u32;
        buf.extend_from_slice(&ts.to_be_bytes());
        let ssrc = self.derive(seq, b"rtp_ssrc") as u32;
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::profile::ObfuscationConfig;

    fn profile_with(kind: PayloadMimicKind) -> ObfuscationProfile {
        let mut cfg = ObfuscationConfig::default();
        cfg.payload_mimic = kind;
        ObfuscationProfile::new([4u8; 32], cfg)
    }

    #[test]
    fn empty_is_zero_length() {
        assert!(profile_with(PayloadMimicKind::Empty)
            .synth_heartbeat_payload(1)
            .is_empty());
    }

    #[test]
    fn iot_sensor_has_expected_length() {
        assert_eq!(
            profile_with(PayloadMimicKind::IotSensor)
                .synth_heartbeat_payload(1)
                .len(),
            24
        );
    }

    #[test]
    fn generic_telemetry_has_magic_prefix() {
        let buf = profile_with(PayloadMimicKind::GenericTelemetry).synth_heartbeat_payload(1);
        assert_eq!(&buf[0..4], b"TELM");
    }

    #[test]
    fn mimic_dns_has_correct_counts() {
        let buf = profile_with(PayloadMimicKind::MimicDns).synth_heartbeat_payload(1);
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), 1); // qdcount
        assert_eq!(u16::from_be_bytes([buf[6], buf[7]]), 1); // ancount
    }

    #[test]
    fn mimic_stun_has_magic_cookie() {
        let buf = profile_with(PayloadMimicKind::MimicStun).synth_heartbeat_payload(1);
        assert_eq!(u32::from_be_bytes(buf[4..8].try_into().unwrap()), 0x2112_A442);
    }

    #[test]
    fn mimic_rtp_has_version_2() {
        let buf = profile_with(PayloadMimicKind::MimicRtp).synth_heartbeat_payload(1);
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf.len(), 12);
    }
}
