//! Wire format for the mesh bridge protocol.
//!
//! Every packet begins with `version: u8`, `type: u8`, `sequence: u32 BE`,
//! followed by a kind-specific fixed-or-length-prefixed body. Integers are
//! big-endian; strings are UTF-8 and length-prefixed. See the type table
//! below for the six kinds.

use crate::instance::Instance;
use crate::packet::Packet;

pub const WIRE_VERSION: u8 = 0;
pub const HEADER_LEN: usize = 1 + 1 + 4;

pub const TYPE_HANDSHAKE: u8 = 1;
pub const TYPE_UPDATE: u8 = 2;
pub const TYPE_DATA: u8 = 3;
pub const TYPE_ACKNOWLEDGEMENT: u8 = 4;
pub const TYPE_INTERNET: u8 = 5;
pub const TYPE_INTERNET_RESPONSE: u8 = 6;

/// Outcome of attempting to decode one packet from the front of a buffer.
#[derive(Debug, PartialEq)]
pub enum DecodeOutcome {
    /// The buffer does not yet hold a full packet; unchanged, try again once
    /// more bytes have been appended.
    NeedMoreData,
    /// The type tag is not recognized by any registered decoder.
    UnknownType,
    /// A full packet was decoded; the caller should advance the buffer by
    /// the given number of bytes.
    Decoded(Packet, usize),
    /// The tag was recognized and a full frame is present, but its contents
    /// violate the encoding (bad version, invalid UTF-8, ...). The frame is
    /// still fully accounted for: the caller advances past `usize` bytes.
    Malformed(usize),
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn read_instance(b: &[u8]) -> Instance {
    let mut buf = [0u8; Instance::LEN];
    buf.copy_from_slice(&b[..Instance::LEN]);
    Instance::new(buf)
}

type BodyDecoder = fn(u8, u32, &[u8]) -> DecodeOutcome;

fn decode_handshake_body(version: u8, sequence: u32, body: &[u8]) -> DecodeOutcome {
    if body.len() < Instance::LEN {
        return DecodeOutcome::NeedMoreData;
    }
    let consumed = HEADER_LEN + Instance::LEN;
    if version != WIRE_VERSION {
        return DecodeOutcome::Malformed(consumed);
    }
    DecodeOutcome::Decoded(
        Packet::Handshake {
            sequence,
            instance: read_instance(body),
        },
        consumed,
    )
}

fn decode_update_body(version: u8, sequence: u32, body: &[u8]) -> DecodeOutcome {
    const BODY_LEN: usize = Instance::LEN + 1 + 1;
    if body.len() < BODY_LEN {
        return DecodeOutcome::NeedMoreData;
    }
    let consumed = HEADER_LEN + BODY_LEN;
    if version != WIRE_VERSION {
        return DecodeOutcome::Malformed(consumed);
    }
    let destination = read_instance(body);
    let hop_count = body[Instance::LEN];
    let internet_hop_count = body[Instance::LEN + 1];
    DecodeOutcome::Decoded(
        Packet::Update {
            sequence,
            destination,
            hop_count,
            internet_hop_count,
        },
        consumed,
    )
}

fn decode_data_body(version: u8, sequence: u32, body: &[u8]) -> DecodeOutcome {
    const FIXED_LEN: usize = Instance::LEN + Instance::LEN + 1 + 4;
    if body.len() < FIXED_LEN {
        return DecodeOutcome::NeedMoreData;
    }
    let payload_len = read_u32(&body[Instance::LEN * 2 + 1..]) as usize;
    let total = FIXED_LEN + payload_len;
    if body.len() < total {
        return DecodeOutcome::NeedMoreData;
    }
    let consumed = HEADER_LEN + total;
    if version != WIRE_VERSION {
        return DecodeOutcome::Malformed(consumed);
    }
    let origin = read_instance(body);
    let destination = read_instance(&body[Instance::LEN..]);
    let want_ack = body[Instance::LEN * 2] != 0;
    let payload = body[FIXED_LEN..total].to_vec();
    DecodeOutcome::Decoded(
        Packet::Data {
            sequence,
            origin,
            destination,
            want_ack,
            payload,
        },
        consumed,
    )
}

fn decode_acknowledgement_body(version: u8, sequence: u32, body: &[u8]) -> DecodeOutcome {
    const BODY_LEN: usize = Instance::LEN * 2;
    if body.len() < BODY_LEN {
        return DecodeOutcome::NeedMoreData;
    }
    let consumed = HEADER_LEN + BODY_LEN;
    if version != WIRE_VERSION {
        return DecodeOutcome::Malformed(consumed);
    }
    let origin = read_instance(body);
    let destination = read_instance(&body[Instance::LEN..]);
    DecodeOutcome::Decoded(
        Packet::Acknowledgement {
            sequence,
            origin,
            destination,
        },
        consumed,
    )
}

fn decode_internet_body(version: u8, sequence: u32, body: &[u8]) -> DecodeOutcome {
    const PREFIX_LEN: usize = Instance::LEN + 1 + 1 + 1;
    if body.len() < PREFIX_LEN {
        return DecodeOutcome::NeedMoreData;
    }
    let hop_count = body[Instance::LEN];
    let test_id = body[Instance::LEN + 1];
    let url_len = body[Instance::LEN + 2] as usize;
    let after_url = PREFIX_LEN + url_len;
    if body.len() < after_url + 4 {
        return DecodeOutcome::NeedMoreData;
    }
    let body_len = read_u32(&body[after_url..]) as usize;
    let total = after_url + 4 + body_len;
    if body.len() < total {
        return DecodeOutcome::NeedMoreData;
    }
    let consumed = HEADER_LEN + total;
    if version != WIRE_VERSION {
        return DecodeOutcome::Malformed(consumed);
    }
    let origin = read_instance(body);
    let url = match std::str::from_utf8(&body[PREFIX_LEN..after_url]) {
        Ok(s) => s.to_string(),
        Err(_) => return DecodeOutcome::Malformed(consumed),
    };
    let response_body = match std::str::from_utf8(&body[after_url + 4..total]) {
        Ok(s) => s.to_string(),
        Err(_) => return DecodeOutcome::Malformed(consumed),
    };
    DecodeOutcome::Decoded(
        Packet::Internet {
            sequence,
            origin,
            hop_count,
            test_id,
            url,
            body: response_body,
        },
        consumed,
    )
}

fn decode_internet_response_body(version: u8, sequence: u32, body: &[u8]) -> DecodeOutcome {
    const PREFIX_LEN: usize = Instance::LEN + 2 + 4;
    if body.len() < PREFIX_LEN {
        return DecodeOutcome::NeedMoreData;
    }
    let status = read_u16(&body[Instance::LEN..]);
    let body_len = read_u32(&body[Instance::LEN + 2..]) as usize;
    let total = PREFIX_LEN + body_len;
    if body.len() < total {
        return DecodeOutcome::NeedMoreData;
    }
    let consumed = HEADER_LEN + total;
    if version != WIRE_VERSION {
        return DecodeOutcome::Malformed(consumed);
    }
    let origin = read_instance(body);
    let response_body = match std::str::from_utf8(&body[PREFIX_LEN..total]) {
        Ok(s) => s.to_string(),
        Err(_) => return DecodeOutcome::Malformed(consumed),
    };
    DecodeOutcome::Decoded(
        Packet::InternetResponse {
            sequence,
            origin,
            status,
            body: response_body,
        },
        consumed,
    )
}

/// Registry of per-packet-kind decoders, dispatched by type tag in
/// registration order. `Codec::default()` registers all six wire kinds.
pub struct Codec {
    decoders: Vec<(u8, BodyDecoder)>,
}

impl Default for Codec {
    fn default() -> Self {
        let mut codec = Codec {
            decoders: Vec::new(),
        };
        codec.register(TYPE_HANDSHAKE, decode_handshake_body);
        codec.register(TYPE_UPDATE, decode_update_body);
        codec.register(TYPE_DATA, decode_data_body);
        codec.register(TYPE_ACKNOWLEDGEMENT, decode_acknowledgement_body);
        codec.register(TYPE_INTERNET, decode_internet_body);
        codec.register(TYPE_INTERNET_RESPONSE, decode_internet_response_body);
        codec
    }
}

impl Codec {
    pub fn register(&mut self, type_tag: u8, decoder: BodyDecoder) {
        self.decoders.push((type_tag, decoder));
    }

    /// Attempt to decode one packet from the front of `data`. Never mutates
    /// `data`; the caller is responsible for trimming consumed bytes.
    pub fn decode(&self, data: &[u8]) -> DecodeOutcome {
        if data.len() < HEADER_LEN {
            return DecodeOutcome::NeedMoreData;
        }
        let version = data[0];
        let type_tag = data[1];
        let sequence = read_u32(&data[2..6]);
        let body = &data[HEADER_LEN..];
        for (tag, decoder) in &self.decoders {
            if *tag == type_tag {
                return decoder(version, sequence, body);
            }
        }
        DecodeOutcome::UnknownType
    }

    /// Encode a packet to its wire representation. Infallible: the output is
    /// an owned, growable buffer, never a fixed-size one.
    pub fn encode(packet: &Packet) -> Vec<u8> {
        let type_tag = packet.type_tag();
        let sequence = packet.sequence();
        let mut buf = Vec::new();
        buf.push(WIRE_VERSION);
        buf.push(type_tag);
        buf.extend_from_slice(&sequence.to_be_bytes());
        match packet {
            Packet::Handshake { instance, .. } => {
                buf.extend_from_slice(instance.as_bytes());
            }
            Packet::Update {
                destination,
                hop_count,
                internet_hop_count,
                ..
            } => {
                buf.extend_from_slice(destination.as_bytes());
                buf.push(*hop_count);
                buf.push(*internet_hop_count);
            }
            Packet::Data {
                origin,
                destination,
                want_ack,
                payload,
                ..
            } => {
                buf.extend_from_slice(origin.as_bytes());
                buf.extend_from_slice(destination.as_bytes());
                buf.push(if *want_ack { 1 } else { 0 });
                buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                buf.extend_from_slice(payload);
            }
            Packet::Acknowledgement {
                origin, destination, ..
            } => {
                buf.extend_from_slice(origin.as_bytes());
                buf.extend_from_slice(destination.as_bytes());
            }
            Packet::Internet {
                origin,
                hop_count,
                test_id,
                url,
                body,
                ..
            } => {
                buf.extend_from_slice(origin.as_bytes());
                buf.push(*hop_count);
                buf.push(*test_id);
                buf.push(url.len() as u8);
                buf.extend_from_slice(url.as_bytes());
                buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
                buf.extend_from_slice(body.as_bytes());
            }
            Packet::InternetResponse {
                origin,
                status,
                body,
                ..
            } => {
                buf.extend_from_slice(origin.as_bytes());
                buf.extend_from_slice(&status.to_be_bytes());
                buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
                buf.extend_from_slice(body.as_bytes());
            }
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_instance(b0: u8) -> Instance {
        Instance::new([b0; 16])
    }

    fn all_kinds() -> Vec<Packet> {
        vec![
            Packet::Handshake {
                sequence: 1,
                instance: sample_instance(1),
            },
            Packet::Update {
                sequence: 2,
                destination: sample_instance(2),
                hop_count: 1,
                internet_hop_count: 255,
            },
            Packet::Data {
                sequence: 3,
                origin: sample_instance(3),
                destination: sample_instance(4),
                want_ack: true,
                payload: b"hello mesh".to_vec(),
            },
            Packet::Data {
                sequence: 4,
                origin: sample_instance(5),
                destination: sample_instance(6),
                want_ack: false,
                payload: Vec::new(),
            },
            Packet::Acknowledgement {
                sequence: 5,
                origin: sample_instance(7),
                destination: sample_instance(8),
            },
            Packet::Internet {
                sequence: 6,
                origin: sample_instance(9),
                hop_count: 1,
                test_id: 0,
                url: "http://example.test/path".to_string(),
                body: "{}".to_string(),
            },
            Packet::InternetResponse {
                sequence: 7,
                origin: sample_instance(10),
                status: 200,
                body: "ok".to_string(),
            },
        ]
    }

    #[test]
    fn round_trip_every_kind() {
        let codec = Codec::default();
        for packet in all_kinds() {
            let encoded = Codec::encode(&packet);
            match codec.decode(&encoded) {
                DecodeOutcome::Decoded(decoded, consumed) => {
                    assert_eq!(consumed, encoded.len());
                    assert_eq!(decoded, packet);
                }
                other => panic!("expected Decoded, got {other:?}"),
            }
        }
    }

    #[test]
    fn prefix_of_any_encoding_needs_more_data() {
        let codec = Codec::default();
        for packet in all_kinds() {
            let encoded = Codec::encode(&packet);
            for k in 0..encoded.len() {
                assert_eq!(
                    codec.decode(&encoded[..k]),
                    DecodeOutcome::NeedMoreData,
                    "packet {packet:?} truncated to {k} bytes should need more data"
                );
            }
        }
    }

    #[test]
    fn unknown_type_tag_is_reported_and_buffer_untouched() {
        let codec = Codec::default();
        let mut bytes = vec![WIRE_VERSION, 0xEE];
        bytes.extend_from_slice(&42u32.to_be_bytes());
        assert_eq!(codec.decode(&bytes), DecodeOutcome::UnknownType);
    }

    #[test]
    fn version_mismatch_is_malformed_but_fully_accounted_for() {
        let codec = Codec::default();
        let packet = Packet::Handshake {
            sequence: 9,
            instance: sample_instance(9),
        };
        let mut encoded = Codec::encode(&packet);
        encoded[0] = 1; // bump version past what this codec understands
        match codec.decode(&encoded) {
            DecodeOutcome::Malformed(consumed) => assert_eq!(consumed, encoded.len()),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn version_mismatch_does_not_block_the_next_packet() {
        let codec = Codec::default();
        let bad = {
            let mut e = Codec::encode(&Packet::Handshake {
                sequence: 1,
                instance: sample_instance(1),
            });
            e[0] = 9;
            e
        };
        let good = Codec::encode(&Packet::Handshake {
            sequence: 2,
            instance: sample_instance(2),
        });
        let mut buf = bad.clone();
        buf.extend_from_slice(&good);

        let consumed = match codec.decode(&buf) {
            DecodeOutcome::Malformed(n) => n,
            other => panic!("expected Malformed, got {other:?}"),
        };
        assert_eq!(consumed, bad.len());
        match codec.decode(&buf[consumed..]) {
            DecodeOutcome::Decoded(Packet::Handshake { sequence, .. }, n) => {
                assert_eq!(sequence, 2);
                assert_eq!(n, good.len());
            }
            other => panic!("expected Decoded, got {other:?}"),
        }
    }

    #[test]
    fn malformed_internet_payload_is_dropped_not_fatal() {
        let codec = Codec::default();
        let mut encoded = Codec::encode(&Packet::Internet {
            sequence: 1,
            origin: sample_instance(1),
            hop_count: 1,
            test_id: 0,
            url: "http://x".to_string(),
            body: "ok".to_string(),
        });
        let url_start = HEADER_LEN + Instance::LEN + 3;
        encoded[url_start] = 0xFF; // invalid utf-8 lead byte
        match codec.decode(&encoded) {
            DecodeOutcome::Malformed(consumed) => assert_eq!(consumed, encoded.len()),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }
}
