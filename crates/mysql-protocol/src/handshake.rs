//! Connection phase packets.
//!
//! The server opens with [`HandshakeV10`]. The client answers with an
//! optional [`SslRequest`] (then upgrades the socket) followed by a
//! [`HandshakeResponse`]. The server may then ask for a different auth
//! plugin with an [`AuthSwitchRequest`] or send plugin-specific
//! [`AuthMoreData`] before the final OK or ERR.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    lenenc_int_len, read_fixed, read_lenenc_bytes, read_lenenc_int, read_lenenc_string,
    read_null_terminated_bytes, read_null_terminated_string, read_u8, read_u16, read_u32,
    write_lenenc_bytes, write_lenenc_int, write_lenenc_str, write_null_terminated,
};
use crate::error::ProtocolError;
use crate::flags::{CapabilityFlags, StatusFlags};

/// Protocol version byte of the v10 handshake.
pub const PROTOCOL_VERSION_10: u8 = 0x0A;

/// Leading byte of an auth switch request.
pub const AUTH_SWITCH_HEADER: u8 = 0xFE;

/// Leading byte of an auth more-data packet.
pub const AUTH_MORE_DATA_HEADER: u8 = 0x01;

/// Size of the SSLRequest payload.
pub const SSL_REQUEST_SIZE: usize = 32;

const RESERVED_FILLER: [u8; 23] = [0; 23];

/// Initial handshake packet (protocol version 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeV10 {
    /// Server version string, e.g. `8.0.36`.
    pub server_version: String,
    /// Server-side connection (thread) id.
    pub connection_id: u32,
    /// Authentication seed (scramble), without the trailing NUL.
    pub auth_seed: Bytes,
    /// Server capabilities.
    pub capabilities: CapabilityFlags,
    /// Server default collation id.
    pub charset: u8,
    /// Server status.
    pub status: StatusFlags,
    /// Default authentication plugin.
    pub auth_plugin: Option<String>,
}

impl HandshakeV10 {
    /// Decode the initial handshake payload.
    ///
    /// The caller handles a leading `0xFF` (the server refusing the
    /// connection) before calling this.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let version = read_u8(src)?;
        if version != PROTOCOL_VERSION_10 {
            return Err(ProtocolError::UnsupportedProtocolVersion(version));
        }
        let server_version = read_null_terminated_string(src)?;
        let connection_id = read_u32(src)?;
        let seed_part1 = read_fixed(src, 8)?;
        let _filler = read_u8(src)?;
        let caps_lower = read_u16(src)?;

        // Pre-4.1 servers may stop here.
        if !src.has_remaining() {
            return Ok(Self {
                server_version,
                connection_id,
                auth_seed: seed_part1,
                capabilities: CapabilityFlags::from_bits_retain(u32::from(caps_lower)),
                charset: 0,
                status: StatusFlags::empty(),
                auth_plugin: None,
            });
        }

        let charset = read_u8(src)?;
        let status = StatusFlags::from_bits_retain(read_u16(src)?);
        let caps_upper = read_u16(src)?;
        let capabilities =
            CapabilityFlags::from_bits_retain(u32::from(caps_lower) | (u32::from(caps_upper) << 16));
        let auth_len = read_u8(src)?;
        let _reserved = read_fixed(src, 10)?;

        let mut seed = BytesMut::with_capacity(21);
        seed.extend_from_slice(&seed_part1);
        if capabilities.contains(CapabilityFlags::SECURE_CONNECTION) {
            let part2_len = usize::from(auth_len).saturating_sub(8).max(13);
            let part2 = read_fixed(src, part2_len.min(src.remaining()))?;
            seed.extend_from_slice(&part2);
        }
        // The seed length counts its NUL terminator; the seed itself may
        // end in a zero byte.
        let announced = usize::from(auth_len).saturating_sub(1);
        if announced >= 8 && seed.len() > announced {
            seed.truncate(announced);
        } else if seed.last() == Some(&0) {
            seed.truncate(seed.len() - 1);
        }

        let auth_plugin = if capabilities.contains(CapabilityFlags::PLUGIN_AUTH) && src.has_remaining()
        {
            // Some servers omit the terminator on the final field.
            let name = match read_null_terminated_string(src) {
                Ok(name) => name,
                Err(ProtocolError::MissingNullTerminator) => {
                    crate::codec::read_eof_string(src)?
                }
                Err(e) => return Err(e),
            };
            Some(name)
        } else {
            None
        };

        Ok(Self {
            server_version,
            connection_id,
            auth_seed: seed.freeze(),
            capabilities,
            charset,
            status,
            auth_plugin,
        })
    }

    /// Encode the handshake. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let caps = self.capabilities.bits();
        dst.put_u8(PROTOCOL_VERSION_10);
        write_null_terminated(dst, self.server_version.as_bytes());
        dst.put_u32_le(self.connection_id);
        let seed = &self.auth_seed[..];
        let (part1, part2) = seed.split_at(seed.len().min(8));
        dst.put_slice(part1);
        for _ in part1.len()..8 {
            dst.put_u8(0);
        }
        dst.put_u8(0);
        dst.put_u16_le(caps as u16);
        dst.put_u8(self.charset);
        dst.put_u16_le(self.status.bits());
        dst.put_u16_le((caps >> 16) as u16);
        dst.put_u8((seed.len() + 1) as u8);
        dst.put_slice(&[0; 10]);
        dst.put_slice(part2);
        for _ in part2.len()..12 {
            dst.put_u8(0);
        }
        dst.put_u8(0);
        if let Some(plugin) = &self.auth_plugin {
            write_null_terminated(dst, plugin.as_bytes());
        }
    }
}

/// SSLRequest: the truncated handshake response sent before a TLS upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SslRequest {
    /// Client capabilities, including [`CapabilityFlags::SSL`].
    pub capabilities: CapabilityFlags,
    /// Maximum packet size.
    pub max_packet_size: u32,
    /// Client collation id.
    pub charset: u8,
}

impl SslRequest {
    /// Encode the 32-byte SSLRequest payload.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le((self.capabilities | CapabilityFlags::SSL).bits());
        dst.put_u32_le(self.max_packet_size);
        dst.put_u8(self.charset);
        dst.put_slice(&RESERVED_FILLER);
    }
}

/// Handshake response (protocol 4.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakeResponse {
    /// Negotiated capabilities.
    pub capabilities: CapabilityFlags,
    /// Maximum packet size.
    pub max_packet_size: u32,
    /// Client collation id.
    pub charset: u8,
    /// User name.
    pub username: String,
    /// Plugin-computed auth response.
    pub auth_response: Bytes,
    /// Initial database.
    pub database: Option<String>,
    /// Auth plugin used to compute `auth_response`.
    pub auth_plugin: Option<String>,
    /// Connection attributes.
    pub attributes: Vec<(String, String)>,
}

impl HandshakeResponse {
    /// Encode the handshake response payload.
    ///
    /// Optional fields are written only when their capability is set.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let caps = self.capabilities;
        dst.put_u32_le(caps.bits());
        dst.put_u32_le(self.max_packet_size);
        dst.put_u8(self.charset);
        dst.put_slice(&RESERVED_FILLER);
        write_null_terminated(dst, self.username.as_bytes());

        if caps.contains(CapabilityFlags::PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            write_lenenc_bytes(dst, &self.auth_response);
        } else if caps.contains(CapabilityFlags::SECURE_CONNECTION) {
            let len = self.auth_response.len().min(255);
            dst.put_u8(len as u8);
            dst.put_slice(&self.auth_response[..len]);
        } else {
            write_null_terminated(dst, &self.auth_response);
        }

        if caps.contains(CapabilityFlags::CONNECT_WITH_DB) {
            write_null_terminated(dst, self.database.as_deref().unwrap_or("").as_bytes());
        }

        if caps.contains(CapabilityFlags::PLUGIN_AUTH) {
            write_null_terminated(dst, self.auth_plugin.as_deref().unwrap_or("").as_bytes());
        }

        if caps.contains(CapabilityFlags::CONNECT_ATTRS) {
            let total: usize = self
                .attributes
                .iter()
                .map(|(k, v)| {
                    lenenc_int_len(k.len() as u64) + k.len() + lenenc_int_len(v.len() as u64) + v.len()
                })
                .sum();
            write_lenenc_int(dst, total as u64);
            for (key, value) in &self.attributes {
                write_lenenc_str(dst, key);
                write_lenenc_str(dst, value);
            }
        }
    }

    /// Decode a handshake response. Used by test servers.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let capabilities = CapabilityFlags::from_bits_retain(read_u32(src)?);
        let max_packet_size = read_u32(src)?;
        let charset = read_u8(src)?;
        let _filler = read_fixed(src, RESERVED_FILLER.len())?;
        let username = read_null_terminated_string(src)?;

        let auth_response = if capabilities.contains(CapabilityFlags::PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            read_lenenc_bytes(src)?
        } else if capabilities.contains(CapabilityFlags::SECURE_CONNECTION) {
            let len = read_u8(src)?;
            read_fixed(src, usize::from(len))?
        } else {
            read_null_terminated_bytes(src)?
        };

        let database = if capabilities.contains(CapabilityFlags::CONNECT_WITH_DB) && src.has_remaining() {
            Some(read_null_terminated_string(src)?).filter(|db| !db.is_empty())
        } else {
            None
        };

        let auth_plugin = if capabilities.contains(CapabilityFlags::PLUGIN_AUTH) && src.has_remaining() {
            Some(read_null_terminated_string(src)?)
        } else {
            None
        };

        let mut attributes = Vec::new();
        if capabilities.contains(CapabilityFlags::CONNECT_ATTRS) && src.has_remaining() {
            let total = read_lenenc_int(src)?;
            let total = usize::try_from(total).map_err(|_| ProtocolError::UnexpectedEof)?;
            let mut block = read_fixed(src, total)?;
            while block.has_remaining() {
                let key = read_lenenc_string(&mut block)?;
                let value = read_lenenc_string(&mut block)?;
                attributes.push((key, value));
            }
        }

        Ok(Self {
            capabilities,
            max_packet_size,
            charset,
            username,
            auth_response,
            database,
            auth_plugin,
            attributes,
        })
    }
}

/// Request from the server to restart authentication with another plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSwitchRequest {
    /// Plugin to switch to.
    pub plugin_name: String,
    /// New seed for the plugin, without the trailing NUL.
    pub plugin_data: Bytes,
}

impl AuthSwitchRequest {
    /// Decode an auth switch request, including its `0xFE` header byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let header = read_u8(src)?;
        if header != AUTH_SWITCH_HEADER {
            return Err(ProtocolError::UnexpectedPacket {
                header,
                context: "auth switch request",
            });
        }
        let plugin_name = read_null_terminated_string(src)?;
        let mut data = src.copy_to_bytes(src.remaining());
        if data.last() == Some(&0) {
            data.truncate(data.len() - 1);
        }
        Ok(Self {
            plugin_name,
            plugin_data: data,
        })
    }

    /// Encode an auth switch request. Used by test servers.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(AUTH_SWITCH_HEADER);
        write_null_terminated(dst, self.plugin_name.as_bytes());
        write_null_terminated(dst, &self.plugin_data);
    }
}

/// Plugin-specific data sent by the server during authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMoreData {
    /// Payload after the `0x01` header.
    pub data: Bytes,
}

impl AuthMoreData {
    /// Decode an auth more-data packet, including its `0x01` header byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let header = read_u8(src)?;
        if header != AUTH_MORE_DATA_HEADER {
            return Err(ProtocolError::UnexpectedPacket {
                header,
                context: "auth more data",
            });
        }
        Ok(Self {
            data: src.copy_to_bytes(src.remaining()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Initial handshake captured from a MySQL 8.0 server.
    const MYSQL8_HANDSHAKE: &[u8] = &[
        0x0a, b'8', b'.', b'0', b'.', b'3', b'6', 0x00, // version
        0x0b, 0x00, 0x00, 0x00, // connection id
        0x3c, 0x27, 0x55, 0x13, 0x1a, 0x4f, 0x0b, 0x3e, // seed part 1
        0x00, // filler
        0xff, 0xff, // caps lower
        0xff, // charset
        0x02, 0x00, // status
        0xff, 0xdf, // caps upper
        0x15, // auth len
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
        0x31, 0x65, 0x66, 0x2b, 0x5e, 0x25, 0x4a, 0x22, 0x0a, 0x4a, 0x2b, 0x2d, 0x00, // seed part 2
        b'c', b'a', b'c', b'h', b'i', b'n', b'g', b'_', b's', b'h', b'a', b'2', b'_', b'p', b'a',
        b's', b's', b'w', b'o', b'r', b'd', 0x00,
    ];

    #[test]
    fn test_decode_captured_handshake() {
        let mut buf = MYSQL8_HANDSHAKE;
        let hs = HandshakeV10::decode(&mut buf).unwrap();
        assert_eq!(hs.server_version, "8.0.36");
        assert_eq!(hs.connection_id, 11);
        assert_eq!(hs.auth_seed.len(), 20);
        assert_eq!(&hs.auth_seed[..8], &[0x3c, 0x27, 0x55, 0x13, 0x1a, 0x4f, 0x0b, 0x3e]);
        assert_eq!(hs.charset, 0xff);
        assert!(hs.status.contains(StatusFlags::AUTOCOMMIT));
        assert!(hs.capabilities.contains(CapabilityFlags::PLUGIN_AUTH));
        assert!(hs.capabilities.contains(CapabilityFlags::DEPRECATE_EOF));
        assert_eq!(hs.auth_plugin.as_deref(), Some("caching_sha2_password"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_handshake_wrong_version() {
        let mut buf: &[u8] = &[0x09, 0x00];
        assert_eq!(
            HandshakeV10::decode(&mut buf),
            Err(ProtocolError::UnsupportedProtocolVersion(9))
        );
    }

    #[test]
    fn test_handshake_encode_decode() {
        let hs = HandshakeV10 {
            server_version: "8.0.0-mock".into(),
            connection_id: 42,
            auth_seed: Bytes::from_static(b"abcdefghijklmnopqrst"),
            capabilities: CapabilityFlags::client_default() | CapabilityFlags::SSL,
            charset: 45,
            status: StatusFlags::AUTOCOMMIT,
            auth_plugin: Some("mysql_native_password".into()),
        };
        let mut buf = BytesMut::new();
        hs.encode(&mut buf);
        let decoded = HandshakeV10::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, hs);
    }

    #[test]
    fn test_seed_ending_in_zero_is_kept() {
        let mut seed = b"abcdefghijklmnopqrs".to_vec();
        seed.push(0);
        let hs = HandshakeV10 {
            server_version: "8.0.0-mock".into(),
            connection_id: 7,
            auth_seed: Bytes::from(seed),
            capabilities: CapabilityFlags::client_default(),
            charset: 45,
            status: StatusFlags::AUTOCOMMIT,
            auth_plugin: Some("caching_sha2_password".into()),
        };
        let mut buf = BytesMut::new();
        hs.encode(&mut buf);
        let decoded = HandshakeV10::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.auth_seed.len(), 20);
        assert_eq!(decoded.auth_seed.last(), Some(&0));
        assert_eq!(decoded, hs);
    }

    #[test]
    fn test_ssl_request_is_32_bytes() {
        let req = SslRequest {
            capabilities: CapabilityFlags::client_default(),
            max_packet_size: 16_777_216,
            charset: 45,
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        assert_eq!(buf.len(), SSL_REQUEST_SIZE);
        let caps = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_ne!(caps & CapabilityFlags::SSL.bits(), 0);
        assert_eq!(buf[8], 45);
    }

    #[test]
    fn test_handshake_response_roundtrip() {
        let response = HandshakeResponse {
            capabilities: CapabilityFlags::client_default()
                | CapabilityFlags::CONNECT_WITH_DB
                | CapabilityFlags::CONNECT_ATTRS,
            max_packet_size: 16_777_216,
            charset: 45,
            username: "root".into(),
            auth_response: Bytes::from_static(&[1; 20]),
            database: Some("app".into()),
            auth_plugin: Some("mysql_native_password".into()),
            attributes: vec![("_client_name".into(), "mysql-rs".into())],
        };
        let mut buf = BytesMut::new();
        response.encode(&mut buf);

        // 4 + 4 + 1 + 23 fixed bytes before the user name.
        assert_eq!(&buf[32..37], b"root\0");
        assert_eq!(buf[37], 20);

        let decoded = HandshakeResponse::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_handshake_response_short_auth_prefix() {
        let response = HandshakeResponse {
            capabilities: CapabilityFlags::PROTOCOL_41 | CapabilityFlags::SECURE_CONNECTION,
            max_packet_size: 1024,
            charset: 33,
            username: "u".into(),
            auth_response: Bytes::from_static(b"xyz"),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        assert_eq!(&buf[32..], b"u\0\x03xyz");
    }

    #[test]
    fn test_auth_switch_decode() {
        let mut buf: &[u8] = b"\xfemysql_native_password\0abcdefghijklmnopqrst\0";
        let switch = AuthSwitchRequest::decode(&mut buf).unwrap();
        assert_eq!(switch.plugin_name, "mysql_native_password");
        assert_eq!(&switch.plugin_data[..], b"abcdefghijklmnopqrst");
    }

    #[test]
    fn test_auth_more_data() {
        let mut buf: &[u8] = &[0x01, 0x03];
        let more = AuthMoreData::decode(&mut buf).unwrap();
        assert_eq!(&more.data[..], &[0x03]);

        let mut wrong: &[u8] = &[0x00];
        assert!(AuthMoreData::decode(&mut wrong).is_err());
    }
}
