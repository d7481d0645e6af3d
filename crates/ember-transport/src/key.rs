//! # Session Key Bootstrap
//!
//! Out-of-band control record used to hand per-session keys between peers
//! before the steady packet stream starts.
//!
//! ```text
//! KeyMessage := id:u8 (254 = request, 255 = server response) | uplink:[u8;16] | downlink:[u8;16]
//! ```
//!
//! The key pair is an opaque blob here; minting and validating keys belongs
//! to the crypto layer.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use rand::RngExt as _;
use std::fmt;
use thiserror::Error;

use crate::codec::{self, DecodeError, Parser, Serializer};
use crate::wire::Wire;

/// Length of each direction's key.
pub const KEY_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid base64 key encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("decoded key pair is {0} bytes, expected {expected}", expected = 2 * KEY_LEN)]
    Length(usize),
}

// ─── KeyPair ─────────────────────────────────────────────────────────────────

/// One key per direction.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyPair {
    pub uplink: [u8; KEY_LEN],
    pub downlink: [u8; KEY_LEN],
}

impl KeyPair {
    /// Fresh random key pair.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        KeyPair {
            uplink: rng.random(),
            downlink: rng.random(),
        }
    }

    /// Text form for configuration files and command lines.
    pub fn to_base64(&self) -> String {
        let mut raw = [0u8; 2 * KEY_LEN];
        raw[..KEY_LEN].copy_from_slice(&self.uplink);
        raw[KEY_LEN..].copy_from_slice(&self.downlink);
        BASE64.encode(raw)
    }

    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let raw = BASE64.decode(text.trim())?;
        if raw.len() != 2 * KEY_LEN {
            return Err(KeyError::Length(raw.len()));
        }
        let mut pair = KeyPair::default();
        pair.uplink.copy_from_slice(&raw[..KEY_LEN]);
        pair.downlink.copy_from_slice(&raw[KEY_LEN..]);
        Ok(pair)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyPair { .. }")
    }
}

impl Wire for KeyPair {
    fn serialized_length(&self) -> usize {
        2 * KEY_LEN
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.string(&self.uplink);
        s.string(&self.downlink);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        let uplink = p.string(KEY_LEN);
        let downlink = p.string(KEY_LEN);
        if !p.has_error() {
            self.uplink.copy_from_slice(uplink);
            self.downlink.copy_from_slice(downlink);
        }
    }
}

// ─── KeyMessage ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyMessageId {
    /// Client asks for keys.
    #[default]
    Request = 254,
    /// Server answers with keys.
    ServerResponse = 255,
}

impl KeyMessageId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            254 => Some(KeyMessageId::Request),
            255 => Some(KeyMessageId::ServerResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMessage {
    pub id: KeyMessageId,
    pub key_pair: KeyPair,
}

impl KeyMessage {
    pub const ENCODED_LEN: usize = 1 + 2 * KEY_LEN;

    pub fn request(key_pair: KeyPair) -> Self {
        KeyMessage {
            id: KeyMessageId::Request,
            key_pair,
        }
    }

    pub fn response(key_pair: KeyPair) -> Self {
        KeyMessage {
            id: KeyMessageId::ServerResponse,
            key_pair,
        }
    }

    pub fn encode(&self) -> Bytes {
        codec::encode(self)
    }

    pub fn decode(input: &[u8]) -> Result<Self, DecodeError> {
        codec::decode(input)
    }
}

impl Wire for KeyMessage {
    fn serialized_length(&self) -> usize {
        1 + self.key_pair.serialized_length()
    }

    fn serialize(&self, s: &mut Serializer<'_>) {
        s.integer(self.id as u8);
        s.object(&self.key_pair);
    }

    fn parse(&mut self, p: &mut Parser<'_>) {
        let mut id = 0u8;
        p.integer(&mut id);
        if p.has_error() {
            return;
        }
        match KeyMessageId::from_byte(id) {
            Some(id) => self.id = id,
            None => {
                p.set_error(DecodeError::InvalidValue {
                    field: "key_message_id",
                    value: id as u64,
                });
                return;
            }
        }
        p.object(&mut self.key_pair);
    }
}
