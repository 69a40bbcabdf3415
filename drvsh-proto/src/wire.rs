//! Wire frame types and codec for the driver protocol.
//!
//! All integers are host-native byte order (the protocol is local-machine
//! only, never crosses a network boundary) and all frames begin with a
//! one-byte signature. Field widths are fixed: this module only ever
//! encodes/decodes bytes, it performs no I/O -- reading enough bytes off
//! a socket is the caller's job (see `drvshelld::client`).

use crate::error::{Error, Result};

pub const MAX_COMMAND_NAME_LEN: usize = 32;
pub const MAX_COMMAND_DESCRIPTION_LEN: usize = 128;
pub const MAX_ARG_LEN: usize = 255;

/// First byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signature {
    Command = 1,
    Info = 2,
    Response = 3,
}

impl Signature {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(Signature::Command),
            2 => Ok(Signature::Info),
            3 => Ok(Signature::Response),
            other => Err(Error::BadSignature(other)),
        }
    }
}

/// One entry in a driver's advertised command catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub arity: u8,
}

/// A fully decoded `DRV_INFO` frame -- the driver's self-described
/// command catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InfoFrame {
    pub commands: Vec<CommandInfo>,
}

impl InfoFrame {
    /// Minimum number of bytes needed to decode the fixed header
    /// (signature + `commands_number`) once the signature has already
    /// been consumed.
    pub const HEADER_LEN: usize = 2;

    const ENTRY_LEN: usize = MAX_COMMAND_NAME_LEN + MAX_COMMAND_DESCRIPTION_LEN + 1;

    /// Reads `commands_number` out of the two bytes following the
    /// signature.
    pub fn commands_number(header: &[u8]) -> u16 {
        u16::from_ne_bytes([header[0], header[1]])
    }

    /// Total body length (after the signature byte) once
    /// `commands_number` is known.
    pub fn body_len(commands_number: u16) -> usize {
        Self::HEADER_LEN + commands_number as usize * Self::ENTRY_LEN
    }

    /// Decodes the body (everything after the signature byte) of an
    /// Info frame. `body` must be exactly `body_len(commands_number)`
    /// bytes.
    pub fn decode(body: &[u8]) -> Result<InfoFrame> {
        let commands_number = Self::commands_number(body);
        let mut commands = Vec::with_capacity(commands_number as usize);
        let mut cursor = Self::HEADER_LEN;

        for _ in 0..commands_number {
            let entry = &body[cursor..cursor + Self::ENTRY_LEN];

            let name = nul_terminated_str(&entry[..MAX_COMMAND_NAME_LEN]);
            let descr = nul_terminated_str(
                &entry[MAX_COMMAND_NAME_LEN..MAX_COMMAND_NAME_LEN + MAX_COMMAND_DESCRIPTION_LEN],
            );
            let arity = entry[MAX_COMMAND_NAME_LEN + MAX_COMMAND_DESCRIPTION_LEN];

            commands.push(CommandInfo {
                name,
                description: descr,
                arity,
            });

            cursor += Self::ENTRY_LEN;
        }

        Ok(InfoFrame { commands })
    }
}

fn nul_terminated_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// A fully decoded `DRV_RESPONSE` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub payload: Vec<u8>,
}

impl ResponseFrame {
    /// Length of the `length: u32` header, following the signature byte.
    pub const HEADER_LEN: usize = 4;

    pub fn payload_len(header: &[u8]) -> u32 {
        u32::from_ne_bytes([header[0], header[1], header[2], header[3]])
    }

    pub fn body_len(payload_len: u32) -> usize {
        Self::HEADER_LEN + payload_len as usize
    }

    pub fn decode(body: &[u8]) -> Result<ResponseFrame> {
        let len = Self::payload_len(body) as usize;
        let payload = body[Self::HEADER_LEN..Self::HEADER_LEN + len].to_vec();

        Ok(ResponseFrame { payload })
    }
}

/// An argument to a `DRV_COMMAND` frame: up to 255 raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArg(Vec<u8>);

impl CommandArg {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_ARG_LEN {
            return Err(Error::FieldTooLong {
                what: "command argument",
                len: bytes.len(),
            });
        }
        Ok(CommandArg(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A fully decoded or to-be-encoded `DRV_COMMAND` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub cmd_idx: u16,
    pub args: Vec<CommandArg>,
}

impl CommandFrame {
    /// Serializes a complete frame, signature byte included.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 2 + 1 + self.args.len() * 2);

        out.push(Signature::Command as u8);
        out.extend_from_slice(&self.cmd_idx.to_ne_bytes());
        out.push(self.args.len() as u8);

        for arg in &self.args {
            out.push(arg.as_bytes().len() as u8);
            out.extend_from_slice(arg.as_bytes());
        }

        out
    }

    /// Decodes a complete frame, including the leading signature byte.
    /// Used by tests (round-trip property) and by anything that wants
    /// to play the driver side of the protocol.
    pub fn decode(bytes: &[u8]) -> Result<CommandFrame> {
        if bytes.is_empty() {
            return Err(Error::UnexpectedEof);
        }

        Signature::from_byte(bytes[0])?;

        if bytes.len() < 4 {
            return Err(Error::UnexpectedEof);
        }

        let cmd_idx = u16::from_ne_bytes([bytes[1], bytes[2]]);
        let argc = bytes[3] as usize;
        let mut cursor = 4;
        let mut args = Vec::with_capacity(argc);

        for _ in 0..argc {
            if cursor >= bytes.len() {
                return Err(Error::UnexpectedEof);
            }

            let len = bytes[cursor] as usize;
            cursor += 1;

            if cursor + len > bytes.len() {
                return Err(Error::UnexpectedEof);
            }

            args.push(CommandArg::new(&bytes[cursor..cursor + len])?);
            cursor += len;
        }

        Ok(CommandFrame { cmd_idx, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_round_trips() {
        let frame = CommandFrame {
            cmd_idx: 1,
            args: vec![CommandArg::new(b"42").unwrap()],
        };

        let bytes = frame.encode();
        let decoded = CommandFrame::decode(&bytes).unwrap();

        assert_eq!(decoded, frame);
    }

    #[test]
    fn command_frame_with_no_args_round_trips() {
        let frame = CommandFrame {
            cmd_idx: 0,
            args: vec![],
        };

        assert_eq!(CommandFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn arg_at_255_bytes_succeeds() {
        let bytes = vec![b'x'; 255];
        assert!(CommandArg::new(&bytes).is_ok());
    }

    #[test]
    fn arg_at_256_bytes_rejected() {
        let bytes = vec![b'x'; 256];
        assert!(CommandArg::new(&bytes).is_err());
    }

    #[test]
    fn info_frame_decodes_empty_catalog() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_ne_bytes());

        let info = InfoFrame::decode(&body).unwrap();
        assert!(info.commands.is_empty());
    }

    #[test]
    fn info_frame_decodes_entries() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_ne_bytes());

        let mut name = [0u8; MAX_COMMAND_NAME_LEN];
        name[..4].copy_from_slice(b"read");

        let mut descr = [0u8; MAX_COMMAND_DESCRIPTION_LEN];
        descr[..15].copy_from_slice(b"get temperature");

        body.extend_from_slice(&name);
        body.extend_from_slice(&descr);
        body.push(0); // arity

        let info = InfoFrame::decode(&body).unwrap();
        assert_eq!(info.commands.len(), 1);
        assert_eq!(info.commands[0].name, "read");
        assert_eq!(info.commands[0].description, "get temperature");
        assert_eq!(info.commands[0].arity, 0);
    }

    #[test]
    fn response_frame_decodes_payload() {
        let mut body = Vec::new();
        body.extend_from_slice(&2u32.to_ne_bytes());
        body.extend_from_slice(b"ok");

        let resp = ResponseFrame::decode(&body).unwrap();
        assert_eq!(resp.payload, b"ok");
    }

    #[test]
    fn rejects_unknown_signature() {
        assert!(Signature::from_byte(0xff).is_err());
    }
}
