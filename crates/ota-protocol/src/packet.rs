//! Wire packets.
//!
//! ```text
//!  ______________________________________________
//! |     | Packet |     |         |       |     |
//! | SOF |  Kind  | Len | Payload | CRC32 | EOF |
//! |_____|________|_____|_________|_______|_____|
//!   1B      1B     2B     Len B     4B     1B
//! ```
//!
//! Multi-byte fields are little-endian and the checksum covers the payload only.

use core::fmt::{self, Display};

use derive_ctor::ctor;
use derive_more::IsVariant;

use crate::{Result, checksum::checksum, err::Error};

/// Start of frame.
pub const SOF: u8 = 0xaa;
/// End of frame.
pub const EOF: u8 = 0xbb;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD: usize = 1024;
/// SOF, kind, length, checksum and EOF.
pub const FRAME_OVERHEAD: usize = 9;
pub const MAX_FRAME: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// Offset of the payload inside a frame.
pub(crate) const PAYLOAD_OFFSET: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
#[repr(u8)]
pub enum Kind {
    Command = 0,
    Data = 1,
    Header = 2,
    Response = 3,
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Command),
            1 => Ok(Self::Data),
            2 => Ok(Self::Header),
            3 => Ok(Self::Response),
            _ => Err(Error::UnknownKind(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
#[repr(u8)]
pub enum Command {
    Start = 0,
    End = 1,
    Abort = 2,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Start),
            1 => Ok(Self::End),
            2 => Ok(Self::Abort),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
#[repr(u8)]
pub enum Status {
    Ack = 0,
    Nack = 1,
}

impl TryFrom<u8> for Status {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Ack),
            1 => Ok(Self::Nack),
            _ => Err(Error::UnknownStatus(value)),
        }
    }
}

/// Image metadata announced before the first data chunk.
///
/// The payload is 16 bytes: size, checksum and 8 reserved bytes which are sent as zero
/// and ignored on receive.
#[derive(ctor, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub image_size: u32,
    pub image_checksum: u32,
}

impl Header {
    pub const SIZE: usize = 16;

    fn parse(payload: &[u8]) -> Result<Self> {
        let Ok(payload) = <&[u8; Self::SIZE]>::try_from(payload) else {
            return Err(Error::PayloadLength {
                kind: Kind::Header,
                len: payload.len(),
            });
        };

        Ok(Self {
            image_size: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            image_checksum: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[..4].copy_from_slice(&self.image_size.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.image_checksum.to_le_bytes());
        bytes
    }
}

/// A validated packet.
///
/// `Data` borrows from the frame it was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum Packet<'a> {
    Command(Command),
    Data(&'a [u8]),
    Header(Header),
    Response(Status),
}

impl<'a> Packet<'a> {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Command(_) => Kind::Command,
            Self::Data(_) => Kind::Data,
            Self::Header(_) => Kind::Header,
            Self::Response(_) => Kind::Response,
        }
    }

    /// Interpret an already checksummed payload according to `kind`.
    pub fn from_payload(kind: u8, payload: &'a [u8]) -> Result<Self> {
        let kind = Kind::try_from(kind)?;
        let single = |payload: &[u8]| match payload {
            [byte] => Ok(*byte),
            _ => Err(Error::PayloadLength {
                kind,
                len: payload.len(),
            }),
        };

        match kind {
            Kind::Command => Ok(Self::Command(Command::try_from(single(payload)?)?)),
            Kind::Response => Ok(Self::Response(Status::try_from(single(payload)?)?)),
            Kind::Header => Ok(Self::Header(Header::parse(payload)?)),
            Kind::Data if payload.is_empty() || payload.len() > MAX_PAYLOAD => {
                Err(Error::PayloadLength {
                    kind,
                    len: payload.len(),
                })
            }
            Kind::Data => Ok(Self::Data(payload)),
        }
    }

    /// Decode one complete frame.
    pub fn decode(frame: &'a [u8]) -> Result<Self> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(Error::FrameLength {
                expected: FRAME_OVERHEAD,
                actual: frame.len(),
            });
        }
        if frame[0] != SOF {
            return Err(Error::StartMarker(frame[0]));
        }

        let len = u16::from_le_bytes([frame[2], frame[3]]) as usize;
        if len > MAX_PAYLOAD {
            return Err(Error::Oversized(len));
        }
        if frame.len() != len + FRAME_OVERHEAD {
            return Err(Error::FrameLength {
                expected: len + FRAME_OVERHEAD,
                actual: frame.len(),
            });
        }

        let payload = &frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len];
        let trailer = &frame[PAYLOAD_OFFSET + len..];
        if trailer[4] != EOF {
            return Err(Error::EndMarker(trailer[4]));
        }

        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = checksum(payload);
        if expected != computed {
            return Err(Error::Checksum { expected, computed });
        }

        Self::from_payload(frame[1], payload)
    }

    /// Write the complete frame into `out` and return its length.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        let header;
        let byte;
        let payload: &[u8] = match self {
            Self::Command(command) => {
                byte = [*command as u8];
                &byte
            }
            Self::Response(status) => {
                byte = [*status as u8];
                &byte
            }
            Self::Header(h) => {
                header = h.to_bytes();
                &header
            }
            Self::Data(data) => data,
        };

        if payload.is_empty() || payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadLength {
                kind: self.kind(),
                len: payload.len(),
            });
        }

        let len = payload.len() + FRAME_OVERHEAD;
        if out.len() < len {
            return Err(Error::BufferTooSmall(len));
        }

        out[0] = SOF;
        out[1] = self.kind() as u8;
        out[2..PAYLOAD_OFFSET].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        let (body, trailer) = out[PAYLOAD_OFFSET..len].split_at_mut(payload.len());
        body.copy_from_slice(payload);
        trailer[..4].copy_from_slice(&checksum(payload).to_le_bytes());
        trailer[4] = EOF;

        Ok(len)
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Data => write!(f, "data"),
            Self::Header => write!(f, "header"),
            Self::Response => write!(f, "response"),
        }
    }
}

impl Display for Packet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(c) => write!(f, "Command {c:?}"),
            Self::Data(data) => write!(f, "Data ({} bytes)", data.len()),
            Self::Header(h) => write!(
                f,
                "Header: size {} checksum {:#010x}",
                h.image_size, h.image_checksum
            ),
            Self::Response(Status::Ack) => write!(f, "ACK"),
            Self::Response(Status::Nack) => write!(f, "NACK"),
        }
    }
}
