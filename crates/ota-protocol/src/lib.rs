#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::time::Duration;

use derive_ctor::ctor;
use ota_port::{SimpleRead, SimpleWrite};

use crate::{
    err::Error,
    packet::{FRAME_OVERHEAD, MAX_PAYLOAD, PAYLOAD_OFFSET, SOF},
};

pub mod checksum;
pub mod err;
pub mod packet;

pub use checksum::{Checksum, checksum};
pub use packet::{Command, Header, Kind, Packet, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Framed packet transport on top of a blocking byte stream.
///
/// Every field of a frame is read with its own `timeout`. A frame is either returned
/// whole and validated or dropped; there is no resynchronization, the next read simply
/// expects a start marker again.
#[derive(ctor)]
pub struct Protocol<T: SimpleRead + SimpleWrite, const N: usize> {
    io: T,
    buf: [u8; N],
    timeout: Duration,
}

impl<T: SimpleRead + SimpleWrite, const N: usize> Protocol<T, N> {
    /// Read one frame into the working buffer and validate it.
    ///
    /// The packet lives as long as the `buf` is valid.
    pub fn read_packet(&mut self) -> Result<Packet<'_>> {
        let len = self.read_frame()?;
        Packet::decode(&self.buf[..len])
    }

    fn read_frame(&mut self) -> Result<usize> {
        let timeout = self.timeout;

        let sof = self.io.read_u8(timeout)?;
        if sof != SOF {
            return Err(Error::StartMarker(sof));
        }
        let kind = self.io.read_u8(timeout)?;
        let len = self.io.read_u16_le(timeout)?;

        let payload_len = len as usize;
        let frame_len = payload_len + FRAME_OVERHEAD;
        if payload_len > MAX_PAYLOAD || frame_len > N {
            return Err(Error::Oversized(payload_len));
        }

        self.buf[0] = sof;
        self.buf[1] = kind;
        self.buf[2..PAYLOAD_OFFSET].copy_from_slice(&len.to_le_bytes());
        // Payload, checksum and EOF in one go
        self.io
            .read(&mut self.buf[PAYLOAD_OFFSET..frame_len], timeout)?;

        Ok(frame_len)
    }

    /// Send `packet`.
    ///
    /// The `buf` is used to store the encoded frame.
    pub fn send_packet(&mut self, packet: &Packet<'_>) -> Result<()> {
        let len = packet.encode(&mut self.buf)?;
        self.io
            .write(&self.buf[..len], self.timeout)
            .map_err(|e| e.into())
    }

    pub fn send_response(&mut self, status: Status) -> Result<()> {
        self.send_packet(&Packet::Response(status))
    }

    pub fn io_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }
}
