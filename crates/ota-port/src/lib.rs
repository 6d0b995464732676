#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::time::Duration;

#[cfg(feature = "serialport")]
use serialport::SerialPort;

use crate::err::Error;

pub mod err;
pub mod flash;

pub use flash::Flash;

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(feature = "serialport")]
pub type Port = Box<dyn SerialPort>;

pub trait FromBytes<const N: usize> {
    fn from_le(bytes: [u8; N]) -> Self;
}

/// Blocking byte source.
pub trait SimpleRead {
    /// Fill the whole `buf` or fail once `timeout` expires.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()>;

    fn simple_read_le<T: FromBytes<N>, const N: usize>(&mut self, timeout: Duration) -> Result<T> {
        let mut bytes = [0; N];
        Self::read(self, &mut bytes, timeout)?;
        Ok(T::from_le(bytes))
    }

    fn read_u8(&mut self, timeout: Duration) -> Result<u8> {
        self.simple_read_le(timeout)
    }

    fn read_u16_le(&mut self, timeout: Duration) -> Result<u16> {
        self.simple_read_le(timeout)
    }

    fn read_u32_le(&mut self, timeout: Duration) -> Result<u32> {
        self.simple_read_le(timeout)
    }
}

/// Blocking byte sink.
pub trait SimpleWrite {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()>;
}

impl<T: SimpleRead + ?Sized> SimpleRead for &mut T {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        (**self).read(buf, timeout)
    }
}

impl<T: SimpleWrite + ?Sized> SimpleWrite for &mut T {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        (**self).write(buf, timeout)
    }
}

impl FromBytes<1> for u8 {
    fn from_le(bytes: [u8; 1]) -> Self {
        Self::from_le_bytes(bytes)
    }
}

impl FromBytes<2> for u16 {
    fn from_le(bytes: [u8; 2]) -> Self {
        Self::from_le_bytes(bytes)
    }
}

impl FromBytes<4> for u32 {
    fn from_le(bytes: [u8; 4]) -> Self {
        Self::from_le_bytes(bytes)
    }
}

#[cfg(feature = "serialport")]
impl SimpleRead for Port {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        self.set_timeout(timeout)?;
        std::io::Read::read_exact(self, buf).map_err(|e| e.into())
    }
}

#[cfg(feature = "serialport")]
impl SimpleWrite for Port {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        self.set_timeout(timeout)?;
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self).map_err(|e| e.into())
    }
}
