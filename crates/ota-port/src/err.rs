use derive_more::IsVariant;
use thiserror::Error as TError;

#[derive(Debug, TError, IsVariant)]
pub enum Error {
    /// The peer didn't deliver the requested bytes in time
    #[error("timed out waiting for the peer")]
    Timeout,

    /// Framing, parity or overrun error reported by the line driver
    #[error("line error")]
    Line,

    #[cfg(feature = "serialport")]
    /// `serialport` crate error
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[cfg(feature = "std")]
    /// I/O error
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io(e),
        }
    }
}

/// Non-volatile memory driver failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, TError)]
pub enum FlashError {
    #[error("flash interface refused to unlock")]
    Unlock,
    #[error("flash interface refused to lock")]
    Lock,
    #[error("flash interface is locked")]
    Locked,
    #[error("erase failed at {0:#010x}")]
    Erase(u32),
    #[error("program failed at {0:#010x}")]
    Program(u32),
    #[error("address {0:#010x} is not aligned to the programming unit")]
    Unaligned(u32),
    #[error("address {0:#010x} is outside of the flash array")]
    OutOfRange(u32),
}
