use ota_port::err::FlashError;
use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// Port auto-detection found several candidates
    #[error("Please disconnect other USB serial devices or pick one with --port")]
    MoreThanOneDevice,

    /// The flash image file doesn't match the selected part
    #[error("Flash image is {actual} bytes, the part has {expected}")]
    FlashImageSize { expected: usize, actual: usize },

    #[error("All {0} update attempts failed")]
    AttemptsExhausted(u32),

    /// ota-engine error
    #[error("{0}")]
    Engine(#[from] ota_engine::err::Error),
    #[error("{0}")]
    Flash(#[from] FlashError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// serialport crate error
    #[error("serialport error: {0}")]
    SerialPort(#[from] serialport::Error),
}
