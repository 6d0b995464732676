//! Non-volatile memory driver interface.
//!
//! Mirrors what a microcontroller flash controller offers: an unlock/lock pair around
//! every write sequence, page erase, programming in the native halfword unit and plain
//! reads for verification.

use crate::err::FlashError;

pub type FlashResult<T> = core::result::Result<T, FlashError>;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xff;

pub trait Flash {
    fn unlock(&mut self) -> FlashResult<()>;
    fn lock(&mut self) -> FlashResult<()>;
    /// Erase `count` pages starting at the page containing `start`.
    fn erase_pages(&mut self, start: u32, count: u32) -> FlashResult<()>;
    /// Program one halfword. `addr` must be 2-byte aligned and the target erased.
    fn program_halfword(&mut self, addr: u32, value: u16) -> FlashResult<()>;
    fn read(&self, addr: u32, buf: &mut [u8]) -> FlashResult<()>;
}

impl<F: Flash + ?Sized> Flash for &mut F {
    fn unlock(&mut self) -> FlashResult<()> {
        (**self).unlock()
    }

    fn lock(&mut self) -> FlashResult<()> {
        (**self).lock()
    }

    fn erase_pages(&mut self, start: u32, count: u32) -> FlashResult<()> {
        (**self).erase_pages(start, count)
    }

    fn program_halfword(&mut self, addr: u32, value: u16) -> FlashResult<()> {
        (**self).program_halfword(addr, value)
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> FlashResult<()> {
        (**self).read(addr, buf)
    }
}
