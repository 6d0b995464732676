//! Flash programming discipline shared by the slot writer, the config store and the
//! boot selector: unlock, optionally erase the region, program halfwords, relock.

use log::warn;
use ota_port::{Flash, flash::ERASED};
use ota_protocol::Checksum;

use crate::Result;

/// Bytes read per step when checksumming or copying a region.
const CHUNK: usize = 256;

/// An unlocked write sequence.
///
/// The interface is relocked by [`FlashWriter::finish`], or on drop if the sequence
/// was cut short by an error.
pub struct FlashWriter<'a, F: Flash + ?Sized> {
    flash: &'a mut F,
    locked: bool,
}

impl<'a, F: Flash + ?Sized> FlashWriter<'a, F> {
    pub fn unlock(flash: &'a mut F) -> Result<Self> {
        flash.unlock()?;
        Ok(Self {
            flash,
            locked: false,
        })
    }

    pub fn erase(&mut self, start: u32, pages: u32) -> Result<()> {
        self.flash.erase_pages(start, pages).map_err(|e| e.into())
    }

    /// Program `data` at `addr` one halfword at a time.
    ///
    /// An odd trailing byte is paired with the erased value.
    pub fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        for (i, pair) in data.chunks(2).enumerate() {
            let halfword = u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(ERASED)]);
            self.flash
                .program_halfword(addr + (i * 2) as u32, halfword)?;
        }

        Ok(())
    }

    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.flash.read(addr, buf).map_err(|e| e.into())
    }

    pub fn finish(mut self) -> Result<()> {
        self.locked = true;
        self.flash.lock().map_err(|e| e.into())
    }
}

impl<F: Flash + ?Sized> Drop for FlashWriter<'_, F> {
    fn drop(&mut self) {
        if !self.locked {
            if let Err(e) = self.flash.lock() {
                warn!("Unable to relock flash after a failed write: {e}");
            }
        }
    }
}

/// Checksum `len` bytes of flash starting at `addr`.
pub fn checksum_region<F: Flash + ?Sized>(flash: &F, addr: u32, len: u32) -> Result<u32> {
    let mut digest = Checksum::new();
    let mut buf = [0; CHUNK];
    let mut offset = 0;

    while offset < len {
        let n = (len - offset).min(CHUNK as u32) as usize;
        flash.read(addr + offset, &mut buf[..n])?;
        digest.update(&buf[..n]);
        offset += n as u32;
    }

    Ok(digest.finalize())
}

/// Erase `dst_pages` at `dst` and copy `len` bytes from `src` into it.
pub fn copy_region<F: Flash + ?Sized>(
    flash: &mut F,
    src: u32,
    dst: u32,
    dst_pages: u32,
    len: u32,
) -> Result<()> {
    let mut writer = FlashWriter::unlock(flash)?;
    writer.erase(dst, dst_pages)?;

    let mut buf = [0; CHUNK];
    let mut offset = 0;
    while offset < len {
        let n = (len - offset).min(CHUNK as u32) as usize;
        writer.read(src + offset, &mut buf[..n])?;
        writer.program(dst + offset, &buf[..n])?;
        offset += n as u32;
    }

    writer.finish()
}
