//! Flash array backed by an image file, so the runner can play the device side on a host.

use std::{fs, path::PathBuf};

use log::{error, trace};
use ota_port::{
    Flash,
    err::FlashError,
    flash::{ERASED, FlashResult},
};
use ota_soc::SoC;

use crate::{Result, err::Error};

/// The whole array is kept in memory and written back to the file on every lock.
pub struct FileFlash {
    path: PathBuf,
    base: u32,
    page_size: u32,
    mem: Vec<u8>,
    unlocked: bool,
}

impl FileFlash {
    /// Create or overwrite `path` with an erased array.
    pub fn create(path: impl Into<PathBuf>, soc: SoC) -> Result<Self> {
        let flash = Self {
            path: path.into(),
            base: soc.flash_base(),
            page_size: soc.page_size(),
            mem: vec![ERASED; soc.flash_size() as usize],
            unlocked: false,
        };
        flash.persist()?;
        Ok(flash)
    }

    pub fn open(path: impl Into<PathBuf>, soc: SoC) -> Result<Self> {
        let path = path.into();
        let mem = fs::read(&path)?;
        if mem.len() != soc.flash_size() as usize {
            return Err(Error::FlashImageSize {
                expected: soc.flash_size() as usize,
                actual: mem.len(),
            });
        }

        Ok(Self {
            path,
            base: soc.flash_base(),
            page_size: soc.page_size(),
            mem,
            unlocked: false,
        })
    }

    fn persist(&self) -> std::io::Result<()> {
        fs::write(&self.path, &self.mem)
    }

    fn offset(&self, addr: u32, len: usize) -> FlashResult<usize> {
        let end = self.base as usize + self.mem.len();
        if addr < self.base || addr as usize + len > end {
            return Err(FlashError::OutOfRange(addr));
        }
        Ok((addr - self.base) as usize)
    }
}

impl Flash for FileFlash {
    fn unlock(&mut self) -> FlashResult<()> {
        self.unlocked = true;
        Ok(())
    }

    fn lock(&mut self) -> FlashResult<()> {
        self.unlocked = false;
        self.persist().map_err(|e| {
            error!("Unable to write {}: {e}", self.path.display());
            FlashError::Lock
        })
    }

    fn erase_pages(&mut self, start: u32, count: u32) -> FlashResult<()> {
        if !self.unlocked {
            return Err(FlashError::Locked);
        }
        let start = self.offset(start, 0)? as u32;
        let start = start - start % self.page_size;
        let len = (count * self.page_size) as usize;
        let offset = self.offset(self.base + start, len)?;

        trace!("Erasing {count} pages at {:#010x}", self.base + start);
        self.mem[offset..offset + len].fill(ERASED);
        Ok(())
    }

    fn program_halfword(&mut self, addr: u32, value: u16) -> FlashResult<()> {
        if !self.unlocked {
            return Err(FlashError::Locked);
        }
        if addr % 2 != 0 {
            return Err(FlashError::Unaligned(addr));
        }
        let offset = self.offset(addr, 2)?;
        if self.mem[offset..offset + 2] != [ERASED; 2] {
            return Err(FlashError::Program(addr));
        }

        self.mem[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> FlashResult<()> {
        let offset = self.offset(addr, buf.len())?;
        buf.copy_from_slice(&self.mem[offset..offset + buf.len()]);
        Ok(())
    }
}
