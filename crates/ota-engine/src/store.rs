//! Persisted slot table and reboot cause.
//!
//! The record is the unit of persistence: the flash can't rewrite a byte without
//! erasing its page, so every change reads the whole record, mutates the copy and
//! rewrites the whole page.

use bincode::{Decode, Encode};
use derive_ctor::ctor;
use derive_more::IsVariant;
use log::debug;
use ota_port::{Flash, flash::ERASED};
use ota_soc::{SLOT_COUNT, SoC};

use crate::{Result, err::Error, flash::FlashWriter};

/// Upper bound of the encoded record, well within one page.
const RECORD_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct SlotEntry {
    /// Set while a transfer into the slot is incomplete or its image failed verification
    pub valid: bool,
    /// The slot holds the running image
    pub active: bool,
    /// Promote the slot on the next boot
    pub run_requested: bool,
    pub image_size: u32,
    pub image_checksum: u32,
}

impl SlotEntry {
    pub fn is_dirty(&self) -> bool {
        self.valid
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode, IsVariant)]
pub enum RebootCause {
    #[default]
    FirstBoot,
    Normal,
    /// The application asks the bootloader for an update attempt
    UpdateRequested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct Record {
    pub slots: [SlotEntry; SLOT_COUNT],
    pub reboot_cause: RebootCause,
}

impl Record {
    /// First slot that is dirty from an earlier attempt or isn't running.
    pub fn find_available_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.valid || !slot.active)
    }

    pub fn active_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.active)
    }

    pub fn requested_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.run_requested)
    }

    pub fn slot(&self, slot: usize) -> Result<&SlotEntry> {
        self.slots.get(slot).ok_or(Error::InvalidSlot(slot))
    }

    pub fn slot_mut(&mut self, slot: usize) -> Result<&mut SlotEntry> {
        self.slots.get_mut(slot).ok_or(Error::InvalidSlot(slot))
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        bincode::encode_into_slice(self, buf, config()).map_err(Error::RecordEncode)
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        bincode::decode_from_slice(buf, config())
            .map(|r| r.0)
            .map_err(Error::RecordDecode)
    }
}

fn config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// Location of the record in flash.
#[derive(ctor, Debug, Clone, Copy)]
pub struct ConfigStore {
    addr: u32,
    pages: u32,
}

impl ConfigStore {
    pub fn for_soc(soc: &SoC) -> Self {
        Self::new(soc.config_addr(), soc.config_pages())
    }

    pub fn read<F: Flash + ?Sized>(&self, flash: &F) -> Result<Record> {
        let mut buf = [ERASED; RECORD_CAPACITY];
        flash.read(self.addr, &mut buf)?;
        Record::decode(&buf)
    }

    /// Erase the record page and program `record`.
    ///
    /// Nothing is committed unless this returns `Ok`.
    pub fn write<F: Flash + ?Sized>(&self, flash: &mut F, record: &Record) -> Result<()> {
        let mut buf = [ERASED; RECORD_CAPACITY];
        let len = record.encode(&mut buf)?;

        let mut writer = FlashWriter::unlock(&mut *flash)?;
        writer.erase(self.addr, self.pages)?;
        writer.program(self.addr, &buf[..len])?;
        writer.finish()?;

        if self.read(&*flash)? != *record {
            return Err(Error::RecordReadback);
        }

        debug!("Config record written: {record:?}");
        Ok(())
    }

    /// Read, let `f` mutate and rewrite the whole record.
    ///
    /// The record isn't written if `f` fails.
    pub fn update<F, R>(
        &self,
        flash: &mut F,
        f: impl FnOnce(&mut Record) -> Result<R>,
    ) -> Result<R>
    where
        F: Flash + ?Sized,
    {
        let mut record = self.read(&*flash)?;
        let ret = f(&mut record)?;
        self.write(flash, &record)?;
        Ok(ret)
    }

    /// Write the factory record.
    pub fn initialize<F: Flash + ?Sized>(&self, flash: &mut F) -> Result<Record> {
        let record = Record::default();
        self.write(flash, &record)?;
        Ok(record)
    }
}
