//! Startup slot selection. Runs once, before any update attempt.

use derive_more::IsVariant;
use log::{error, info, warn};
use ota_port::Flash;
use ota_soc::SoC;

use crate::{
    Result,
    err::Error,
    flash::{checksum_region, copy_region},
    store::{ConfigStore, Record, RebootCause},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum BootOutcome {
    /// A freshly transferred slot was copied into the application region and made active
    Activated { slot: usize },
    /// The active slot still matches its recorded checksum
    Verified { slot: usize },
    /// No slot has ever been activated, the factory application runs as is
    Factory,
}

/// Decide which image runs.
///
/// A slot requesting a run wins if its image is intact. A dirty or damaged slot loses
/// its request and is marked dirty, the application region is left alone. Otherwise
/// the active slot is re-verified and a mismatch is fatal, there is no fallback image.
pub fn select<F: Flash + ?Sized>(flash: &mut F, soc: SoC) -> Result<BootOutcome> {
    let store = ConfigStore::for_soc(&soc);
    let mut record = store.read(&*flash)?;

    if let Some(slot) = record.requested_slot() {
        if slot_intact(&*flash, soc, &record, slot)? {
            activate(flash, soc, &store, record, slot)?;
            return Ok(BootOutcome::Activated { slot });
        }

        warn!("Slot {slot} isn't intact, dropping its run request");
        let entry = record.slot_mut(slot)?;
        entry.valid = true;
        entry.run_requested = false;
        store.write(&mut *flash, &record)?;
    }

    let Some(slot) = record.active_slot() else {
        warn!("No active slot, running the factory application");
        return Ok(BootOutcome::Factory);
    };

    let entry = record.slot(slot)?;
    let base = soc.slot_addr(slot).ok_or(Error::InvalidSlot(slot))?;
    let computed = checksum_region(&*flash, base, entry.image_size)?;
    if computed != entry.image_checksum {
        error!("Active slot {slot} failed verification, halting");
        return Err(Error::ActiveImageCorrupted {
            slot,
            expected: entry.image_checksum,
            computed,
        });
    }

    info!("Slot {slot} verified");
    Ok(BootOutcome::Verified { slot })
}

/// The slot holds a complete transfer that still matches its recorded checksum.
fn slot_intact<F: Flash + ?Sized>(
    flash: &F,
    soc: SoC,
    record: &Record,
    slot: usize,
) -> Result<bool> {
    let entry = record.slot(slot)?;
    if entry.is_dirty() {
        return Ok(false);
    }

    let base = soc.slot_addr(slot).ok_or(Error::InvalidSlot(slot))?;
    Ok(checksum_region(flash, base, entry.image_size)? == entry.image_checksum)
}

/// Copy `slot` into the application region, verify the copy, then persist.
///
/// Until the record is written `run_requested` stays set, so an interrupted
/// activation is simply repeated on the next start.
fn activate<F: Flash + ?Sized>(
    flash: &mut F,
    soc: SoC,
    store: &ConfigStore,
    mut record: Record,
    slot: usize,
) -> Result<()> {
    let entry = *record.slot(slot)?;
    let base = soc.slot_addr(slot).ok_or(Error::InvalidSlot(slot))?;
    info!(
        "Activating slot {slot}: {} bytes, checksum {:#010x}",
        entry.image_size, entry.image_checksum
    );

    copy_region(
        &mut *flash,
        base,
        soc.app_addr(),
        soc.image_pages(),
        entry.image_size,
    )?;
    let computed = checksum_region(&*flash, soc.app_addr(), entry.image_size)?;
    if computed != entry.image_checksum {
        return Err(Error::ImageMismatch {
            expected: entry.image_checksum,
            computed,
        });
    }

    for (i, entry) in record.slots.iter_mut().enumerate() {
        entry.active = i == slot;
        entry.run_requested = false;
    }
    store.write(flash, &record)
}

/// The runner should enter an update attempt after boot selection.
pub fn update_requested(record: &Record) -> bool {
    matches!(
        record.reboot_cause,
        RebootCause::FirstBoot | RebootCause::UpdateRequested
    )
}
