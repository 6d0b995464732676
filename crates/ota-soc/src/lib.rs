#![cfg_attr(not(test), no_std)]

use core::ops::Range;

use derive_more::IsVariant;

/// Number of alternating firmware slots.
pub const SLOT_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum SoC {
    /// STM32F103 high-density part, 256 KiB flash with 2 KiB pages.
    ///
    /// The bootloader keeps the first 16 KiB.
    Stm32f103xc,
}

impl SoC {
    /// Start of the flash array.
    pub const fn flash_base(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 0x0800_0000,
        }
    }

    /// Size of the flash array the layout uses.
    pub const fn flash_size(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 0x0004_0000,
        }
    }

    /// Erase granularity.
    pub const fn page_size(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 0x800,
        }
    }

    /// Persisted configuration record page.
    pub const fn config_addr(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 0x0800_4000,
        }
    }

    pub const fn config_pages(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 1,
        }
    }

    /// Region the bootloader jumps to.
    pub const fn app_addr(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 0x0800_4800,
        }
    }

    /// Pages per image region, the same for the application region and every slot.
    pub const fn image_pages(&self) -> u32 {
        match self {
            Self::Stm32f103xc => 39,
        }
    }

    pub const fn image_capacity(&self) -> u32 {
        self.image_pages() * self.page_size()
    }

    /// Base address of firmware slot `slot`, `None` past [`SLOT_COUNT`].
    pub const fn slot_addr(&self, slot: usize) -> Option<u32> {
        match (self, slot) {
            (Self::Stm32f103xc, 0) => Some(0x0801_8000),
            (Self::Stm32f103xc, 1) => Some(0x0802_b800),
            _ => None,
        }
    }

    pub fn slot_range(&self, slot: usize) -> Option<Range<u32>> {
        self.slot_addr(slot)
            .map(|addr| addr..addr + self.image_capacity())
    }

    pub fn app_range(&self) -> Range<u32> {
        self.app_addr()..self.app_addr() + self.image_capacity()
    }

    pub fn config_range(&self) -> Range<u32> {
        self.config_addr()..self.config_addr() + self.config_pages() * self.page_size()
    }
}
