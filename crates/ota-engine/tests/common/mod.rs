#![allow(dead_code)]

use std::{collections::VecDeque, time::Duration};

use ota_engine::{ConfigStore, Record};
use ota_port::{
    Flash, SimpleRead, SimpleWrite,
    err::{Error as PortError, FlashError},
    flash::{ERASED, FlashResult},
};
use ota_protocol::{Command, Header, Packet, Protocol, Status, checksum, packet::MAX_FRAME};
use ota_soc::SoC;

pub const SOC: SoC = SoC::Stm32f103xc;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Flash array in RAM, enforcing the same rules as the real controller.
pub struct RamFlash {
    base: u32,
    page_size: u32,
    mem: Vec<u8>,
    unlocked: bool,
    /// Fail programming the halfword at this address
    pub fail_program_at: Option<u32>,
    /// Fail erasing the page at this address
    pub fail_erase_at: Option<u32>,
    /// Erases of that page to let through before failing
    pub erases_before_failure: usize,
}

impl RamFlash {
    pub fn new(soc: SoC) -> Self {
        Self {
            base: soc.flash_base(),
            page_size: soc.page_size(),
            mem: vec![ERASED; soc.flash_size() as usize],
            unlocked: false,
            fail_program_at: None,
            fail_erase_at: None,
            erases_before_failure: 0,
        }
    }

    /// Flash with a factory config record.
    pub fn initialized(soc: SoC) -> Self {
        let mut flash = Self::new(soc);
        ConfigStore::for_soc(&soc).initialize(&mut flash).unwrap();
        flash
    }

    pub fn is_locked(&self) -> bool {
        !self.unlocked
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        let offset = (addr - self.base) as usize;
        &self.mem[offset..offset + len]
    }

    /// Overwrite raw content, bypassing the controller.
    pub fn poke(&mut self, addr: u32, bytes: &[u8]) {
        let offset = (addr - self.base) as usize;
        self.mem[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn record(&self) -> Record {
        ConfigStore::for_soc(&SOC).read(self).unwrap()
    }

    pub fn set_record(&mut self, record: &Record) {
        ConfigStore::for_soc(&SOC).write(self, record).unwrap();
    }

    fn offset(&self, addr: u32, len: usize) -> FlashResult<usize> {
        let end = self.base as usize + self.mem.len();
        if addr < self.base || addr as usize + len > end {
            return Err(FlashError::OutOfRange(addr));
        }
        Ok((addr - self.base) as usize)
    }
}

impl Flash for RamFlash {
    fn unlock(&mut self) -> FlashResult<()> {
        self.unlocked = true;
        Ok(())
    }

    fn lock(&mut self) -> FlashResult<()> {
        self.unlocked = false;
        Ok(())
    }

    fn erase_pages(&mut self, start: u32, count: u32) -> FlashResult<()> {
        if !self.unlocked {
            return Err(FlashError::Locked);
        }
        let start = start - (start - self.base) % self.page_size;
        let len = (count * self.page_size) as usize;
        let offset = self.offset(start, len)?;

        if let Some(addr) = self.fail_erase_at {
            if (start..start + len as u32).contains(&addr) {
                if self.erases_before_failure == 0 {
                    return Err(FlashError::Erase(addr));
                }
                self.erases_before_failure -= 1;
            }
        }

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
        if self.fail_program_at == Some(addr) || self.mem[offset..offset + 2] != [ERASED; 2] {
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

/// Serial peer replaying queued frames and recording the responses.
#[derive(Default)]
pub struct ScriptedPort {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl ScriptedPort {
    pub fn new(packets: &[Packet]) -> Self {
        let mut port = Self::default();
        for packet in packets {
            port.push(packet);
        }
        port
    }

    pub fn push(&mut self, packet: &Packet) {
        let mut buf = [0; MAX_FRAME];
        let len = packet.encode(&mut buf).unwrap();
        self.push_raw(&buf[..len]);
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Statuses sent back so far, in order.
    pub fn responses(&self) -> Vec<Status> {
        let mut statuses = Vec::new();
        let mut rest = &self.tx[..];
        while !rest.is_empty() {
            let len = u16::from_le_bytes([rest[2], rest[3]]) as usize + 9;
            match Packet::decode(&rest[..len]).unwrap() {
                Packet::Response(status) => statuses.push(status),
                other => panic!("unexpected {other} sent back"),
            }
            rest = &rest[len..];
        }
        statuses
    }
}

impl SimpleRead for ScriptedPort {
    fn read(&mut self, buf: &mut [u8], _: Duration) -> ota_port::Result<()> {
        if self.rx.len() < buf.len() {
            self.rx.clear();
            return Err(PortError::Timeout);
        }
        for b in buf.iter_mut() {
            *b = self.rx.pop_front().unwrap();
        }
        Ok(())
    }
}

impl SimpleWrite for ScriptedPort {
    fn write(&mut self, buf: &[u8], _: Duration) -> ota_port::Result<()> {
        self.tx.extend_from_slice(buf);
        Ok(())
    }
}

pub fn protocol(port: ScriptedPort) -> Protocol<ScriptedPort, MAX_FRAME> {
    Protocol::new(port, [0; MAX_FRAME], Duration::from_millis(50))
}

/// Recognizable image content.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

/// Complete transfer of `image`, split into maximum sized chunks.
pub fn transfer(image: &[u8]) -> Vec<Packet<'_>> {
    let mut packets = vec![
        Packet::Command(Command::Start),
        Packet::Header(Header::new(image.len() as u32, checksum(image))),
    ];
    packets.extend(image.chunks(1024).map(Packet::Data));
    packets.push(Packet::Command(Command::End));
    packets
}
