//! Update transfer state machine and the attempt loop driving it.

use core::fmt::{self, Display};

use derive_more::IsVariant;
use log::{debug, info, warn};
use ota_port::{Flash, SimpleRead, SimpleWrite};
use ota_protocol::{Command, Header, Packet, Protocol, Status};
use ota_soc::SoC;

use crate::{
    Result,
    err::Error,
    flash::{FlashWriter, checksum_region},
    store::{ConfigStore, RebootCause},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IsVariant)]
pub enum State {
    /// Attempt finished, or never started
    #[default]
    Idle,
    AwaitingStart,
    AwaitingHeader,
    ReceivingData,
    AwaitingEnd,
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingStart => write!(f, "awaiting start"),
            Self::AwaitingHeader => write!(f, "awaiting header"),
            Self::ReceivingData => write!(f, "receiving data"),
            Self::AwaitingEnd => write!(f, "awaiting end"),
        }
    }
}

/// Transfer state of one attempt. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: State,
    /// Destination picked when the header was accepted
    pub slot: Option<usize>,
    pub image_size: u32,
    pub image_checksum: u32,
    pub received: u32,
}

impl Session {
    /// Fresh session waiting for the start command.
    pub fn start() -> Self {
        Self {
            state: State::AwaitingStart,
            ..Default::default()
        }
    }
}

/// Applies packets to a [`Session`], writing firmware into a slot and keeping the
/// config record in step.
pub struct Updater<'a, F: Flash + ?Sized> {
    flash: &'a mut F,
    soc: SoC,
    store: ConfigStore,
}

impl<'a, F: Flash + ?Sized> Updater<'a, F> {
    pub fn new(flash: &'a mut F, soc: SoC) -> Self {
        Self {
            flash,
            soc,
            store: ConfigStore::for_soc(&soc),
        }
    }

    /// Apply `packet` to `session`.
    ///
    /// Any error ends the attempt; the session must not be fed again afterwards.
    pub fn process(&mut self, session: &mut Session, packet: &Packet<'_>) -> Result<()> {
        if let Packet::Command(Command::Abort) = packet {
            warn!("Update aborted by the peer in {} state", session.state);
            return Err(Error::Aborted);
        }

        match (session.state, packet) {
            (State::Idle, _) => Ok(()),
            (State::AwaitingStart, Packet::Command(Command::Start)) => {
                info!("Received OTA start command");
                session.state = State::AwaitingHeader;
                Ok(())
            }
            (State::AwaitingHeader, Packet::Header(header)) => self.on_header(session, header),
            (State::ReceivingData, Packet::Data(data)) => self.on_data(session, data),
            (State::AwaitingEnd, Packet::Command(Command::End)) => self.on_end(session),
            (state, packet) => Err(Error::UnexpectedPacket {
                state,
                kind: packet.kind(),
            }),
        }
    }

    fn on_header(&mut self, session: &mut Session, header: &Header) -> Result<()> {
        let capacity = self.soc.image_capacity();
        if header.image_size == 0 {
            return Err(Error::EmptyImage);
        }
        if header.image_size > capacity {
            return Err(Error::ImageTooLarge {
                size: header.image_size as usize,
                capacity,
            });
        }

        let slot = self
            .store
            .read(&*self.flash)?
            .find_available_slot()
            .ok_or(Error::NoSlotAvailable)?;

        info!(
            "Received OTA header: size {} checksum {:#010x}, writing to slot {slot}",
            header.image_size, header.image_checksum
        );
        session.slot = Some(slot);
        session.image_size = header.image_size;
        session.image_checksum = header.image_checksum;
        session.state = State::ReceivingData;
        Ok(())
    }

    fn on_data(&mut self, session: &mut Session, data: &[u8]) -> Result<()> {
        let slot = session.slot.ok_or(Error::NoSlotAvailable)?;
        let base = self.soc.slot_addr(slot).ok_or(Error::InvalidSlot(slot))?;
        let capacity = self.soc.image_capacity();

        let end = session.received as usize + data.len();
        if end > capacity as usize {
            return Err(Error::ImageTooLarge {
                size: end,
                capacity,
            });
        }
        let last = end >= session.image_size as usize;
        if !last && data.len() % 2 != 0 {
            return Err(Error::UnalignedChunk(data.len()));
        }

        let first = session.received == 0;
        if first {
            // Mark the slot dirty before any byte of it changes
            self.store.update(&mut *self.flash, |record| {
                let entry = record.slot_mut(slot)?;
                entry.valid = true;
                entry.run_requested = false;
                Ok(())
            })?;
        }

        let mut writer = FlashWriter::unlock(&mut *self.flash)?;
        if first {
            info!("Erasing slot {slot}");
            writer.erase(base, self.soc.image_pages())?;
        }
        writer.program(base + session.received, data)?;
        writer.finish()?;

        session.received = end as u32;
        debug!("[{}/{}]", session.received, session.image_size);

        if last {
            info!("Received {} bytes into slot {slot}", session.received);
            session.state = State::AwaitingEnd;
        }
        Ok(())
    }

    fn on_end(&mut self, session: &mut Session) -> Result<()> {
        info!("Received OTA end command");
        let slot = session.slot.ok_or(Error::NoSlotAvailable)?;
        let base = self.soc.slot_addr(slot).ok_or(Error::InvalidSlot(slot))?;

        let computed = checksum_region(&*self.flash, base, session.image_size)?;
        if computed != session.image_checksum {
            return Err(Error::ImageMismatch {
                expected: session.image_checksum,
                computed,
            });
        }

        self.store.update(&mut *self.flash, |record| {
            for (i, entry) in record.slots.iter_mut().enumerate() {
                if i == slot {
                    entry.image_checksum = session.image_checksum;
                    entry.image_size = session.image_size;
                    entry.valid = false;
                    entry.run_requested = true;
                } else {
                    entry.run_requested = false;
                }
            }
            record.reboot_cause = RebootCause::Normal;
            Ok(())
        })?;

        info!("Slot {slot} verified and requested to run on next boot");
        session.state = State::Idle;
        Ok(())
    }
}

/// Run one update attempt over `protocol`.
///
/// Every packet is answered with ACK, or NACK followed by returning the error. There is
/// no retry and no resume: the peer starts over from the start command.
pub fn run_attempt<T, F, const N: usize>(
    protocol: &mut Protocol<T, N>,
    flash: &mut F,
    soc: SoC,
) -> Result<()>
where
    T: SimpleRead + SimpleWrite,
    F: Flash + ?Sized,
{
    info!("Waiting for the OTA firmware");
    let mut updater = Updater::new(flash, soc);
    let mut session = Session::start();

    loop {
        let result = match protocol.read_packet() {
            Ok(packet) => updater.process(&mut session, &packet),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            warn!("Sending NACK: {e}");
            if let Err(send) = protocol.send_response(Status::Nack) {
                warn!("Unable to send NACK: {send}");
            }
            return Err(e);
        }

        protocol.send_response(Status::Ack)?;
        if session.state.is_idle() {
            info!("Update complete");
            return Ok(());
        }
    }
}
