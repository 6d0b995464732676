mod common;

use common::{RamFlash, SOC, ScriptedPort, image, init_logger, protocol, transfer};
use ota_engine::{
    RebootCause, Session, SlotEntry, State, Updater, err::Error, run_attempt,
};
use ota_port::{err::FlashError, flash::ERASED};
use ota_protocol::{Command, Header, Packet, Status, checksum};

fn attempt(flash: &mut RamFlash, port: ScriptedPort) -> (Result<(), Error>, Vec<Status>) {
    let mut protocol = protocol(port);
    let result = run_attempt(&mut protocol, flash, SOC);
    (result, protocol.into_inner().responses())
}

#[test]
fn full_transfer_requests_the_new_slot() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let image = image(2048);

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&transfer(&image)));

    result.unwrap();
    assert_eq!(responses, [Status::Ack; 5]);

    let record = flash.record();
    assert_eq!(
        record.slots[0],
        SlotEntry {
            valid: false,
            active: false,
            run_requested: true,
            image_size: 2048,
            image_checksum: checksum(&image),
        }
    );
    assert_eq!(record.slots[1], SlotEntry::default());
    assert_eq!(record.reboot_cause, RebootCause::Normal);
    assert_eq!(flash.bytes(SOC.slot_addr(0).unwrap(), 2048), &image[..]);
    assert!(flash.is_locked());
}

#[test]
fn transfer_goes_to_the_inactive_slot_and_clears_other_requests() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let mut record = flash.record();
    record.slots[0].active = true;
    record.slots[0].run_requested = true;
    flash.set_record(&record);

    let image = image(100);
    let (result, _) = attempt(&mut flash, ScriptedPort::new(&transfer(&image)));
    result.unwrap();

    let record = flash.record();
    assert!(record.slots[0].active);
    assert!(!record.slots[0].run_requested);
    assert!(record.slots[1].run_requested);
    assert_eq!(record.slots[1].image_size, 100);
    assert_eq!(flash.bytes(SOC.slot_addr(1).unwrap(), 100), &image[..]);
}

#[test]
fn odd_final_chunk_is_padded_with_erased_byte() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let image = image(1025);

    let (result, _) = attempt(&mut flash, ScriptedPort::new(&transfer(&image)));
    result.unwrap();

    let written = flash.bytes(SOC.slot_addr(0).unwrap(), 1026);
    assert_eq!(&written[..1025], &image[..]);
    assert_eq!(written[1025], ERASED);
    assert_eq!(flash.record().slots[0].image_checksum, checksum(&image));
}

#[test]
fn odd_chunk_mid_image_is_rejected() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let image = image(1000);
    let packets = [
        Packet::Command(Command::Start),
        Packet::Header(Header::new(1000, checksum(&image))),
        Packet::Data(&image[..333]),
    ];

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets));

    assert!(matches!(result, Err(Error::UnalignedChunk(333))));
    assert_eq!(responses, [Status::Ack, Status::Ack, Status::Nack]);
}

#[test]
fn abort_in_any_state_leaves_the_record_alone() {
    init_logger();
    let image = image(3000);
    let packets = transfer(&image);

    // Every prefix short of the end command
    for fed in 0..packets.len() {
        let mut flash = RamFlash::initialized(SOC);
        let mut updater = Updater::new(&mut flash, SOC);
        let mut session = Session::start();
        for packet in &packets[..fed] {
            updater.process(&mut session, packet).unwrap();
        }
        drop(updater);
        let before = flash.record();

        let mut updater = Updater::new(&mut flash, SOC);
        let result = updater.process(&mut session, &Packet::Command(Command::Abort));
        assert!(result.unwrap_err().is_aborted(), "after {fed} packets");
        assert_eq!(flash.record(), before, "after {fed} packets");
    }
}

#[test]
fn abort_is_answered_with_nack() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let packets = [
        Packet::Command(Command::Start),
        Packet::Command(Command::Abort),
    ];

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets));

    assert!(result.unwrap_err().is_aborted());
    assert_eq!(responses, [Status::Ack, Status::Nack]);
    assert_eq!(flash.record(), RamFlash::initialized(SOC).record());
}

#[test]
fn mismatching_image_leaves_the_slot_dirty() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let image = image(2048);
    let data: Vec<_> = image.chunks(1024).map(Packet::Data).collect();
    let mut packets = vec![
        Packet::Command(Command::Start),
        Packet::Header(Header::new(2048, 0xdead_beef)),
    ];
    packets.extend(data);
    packets.push(Packet::Command(Command::End));

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets));

    assert!(matches!(
        result,
        Err(Error::ImageMismatch {
            expected: 0xdead_beef,
            ..
        })
    ));
    assert_eq!(responses.last(), Some(&Status::Nack));
    let record = flash.record();
    assert!(record.slots[0].is_dirty());
    assert!(!record.slots[0].run_requested);
    assert_eq!(record.reboot_cause, RebootCause::FirstBoot);
}

#[test]
fn dirty_slot_is_reused_by_the_next_attempt() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let good = image(1500);
    let mut bad = good.clone();
    bad[700] ^= 0x01;

    // Checksum of the good image over tampered bytes
    let mut packets = transfer(&bad);
    packets[1] = Packet::Header(Header::new(1500, checksum(&good)));
    let (result, _) = attempt(&mut flash, ScriptedPort::new(&packets));
    assert!(result.unwrap_err().is_image_mismatch());
    assert!(flash.record().slots[0].is_dirty());

    let (result, _) = attempt(&mut flash, ScriptedPort::new(&transfer(&good)));
    result.unwrap();

    let record = flash.record();
    assert!(!record.slots[0].is_dirty());
    assert!(record.slots[0].run_requested);
    assert_eq!(record.slots[1], SlotEntry::default());
    assert_eq!(flash.bytes(SOC.slot_addr(0).unwrap(), 1500), &good[..]);
}

#[test]
fn out_of_order_packet_ends_the_attempt() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let packets = [
        Packet::Command(Command::Start),
        Packet::Command(Command::End),
        Packet::Header(Header::new(4, 0)),
    ];

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets));

    assert!(matches!(
        result,
        Err(Error::UnexpectedPacket {
            state: State::AwaitingHeader,
            ..
        })
    ));
    assert_eq!(responses, [Status::Ack, Status::Nack]);
}

#[test]
fn corrupted_frame_is_answered_with_nack() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let mut port = ScriptedPort::new(&[Packet::Command(Command::Start)]);
    // Header frame with one payload bit flipped
    let mut frame = [0; 25];
    let len = Packet::Header(Header::new(64, 1)).encode(&mut frame).unwrap();
    frame[6] ^= 0x80;
    port.push_raw(&frame[..len]);

    let (result, responses) = attempt(&mut flash, port);

    assert!(result.unwrap_err().is_integrity());
    assert_eq!(responses, [Status::Ack, Status::Nack]);
}

#[test]
fn silent_peer_ends_the_attempt() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let image = image(2048);
    let packets = transfer(&image);

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets[..3]));

    assert!(result.unwrap_err().is_protocol());
    assert_eq!(responses, [Status::Ack, Status::Ack, Status::Ack, Status::Nack]);
    assert!(flash.record().slots[0].is_dirty());
}

#[test]
fn header_is_validated() {
    init_logger();
    let capacity = SOC.image_capacity();
    for (size, empty) in [(0, true), (capacity + 1, false)] {
        let mut flash = RamFlash::initialized(SOC);
        let packets = [
            Packet::Command(Command::Start),
            Packet::Header(Header::new(size, 0)),
        ];

        let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets));

        let err = result.unwrap_err();
        assert_eq!(err.is_empty_image(), empty);
        assert_eq!(err.is_image_too_large(), !empty);
        assert_eq!(responses, [Status::Ack, Status::Nack]);
    }
}

#[test]
fn every_slot_running_leaves_no_destination() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let mut record = flash.record();
    for slot in &mut record.slots {
        slot.active = true;
    }
    flash.set_record(&record);

    let image = image(16);
    let (result, _) = attempt(&mut flash, ScriptedPort::new(&transfer(&image)));

    assert!(result.unwrap_err().is_no_slot_available());
}

#[test]
fn program_failure_is_a_storage_error() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    flash.fail_program_at = Some(SOC.slot_addr(0).unwrap() + 1030);
    let image = image(2048);

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&transfer(&image)));

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Flash(FlashError::Program(_))));
    assert!(err.is_storage());
    assert_eq!(responses.last(), Some(&Status::Nack));
    assert!(flash.is_locked());
    assert!(flash.record().slots[0].is_dirty());
}

#[test]
fn failed_final_record_write_fails_the_attempt() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let config = SOC.config_addr();
    // The first data packet rewrites the record, the end command is the second write
    flash.fail_erase_at = Some(config);
    flash.erases_before_failure = 1;
    let image = image(2048);

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&transfer(&image)));

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Flash(FlashError::Erase(addr)) if addr == config));
    assert!(err.is_storage());
    assert_eq!(
        responses,
        [Status::Ack, Status::Ack, Status::Ack, Status::Ack, Status::Nack]
    );
    assert!(flash.is_locked());

    let record = flash.record();
    assert!(record.slots[0].is_dirty());
    assert!(!record.slots[0].run_requested);
    assert_eq!(record.reboot_cause, RebootCause::FirstBoot);
}

#[test]
fn overwriting_a_requested_slot_withdraws_the_request() {
    init_logger();
    let mut flash = RamFlash::initialized(SOC);
    let first = image(600);
    let (result, _) = attempt(&mut flash, ScriptedPort::new(&transfer(&first)));
    result.unwrap();
    assert!(flash.record().slots[0].run_requested);

    // Slot 0 isn't running yet, so the next transfer lands there again
    let second = image(2048);
    let packets = transfer(&second);
    let (result, _) = attempt(&mut flash, ScriptedPort::new(&packets[..3]));
    assert!(result.unwrap_err().is_protocol());

    let record = flash.record();
    assert!(record.slots[0].is_dirty());
    assert!(!record.slots[0].run_requested);
    assert_eq!(record.requested_slot(), None);
}

#[test]
fn unreadable_record_fails_the_header() {
    init_logger();
    let mut flash = RamFlash::new(SOC);
    let packets = [
        Packet::Command(Command::Start),
        Packet::Header(Header::new(8, 0)),
    ];

    let (result, responses) = attempt(&mut flash, ScriptedPort::new(&packets));

    assert!(result.unwrap_err().is_record_decode());
    assert_eq!(responses, [Status::Ack, Status::Nack]);
}

#[test]
fn idle_session_ignores_packets() {
    let mut flash = RamFlash::initialized(SOC);
    let mut updater = Updater::new(&mut flash, SOC);
    let mut session = Session::default();

    updater
        .process(&mut session, &Packet::Command(Command::Start))
        .unwrap();
    assert_eq!(session.state, State::Idle);
}
