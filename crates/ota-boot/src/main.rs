use std::{
    io::{Write, stdout},
    path::PathBuf,
    thread::sleep,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use colored::Colorize;
use log::{info, warn};
use ota_engine::{BootOutcome, ConfigStore, RebootCause, Record, boot, run_attempt, select};
use ota_port::{Flash, Port};
use ota_protocol::{Protocol, packet::MAX_FRAME};
use ota_soc::SoC;
use serialport::{SerialPortType, available_ports};

use crate::{err::Error, flash_file::FileFlash};

mod err;
mod flash_file;
mod logging;

type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Copy, ValueEnum)]
#[clap(rename_all = "kebab_case")]
enum Target {
    /// STM32F103 high-density, 256 KiB flash
    Stm32f103xc,
}

impl From<Target> for SoC {
    fn from(target: Target) -> Self {
        match target {
            Target::Stm32f103xc => SoC::Stm32f103xc,
        }
    }
}

#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Flash image file standing in for the device memory
    #[arg(short, long, default_value = "flash.bin")]
    flash: PathBuf,

    /// Target part
    #[arg(short, long, value_enum, default_value_t = Target::Stm32f103xc)]
    target: Target,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an erased flash image holding the factory record
    Init,
    /// Print the persisted slot table
    Status,
    /// Run the boot selector, then receive firmware if the reboot cause asks for it
    Boot {
        #[command(flatten)]
        serial: Serial,

        /// Attempts before giving up, the peer restarts from the start command on each
        #[arg(short, long, default_value_t = 1)]
        attempts: u32,
    },
    /// Ask for an update attempt on the next start
    Request,
    /// Hex dump a flash region
    Dump {
        #[arg(value_parser=maybe_hex::<u32>)]
        address: u32,
        #[arg(value_parser=maybe_hex::<u32>, default_value = "0x100")]
        length: u32,
    },
    /// Run the boot selector, then receive firmware over the serial port
    Update {
        #[command(flatten)]
        serial: Serial,

        /// Attempts before giving up, the peer restarts from the start command on each
        #[arg(short, long, default_value_t = 1)]
        attempts: u32,
    },
}

#[derive(Args)]
struct Serial {
    /// Serial port, the only connected USB serial device if not set
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 115200)]
    baud: u32,

    /// Per-read timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout: u64,
}

fn find_port() -> Result<String> {
    progress!("Waiting for the device");
    loop {
        let ports: Vec<_> = available_ports()?
            .into_iter()
            .filter(|p| matches!(p.port_type, SerialPortType::UsbPort(_)))
            .collect();

        match ports.as_slice() {
            [] => progress!("."),
            [port] => {
                println!();
                return Ok(port.port_name.clone());
            }
            _ => return Err(Error::MoreThanOneDevice),
        }

        sleep(Duration::from_millis(500));
    }
}

fn open_port(serial: &Serial) -> Result<Port> {
    let name = match &serial.port {
        Some(name) => name.clone(),
        None => find_port()?,
    };

    println!("Opening {name} at {} baud", serial.baud);
    Ok(serialport::new(name, serial.baud)
        .timeout(Duration::from_millis(serial.timeout))
        .open()?)
}

fn print_record(record: &Record, soc: SoC) {
    for (i, slot) in record.slots.iter().enumerate() {
        match soc.slot_range(i) {
            Some(range) => println!("Slot {i} ({:#010x}..{:#010x})", range.start, range.end),
            None => println!("Slot {i}"),
        }
        y_n!("active", slot.active);
        y_n!("run requested", slot.run_requested);
        y_n_reverse!("dirty", slot.is_dirty());
        println!("  image: {} bytes, checksum {:#010x}", slot.image_size, slot.image_checksum);
    }
    println!("Reboot cause: {:?}", record.reboot_cause);
}

fn run_boot(flash: &mut FileFlash, soc: SoC) -> Result<BootOutcome> {
    progress!("Selecting the boot image...");
    let outcome = status!(select(flash, soc))?;

    let app = soc.app_addr();
    match outcome {
        BootOutcome::Activated { slot } => println!("Slot {slot} activated, jumping to {app:#x}"),
        BootOutcome::Verified { slot } => println!("Slot {slot} verified, jumping to {app:#x}"),
        BootOutcome::Factory => println!("Factory application, jumping to {app:#x}"),
    }
    Ok(outcome)
}

fn receive(flash: &mut FileFlash, soc: SoC, serial: &Serial, attempts: u32) -> Result<()> {
    let port = open_port(serial)?;
    let mut protocol = Protocol::new(
        port,
        [0; MAX_FRAME],
        Duration::from_millis(serial.timeout),
    );

    for attempt in 1..=attempts {
        progress!("Update attempt {attempt}/{attempts}...");
        match status!(run_attempt(&mut protocol, &mut *flash, soc)) {
            Ok(()) => {
                println!("Image stored, it runs after the next boot");
                return Ok(());
            }
            Err(e) => warn!("Attempt {attempt} failed: {e}"),
        }
    }

    Err(Error::AttemptsExhausted(attempts))
}

/// Startup enters an update attempt when the reboot cause asks for one.
fn wants_update(flash: &FileFlash, store: &ConfigStore) -> Result<bool> {
    let record = store.read(flash)?;
    if !boot::update_requested(&record) {
        return Ok(false);
    }

    info!("Reboot cause is {:?}, waiting for firmware", record.reboot_cause);
    Ok(true)
}

fn dump(flash: &FileFlash, address: u32, length: u32) -> Result<()> {
    let mut buf = vec![0; length as usize];
    flash.read(address, &mut buf)?;

    for (i, line) in buf.chunks(16).enumerate() {
        let hex: Vec<_> = line.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:#010x}: {}", address + (i * 16) as u32, hex.join(" "));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let soc = SoC::from(cli.target);
    let store = ConfigStore::for_soc(&soc);

    let mut flash = match cli.command {
        Command::Init => FileFlash::create(&cli.flash, soc)?,
        _ => FileFlash::open(&cli.flash, soc)?,
    };

    match cli.command {
        Command::Init => {
            progress!("Writing the factory record...");
            status!(store.initialize(&mut flash))?;
            Ok(())
        }
        Command::Status => {
            print_record(&store.read(&flash)?, soc);
            Ok(())
        }
        Command::Boot { serial, attempts } => {
            run_boot(&mut flash, soc)?;
            if wants_update(&flash, &store)? {
                receive(&mut flash, soc, &serial, attempts)
            } else {
                Ok(())
            }
        }
        Command::Request => {
            progress!("Requesting an update...");
            status!(store.update(&mut flash, |record| {
                record.reboot_cause = RebootCause::UpdateRequested;
                Ok(())
            }))
            .map_err(|e| e.into())
        }
        Command::Dump { address, length } => dump(&flash, address, length),
        Command::Update { serial, attempts } => {
            run_boot(&mut flash, soc)?;
            receive(&mut flash, soc, &serial, attempts)
        }
    }
}

fn main() -> core::result::Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    run(Cli::parse()).map_err(|e| e.to_string())
}
