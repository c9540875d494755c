//! LC-3 VM - CLI Entry Point
//!
//! `lc3-vm [--start ADDR] [--dump-state PATH] <image>...`
//!
//! Loads each object image in order, then runs from the start address until
//! the program halts. Exit status: 0 on HALT, 1 if an image cannot be
//! loaded, 2 on bad usage, 3 on a fatal machine error, 4 on console I/O
//! failure, 130 when interrupted by Ctrl-C or by SIGINT, SIGTERM or SIGHUP.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use lc3::{
    Console, ConsoleError, Image, Interrupt, Machine, MachineError, StreamConsole, TerminalConsole,
};

const EXIT_IMAGE: u8 = 1;
const EXIT_FAULT: u8 = 3;
const EXIT_CONSOLE: u8 = 4;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "lc3-vm")]
#[command(version)]
#[command(about = "An emulator of the LC-3 16-bit teaching computer")]
struct Cli {
    /// Object images to load, in order
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Address at which to start executing (decimal or 0x-prefixed hex)
    #[arg(long, default_value = "0x3000", value_parser = parse_addr)]
    start: u16,

    /// Write a JSON snapshot of the registers to this file when the run ends
    #[arg(long)]
    dump_state: Option<PathBuf>,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn main() -> ExitCode {
    env_logger::init();

    // Usage errors exit with status 2 from inside clap.
    let cli = Cli::parse();

    let mut images = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        match Image::read(path) {
            Ok(image) => images.push(image),
            Err(e) => {
                eprintln!("lc3-vm: {}", e);
                return ExitCode::from(EXIT_IMAGE);
            }
        }
    }

    // A signal only raises the flag; the run loop then unwinds normally so
    // the terminal guard is dropped before the process exits.
    let interrupt = Interrupt::new();
    let raised = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || raised.raise()) {
        warn!("cannot install signal handler: {}", e);
    }

    let console: Box<dyn Console> = if std::io::stdin().is_terminal() {
        match TerminalConsole::new() {
            Ok(console) => Box::new(console.with_interrupt(interrupt)),
            Err(e) => {
                eprintln!("lc3-vm: cannot set up terminal: {}", e);
                return ExitCode::from(EXIT_CONSOLE);
            }
        }
    } else {
        Box::new(StreamConsole::new(std::io::stdin(), std::io::stdout()).with_interrupt(interrupt))
    };

    let mut machine = Machine::new(console);
    for image in &images {
        machine.load_image(image);
    }
    machine.set_pc(cli.start);
    info!("starting at {:#06x}", cli.start);

    let result = machine.run();
    let snapshot = machine.snapshot();

    // Dropping the machine drops the console, which restores the terminal
    // before anything else is printed.
    drop(machine);

    if let Some(path) = &cli.dump_state {
        if let Err(e) = write_snapshot(path, &snapshot) {
            error!("failed to write state to {}: {}", path.display(), e);
        }
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(MachineError::Console(ConsoleError::Interrupted)) => {
            eprintln!();
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(MachineError::Console(e)) => {
            eprintln!("lc3-vm: {}", e);
            ExitCode::from(EXIT_CONSOLE)
        }
        Err(e) => {
            eprintln!("lc3-vm: {} (PC={:#06x})", e, snapshot.regs.pc);
            ExitCode::from(EXIT_FAULT)
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &lc3::cpu::Snapshot) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)
}
