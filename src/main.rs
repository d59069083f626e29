use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use miette::{IntoDiagnostic, Result};
use simple_logger::SimpleLogger;

use lc3vm::output::{MsgColor, Output};
use lc3vm::term::{Console, RawMode};
use lc3vm::{Image, RunState, Status};

/// Exit code after the operator stops the machine, with Ctrl+C or a signal.
const EXIT_INTERRUPTED: i32 = 130;

/// Run LC3 object images on a virtual machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// `.obj` images to load, in order, before execution starts
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
    /// Print registers once the machine stops
    #[arg(short, long)]
    registers: bool,
    /// Stop after executing this many instructions
    #[arg(short, long, value_name = "COUNT")]
    limit: Option<u64>,
    /// Log more detail (`-v` debug, `-vv` every instruction)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .into_diagnostic()?;

    let out = Output::new(args.minimal);
    let mut state = RunState::new();
    for path in &args.images {
        out.file_message(MsgColor::Green, "Loading", path);
        state.load(&Image::read(path)?);
    }

    out.message(MsgColor::Green, "Running", "loaded images");
    let mut console = Console::new();
    console.watch_signals().into_diagnostic()?;
    // Terminal is restored when `_raw` drops, before any error is reported
    let status = {
        let _raw = RawMode::enable(&console).into_diagnostic()?;
        state.run(&mut console, args.limit)
    }?;

    match status {
        Status::Halted => out.message(MsgColor::Cyan, "Halted", "machine stopped"),
        Status::LimitReached => {
            out.message(MsgColor::Cyan, "Stopped", "instruction limit reached")
        }
        Status::Interrupted => out.message(MsgColor::Red, "Interrupted", "stopped by operator"),
        Status::Running => unreachable!("run returned while still running"),
    }
    if args.registers {
        out.print_registers(&state);
    }
    if status == Status::Interrupted {
        std::process::exit(EXIT_INTERRUPTED);
    }
    Ok(())
}

