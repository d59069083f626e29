use std::io;
use std::path::Path;

use miette::{miette, Report, Severity};

use crate::ops::{Instr, Opcode};

// Image errors

pub fn image_open(path: &Path, e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::open",
        help = "check that the path names a readable object file",
        "Cannot read image {}: {e}",
        path.display(),
    )
}

pub fn image_truncated(path: &Path, len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::truncated",
        help = "an image starts with a 2-byte big-endian origin address",
        "Image {} is too short to hold an origin ({len} bytes)",
        path.display(),
    )
}

// Runtime errors

pub fn reserved_opcode(op: Opcode, pc: u16, instr: Instr) -> Report {
    miette!(
        severity = Severity::Error,
        code = "runtime::reserved_opcode",
        help = "RTI and the reserved opcode are not supported by this machine",
        "Encountered {op} at 0x{pc:04x} (0x{:04x})",
        instr.0,
    )
}

pub fn unknown_trap(vect: u8, pc: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "runtime::unknown_trap",
        help = "available traps are GETC, OUT, PUTS, IN, PUTSP and HALT (0x20-0x25)",
        "Called a trap with an unknown vector of 0x{vect:02x} at 0x{pc:04x}",
    )
}

pub fn terminal(e: io::Error) -> Report {
    let help = if e.kind() == io::ErrorKind::UnexpectedEof {
        "the program asked for more input than was provided"
    } else {
        "the terminal could not be read or written"
    };
    miette!(
        severity = Severity::Error,
        code = "term::io",
        help = help,
        "Terminal I/O failed: {e}",
    )
}
