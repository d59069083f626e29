use std::fmt::Display;
use std::path::Path;

use colored::Colorize;

use crate::runtime::RunState;

#[derive(Clone, Copy, Debug)]
pub enum MsgColor {
    Green,
    Cyan,
    Red,
}

/// Host-side messages, printed to stderr so they never mix with program output.
#[derive(Clone, Copy, Debug, Default)]
pub struct Output {
    /// Produce minimal output, suited for blackbox tests.
    minimal: bool,
}

impl Output {
    pub fn new(minimal: bool) -> Self {
        Self { minimal }
    }

    /// Status line, eg. `     Loading target hello.obj`. Skipped if minimal.
    pub fn message(&self, color: MsgColor, left: &str, right: impl Display) {
        if self.minimal {
            return;
        }
        let left = match color {
            MsgColor::Green => left.green(),
            MsgColor::Cyan => left.cyan(),
            MsgColor::Red => left.red(),
        };
        eprintln!("{left:>12} {right}");
    }

    pub fn file_message(&self, color: MsgColor, left: &str, path: &Path) {
        self.message(color, left, format!("target {}", path.display()));
    }

    pub fn print_registers(&self, state: &RunState) {
        eprint!("{}", self.registers(state));
    }

    fn registers(&self, state: &RunState) -> String {
        let mut out = String::new();
        if self.minimal {
            for i in 0..8 {
                out += &format!("R{} {}\n", i, state.reg(i));
            }
            out += &format!("PC {}\n", state.pc());
            out += &format!("CC {:03b}\n", state.flag() as u8);
            return out;
        }

        out += "\x1b[2m┌────────────────────────────────────┐\x1b[0m\n";
        out += "\x1b[2m│        \x1b[3mhex     int    uint    char\x1b[0m\x1b[2m │\x1b[0m\n";
        for i in 0..8 {
            out += &format!("\x1b[2m│\x1b[0m \x1b[1mR{}\x1b[0m  ", i);
            out += &integer(state.reg(i));
            out += " \x1b[2m│\x1b[0m\n";
        }
        out += &format!("\x1b[2m│\x1b[0m \x1b[1mPC\x1b[0m  0x{:04x}", state.pc());
        out += "                ";
        out += &format!(" \x1b[1mCC\x1b[0m  {:03b}", state.flag() as u8);
        out += " \x1b[2m│\x1b[0m\n";
        out += "\x1b[2m└────────────────────────────────────┘\x1b[0m\n";
        out
    }
}

fn integer(value: u16) -> String {
    format!(
        "0x{:04x}  {:-6}  {:-6}  {}",
        value,
        value as i16,
        value,
        char_display(value)
    )
}

/// Three columns wide.
fn char_display(value: u16) -> String {
    let display = match value {
        // ASCII control characters which are arbitrarily considered significant
        0x00 => "NUL",
        0x08 => "BS ",
        0x09 => "HT ",
        0x0a => "LF ",
        0x0b => "VT ",
        0x0c => "FF ",
        0x0d => "CR ",
        0x1b => "ESC",
        0x7f => "DEL",

        // Space
        0x20 => "[_]",

        // Printable ASCII characters
        0x21..=0x7e => return format!("{:<3}", value as u8 as char),

        // Any ASCII character not already matched (unimportant control characters)
        0x00..=0x7f => "\x1b[2m───\x1b[0m",
        // Any non-ASCII character
        0x0080.. => "\x1b[2m┄┄┄\x1b[0m",
    };
    display.to_string()
}
