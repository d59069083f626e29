use std::io;

use log::debug;
use miette::Result;

use crate::error;
use crate::memory::MEMORY_MAX;
use crate::ops::{Instr, TrapVect};
use crate::runtime::{RunState, Status};
use crate::term::Terminal;

const IN_PROMPT: &str = "Enter a character: ";
const HALT_MESSAGE: &str = "HALT";

impl RunState {
    /// Run the service routine for the vector of `instr`, fetched from `pc`.
    ///
    /// `R7` is left untouched; execution continues after the `TRAP` unless it halted.
    pub(crate) fn trap(&mut self, instr: Instr, pc: u16, io: &mut impl Terminal) -> Result<()> {
        let vect = instr.trap_vect();
        let trap = TrapVect::try_from(vect).map_err(|vect| error::unknown_trap(vect, pc))?;
        match trap {
            TrapVect::Getc => {
                if let Some(ch) = self.read_input(io)? {
                    self.reg.set(0, ch as u16);
                }
            }
            TrapVect::Out => {
                let ch = (self.reg.get(0) & 0xFF) as u8;
                self.put_char(ch, io)?;
            }
            TrapVect::Puts => {
                let start = self.reg.get(0);
                for addr in string_addrs(start) {
                    let ch = (self.mem.peek(addr) & 0xFF) as u8;
                    if ch == 0 {
                        break;
                    }
                    self.put_char(ch, io)?;
                }
            }
            TrapVect::In => {
                self.put_str(IN_PROMPT, io)?;
                io.flush().map_err(error::terminal)?;
                if let Some(ch) = self.read_input(io)? {
                    self.put_char(ch, io)?;
                    self.reg.set(0, ch as u16);
                }
            }
            TrapVect::Putsp => {
                let start = self.reg.get(0);
                'string: for addr in string_addrs(start) {
                    let word = self.mem.peek(addr);
                    // Low byte first
                    for ch in [(word & 0xFF) as u8, (word >> 8) as u8] {
                        if ch == 0 {
                            break 'string;
                        }
                        self.put_char(ch, io)?;
                    }
                }
            }
            TrapVect::Halt => {
                if !self.line_start {
                    self.put_char(b'\n', io)?;
                }
                self.put_str(HALT_MESSAGE, io)?;
                self.put_char(b'\n', io)?;
                self.status = Status::Halted;
                debug!("halted at 0x{pc:04x}");
            }
        }
        io.flush().map_err(error::terminal)
    }

    /// Block for one byte. `None` if the operator interrupted instead.
    fn read_input(&mut self, io: &mut impl Terminal) -> Result<Option<u8>> {
        match io.read_byte() {
            Ok(ch) => Ok(Some(ch)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                self.status = Status::Interrupted;
                Ok(None)
            }
            Err(e) => Err(error::terminal(e)),
        }
    }

    fn put_char(&mut self, ch: u8, io: &mut impl Terminal) -> Result<()> {
        io.write_byte(ch).map_err(error::terminal)?;
        self.line_start = ch == b'\n';
        Ok(())
    }

    fn put_str(&mut self, string: &str, io: &mut impl Terminal) -> Result<()> {
        for ch in string.bytes() {
            self.put_char(ch, io)?;
        }
        Ok(())
    }
}

/// Every address once, starting at `start` and wrapping past the top of memory.
fn string_addrs(start: u16) -> impl Iterator<Item = u16> {
    (0..MEMORY_MAX).map(move |i| start.wrapping_add(i as u16))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::image::Image;
    use crate::runtime::PC_START;
    use crate::term::Scripted;

    fn machine(program: &[u16]) -> RunState {
        let mut state = RunState::new();
        state.load(&Image {
            orig: PC_START,
            words: program.to_vec(),
        });
        state
    }

    /// Store one character per word, at `addr`.
    fn store_str(state: &mut RunState, addr: u16, string: &[u8]) {
        for (i, ch) in string.iter().enumerate() {
            state.memory_mut().write(addr + i as u16, *ch as u16);
        }
    }

    #[test]
    fn getc_does_not_echo() {
        let mut state = machine(&[0xF020]);
        let mut io = Scripted::new("a");
        state.step(&mut io).unwrap();
        assert_eq!(state.reg(0), b'a' as u16);
        assert!(io.output().is_empty());
    }

    #[test]
    fn getc_zero_extends() {
        let mut state = machine(&[0xF020]);
        state.set_reg(0, 0xFFFF);
        let mut io = Scripted::new([0xE9u8]);
        state.step(&mut io).unwrap();
        assert_eq!(state.reg(0), 0x00E9);
    }

    #[test]
    fn getc_without_input() {
        let mut state = machine(&[0xF020]);
        let mut io = Scripted::new("");
        let err = state.step(&mut io).unwrap_err();
        assert!(err.to_string().contains("Terminal I/O failed"), "{err}");
    }

    #[test]
    fn getc_interrupted() {
        let mut state = machine(&[0xF020]);
        let mut io = Scripted::new("a");
        io.interrupt();
        state.step(&mut io).unwrap();
        assert_eq!(state.status(), Status::Interrupted);
        assert_eq!(state.reg(0), 0);
    }

    #[test]
    fn out_uses_low_byte() {
        let mut state = machine(&[0xF021]);
        state.set_reg(0, 0x4142);
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert_eq!(io.output(), b"B");
    }

    #[test]
    fn traps_leave_flags_and_r7() {
        let mut state = machine(&[0xF021]);
        state.set_reg(0, b'x' as u16);
        state.set_reg(7, 0x1234);
        let flag = state.flag();
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert_eq!(state.reg(7), 0x1234);
        assert_eq!(state.flag(), flag);
        assert_eq!(state.pc(), 0x3001);
    }

    #[test]
    fn puts_stops_at_zero() {
        let mut state = machine(&[0xF022]);
        store_str(&mut state, 0x4000, b"Hi\0X");
        state.set_reg(0, 0x4000);
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert_eq!(io.output(), b"Hi");
    }

    #[test]
    fn puts_ignores_high_byte() {
        let mut state = machine(&[0xF022]);
        state.memory_mut().write(0x4000, 0x7F41);
        state.set_reg(0, 0x4000);
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert_eq!(io.output(), b"A");
    }

    #[test]
    fn puts_does_not_poll_keyboard() {
        let mut state = machine(&[0xF022]);
        state.memory_mut().write(0xFE00, 0);
        state.set_reg(0, 0xFE00);
        let mut io = Scripted::new("k");
        state.step(&mut io).unwrap();
        assert!(io.output().is_empty());
        assert_eq!(io.remaining(), 1);
    }

    #[test]
    fn in_prompts_and_echoes() {
        let mut state = machine(&[0xF023]);
        let mut io = Scripted::new("z");
        state.step(&mut io).unwrap();
        assert_eq!(state.reg(0), b'z' as u16);
        assert_eq!(io.output_str(), format!("{IN_PROMPT}z"));
    }

    #[test]
    fn putsp_low_byte_first() {
        let mut state = machine(&[0xF024]);
        // "abc"
        state.memory_mut().write(0x4000, 0x6261);
        state.memory_mut().write(0x4001, 0x0063);
        state.memory_mut().write(0x4002, 0x6464);
        state.set_reg(0, 0x4000);
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert_eq!(io.output(), b"abc");
    }

    #[test]
    fn putsp_stops_at_zero_low_byte() {
        let mut state = machine(&[0xF024]);
        state.memory_mut().write(0x4000, 0x6100);
        state.set_reg(0, 0x4000);
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert!(io.output().is_empty());
    }

    #[test]
    fn halt() {
        let mut state = machine(&[0xF025]);
        let mut io = Scripted::new("");
        state.step(&mut io).unwrap();
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(io.output_str(), "HALT\n");
    }

    #[test]
    fn halt_starts_new_line() {
        // OUT ; HALT
        let mut state = machine(&[0xF021, 0xF025]);
        state.set_reg(0, b'!' as u16);
        let mut io = Scripted::new("");
        assert_eq!(state.run(&mut io, None).unwrap(), Status::Halted);
        assert_eq!(io.output_str(), "!\nHALT\n");
    }

    #[test]
    fn hello_world() {
        // LEA R0, #2 ; PUTS ; HALT ; "Hello"
        let mut state = machine(&[0xE002, 0xF022, 0xF025]);
        store_str(&mut state, 0x3003, b"Hello\0");
        let mut io = Scripted::new("");
        assert_eq!(state.run(&mut io, Some(100)).unwrap(), Status::Halted);
        assert_eq!(io.output_str(), "Hello\nHALT\n");
    }

    #[test]
    fn unknown_vector() {
        let mut state = machine(&[0xF0FF]);
        let mut io = Scripted::new("");
        let err = state.step(&mut io).unwrap_err();
        assert!(err.to_string().contains("0xff"), "{err}");
    }
}
