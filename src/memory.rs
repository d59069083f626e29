use std::io;

use crate::term::Terminal;

/// LC3 can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Keyboard status register. Bit 15 is set while a key is waiting in [`KBDR`].
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register. Reading it consumes the waiting key.
pub const KBDR: u16 = 0xFE02;

const KEY_READY: u16 = 0x8000;

/// System memory, with the keyboard mapped onto [`KBSR`] and [`KBDR`].
pub struct Memory {
    cells: Box<[u16; MEMORY_MAX]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            cells: Box::new([0; MEMORY_MAX]),
        }
    }

    /// Read a cell as the running program sees it.
    ///
    /// Polling `KBSR` fetches a key into `KBDR` if one is available, but does not consume it;
    /// reading `KBDR` does.
    pub fn read(&mut self, addr: u16, io: &mut impl Terminal) -> io::Result<u16> {
        match addr {
            KBSR => {
                if self.cells[KBSR as usize] & KEY_READY == 0 && io.key_available()? {
                    match io.read_byte() {
                        Ok(byte) => {
                            self.cells[KBDR as usize] = byte as u16;
                            self.cells[KBSR as usize] = KEY_READY;
                        }
                        // Stop request arrived between the two calls; runtime picks it up
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => (),
                        Err(e) => return Err(e),
                    }
                }
            }
            KBDR => {
                self.cells[KBSR as usize] &= !KEY_READY;
            }
            _ => (),
        }
        Ok(self.cells[addr as usize])
    }

    /// Read a cell without any device side effects.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u16) {
        self.cells[addr as usize] = val;
    }

    /// Copy `words` in starting at `orig`, wrapping past the top of memory.
    pub fn load(&mut self, orig: u16, words: &[u16]) {
        let mut addr = orig;
        for word in words {
            self.write(addr, *word);
            addr = addr.wrapping_add(1);
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
