use std::cmp::Ordering;

use log::{debug, trace};
use miette::{IntoDiagnostic, Result};

use crate::error;
use crate::image::Image;
use crate::memory::Memory;
use crate::ops::{Instr, Opcode};
use crate::term::Terminal;

/// Programs start here, wherever their images were loaded.
pub const PC_START: u16 = 0x3000;

/// Instructions executed between checks for an operator interrupt.
const INTERRUPT_POLL_INTERVAL: u64 = 4096;

/// Condition code. Exactly one is set at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunFlag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

/// Whether the machine is still fetching instructions, and if not, why.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    /// Stopped by the `HALT` trap.
    Halted,
    /// Stopped by the operator.
    Interrupted,
    /// Stopped after the instruction limit given to [`RunState::run`].
    LimitReached,
}

/// 8 general purpose registers, program counter and condition code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registers {
    gp: [u16; 8],
    pc: u16,
    flag: RunFlag,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            gp: [0; 8],
            pc: PC_START,
            flag: RunFlag::Z,
        }
    }

    /// Only the lowest 3 bits of `reg` are used.
    #[inline]
    pub fn get(&self, reg: u16) -> u16 {
        self.gp[(reg & 0b111) as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: u16, val: u16) {
        self.gp[(reg & 0b111) as usize] = val;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn flag(&self) -> RunFlag {
        self.flag
    }

    /// Set the condition code from the value now in `reg`.
    pub fn update_flags(&mut self, reg: u16) {
        self.flag = match (self.get(reg) as i16).cmp(&0) {
            Ordering::Less => RunFlag::N,
            Ordering::Equal => RunFlag::Z,
            Ordering::Greater => RunFlag::P,
        }
    }

    /// Write `val` into `reg` and set the condition code from it.
    fn set_with_flags(&mut self, reg: u16, val: u16) {
        self.set(reg, val);
        self.update_flags(reg);
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents complete machine state during runtime.
pub struct RunState {
    pub(crate) mem: Memory,
    pub(crate) reg: Registers,
    pub(crate) status: Status,
    /// Whether the last byte written to the terminal ended a line.
    pub(crate) line_start: bool,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            mem: Memory::new(),
            reg: Registers::new(),
            status: Status::Running,
            line_start: true,
        }
    }

    /// Copy an image into memory at its origin. Does not move the program counter.
    pub fn load(&mut self, image: &Image) {
        debug!(
            "loading {} words at 0x{:04x}",
            image.words.len(),
            image.orig
        );
        self.mem.load(image.orig, &image.words);
    }

    pub fn reg(&self, reg: u16) -> u16 {
        self.reg.get(reg)
    }

    pub fn set_reg(&mut self, reg: u16, val: u16) {
        self.reg.set(reg, val);
    }

    pub fn pc(&self) -> u16 {
        self.reg.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.reg.pc = pc;
    }

    pub fn flag(&self) -> RunFlag {
        self.reg.flag
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    /// Run until the machine stops, or `limit` instructions have been executed.
    pub fn run(&mut self, io: &mut impl Terminal, limit: Option<u64>) -> Result<Status> {
        let mut count: u64 = 0;
        while self.status == Status::Running {
            if limit.is_some_and(|limit| count >= limit) {
                self.status = Status::LimitReached;
                break;
            }
            self.step(io)?;
            count += 1;
            if count % INTERRUPT_POLL_INTERVAL == 0 && io.interrupted().into_diagnostic()? {
                self.status = Status::Interrupted;
            }
        }
        debug!("stopped after {count} instructions: {:?}", self.status);
        Ok(self.status)
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self, io: &mut impl Terminal) -> Result<()> {
        let pc = self.reg.pc;
        let instr = Instr(self.read(pc, io)?);
        // PC incremented before instruction is performed
        self.reg.pc = pc.wrapping_add(1);
        trace!("0x{pc:04x}: {instr:?}");

        match instr.opcode() {
            Opcode::Add => self.add(instr),
            Opcode::And => self.and(instr),
            Opcode::Not => self.not(instr),
            Opcode::Br => self.br(instr),
            Opcode::Jmp => self.jmp(instr),
            Opcode::Jsr => self.jsr(instr),
            Opcode::Ld => self.ld(instr, io)?,
            Opcode::Ldi => self.ldi(instr, io)?,
            Opcode::Ldr => self.ldr(instr, io)?,
            Opcode::Lea => self.lea(instr),
            Opcode::St => self.st(instr),
            Opcode::Sti => self.sti(instr, io)?,
            Opcode::Str => self.str(instr),
            Opcode::Trap => self.trap(instr, pc, io)?,
            op @ (Opcode::Rti | Opcode::Res) => {
                return Err(error::reserved_opcode(op, pc, instr));
            }
        }
        Ok(())
    }

    fn read(&mut self, addr: u16, io: &mut impl Terminal) -> Result<u16> {
        self.mem.read(addr, io).map_err(error::terminal)
    }

    /// Second operand of `ADD` and `AND`.
    fn operand2(&self, instr: Instr) -> u16 {
        if instr.is_imm() {
            instr.imm5()
        } else {
            self.reg.get(instr.sr2())
        }
    }

    fn add(&mut self, instr: Instr) {
        let res = self.reg.get(instr.sr1()).wrapping_add(self.operand2(instr));
        self.reg.set_with_flags(instr.dr(), res);
    }

    fn and(&mut self, instr: Instr) {
        let res = self.reg.get(instr.sr1()) & self.operand2(instr);
        self.reg.set_with_flags(instr.dr(), res);
    }

    fn not(&mut self, instr: Instr) {
        let res = !self.reg.get(instr.sr1());
        self.reg.set_with_flags(instr.dr(), res);
    }

    fn br(&mut self, instr: Instr) {
        if self.reg.flag as u16 & instr.cond() != 0 {
            self.reg.pc = self.reg.pc.wrapping_add(instr.pc_offset9());
        }
    }

    /// Also `RET`, which is `JMP R7`.
    fn jmp(&mut self, instr: Instr) {
        self.reg.pc = self.reg.get(instr.sr1());
    }

    fn jsr(&mut self, instr: Instr) {
        // Read base first, as it may be R7
        let target = if instr.is_long() {
            self.reg.pc.wrapping_add(instr.pc_offset11())
        } else {
            self.reg.get(instr.sr1())
        };
        self.reg.set(7, self.reg.pc);
        self.reg.pc = target;
    }

    fn pc_relative(&self, instr: Instr) -> u16 {
        self.reg.pc.wrapping_add(instr.pc_offset9())
    }

    fn base_relative(&self, instr: Instr) -> u16 {
        self.reg.get(instr.sr1()).wrapping_add(instr.offset6())
    }

    fn ld(&mut self, instr: Instr, io: &mut impl Terminal) -> Result<()> {
        let val = self.read(self.pc_relative(instr), io)?;
        self.reg.set_with_flags(instr.dr(), val);
        Ok(())
    }

    fn ldi(&mut self, instr: Instr, io: &mut impl Terminal) -> Result<()> {
        let ptr = self.read(self.pc_relative(instr), io)?;
        let val = self.read(ptr, io)?;
        self.reg.set_with_flags(instr.dr(), val);
        Ok(())
    }

    fn ldr(&mut self, instr: Instr, io: &mut impl Terminal) -> Result<()> {
        let val = self.read(self.base_relative(instr), io)?;
        self.reg.set_with_flags(instr.dr(), val);
        Ok(())
    }

    fn lea(&mut self, instr: Instr) {
        let addr = self.pc_relative(instr);
        self.reg.set_with_flags(instr.dr(), addr);
    }

    fn st(&mut self, instr: Instr) {
        let val = self.reg.get(instr.dr());
        self.mem.write(self.pc_relative(instr), val);
    }

    fn sti(&mut self, instr: Instr, io: &mut impl Terminal) -> Result<()> {
        let val = self.reg.get(instr.dr());
        let ptr = self.read(self.pc_relative(instr), io)?;
        self.mem.write(ptr, val);
        Ok(())
    }

    fn str(&mut self, instr: Instr) {
        let val = self.reg.get(instr.dr());
        self.mem.write(self.base_relative(instr), val);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
