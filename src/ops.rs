use std::fmt;

/// Sign-extend the lowest `bits` bits of `val` to a full 16-bit word.
///
/// Bits of `val` above `bits` are ignored.
#[inline]
pub fn s_ext(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits <= 16);
    // Bits above the field: 0xFFFF << bits, nothing for a full word
    let upper = u16::MAX.checked_shl(bits).unwrap_or(0);
    let field = val & !upper;
    if field & (1u16 << (bits - 1)) != 0 {
        field | upper
    } else {
        field
    }
}

/// A raw instruction word, with accessors for each operand field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instr(pub u16);

impl Instr {
    pub fn opcode(self) -> Opcode {
        Opcode::from(self.0)
    }

    /// Destination (or store source) register, bits 11-9.
    #[inline]
    pub fn dr(self) -> u16 {
        (self.0 >> 9) & 0b111
    }

    /// First source or base register, bits 8-6.
    #[inline]
    pub fn sr1(self) -> u16 {
        (self.0 >> 6) & 0b111
    }

    /// Second source register, bits 2-0.
    #[inline]
    pub fn sr2(self) -> u16 {
        self.0 & 0b111
    }

    /// Condition mask of `BR`, bits 11-9. Lines up with [`RunFlag`](crate::runtime::RunFlag).
    #[inline]
    pub fn cond(self) -> u16 {
        (self.0 >> 9) & 0b111
    }

    /// Bit 5 of `ADD`/`AND`: immediate operand.
    #[inline]
    pub fn is_imm(self) -> bool {
        self.0 & 0x0020 != 0
    }

    /// Bit 11 of `JSR`: PC-relative rather than register.
    #[inline]
    pub fn is_long(self) -> bool {
        self.0 & 0x0800 != 0
    }

    #[inline]
    pub fn imm5(self) -> u16 {
        s_ext(self.0, 5)
    }

    #[inline]
    pub fn offset6(self) -> u16 {
        s_ext(self.0, 6)
    }

    #[inline]
    pub fn pc_offset9(self) -> u16 {
        s_ext(self.0, 9)
    }

    #[inline]
    pub fn pc_offset11(self) -> u16 {
        s_ext(self.0, 11)
    }

    #[inline]
    pub fn trap_vect(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Debug for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x} ({:?})", self.0, self.opcode())
    }
}

/// Every value of the upper nibble of an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Br,
    Add,
    Ld,
    St,
    Jsr,
    And,
    Ldr,
    Str,
    Rti,
    Not,
    Ldi,
    Sti,
    Jmp,
    Res,
    Lea,
    Trap,
}

impl From<u16> for Opcode {
    fn from(instr: u16) -> Self {
        match instr >> 12 {
            0x0 => Opcode::Br,
            0x1 => Opcode::Add,
            0x2 => Opcode::Ld,
            0x3 => Opcode::St,
            0x4 => Opcode::Jsr,
            0x5 => Opcode::And,
            0x6 => Opcode::Ldr,
            0x7 => Opcode::Str,
            0x8 => Opcode::Rti,
            0x9 => Opcode::Not,
            0xA => Opcode::Ldi,
            0xB => Opcode::Sti,
            0xC => Opcode::Jmp,
            0xD => Opcode::Res,
            0xE => Opcode::Lea,
            // Only 0xF remains in a 4-bit field
            _ => Opcode::Trap,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_uppercase();
        f.write_str(&name)
    }
}

/// Built-in trap service routines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapVect {
    Getc = 0x20,
    Out = 0x21,
    Puts = 0x22,
    In = 0x23,
    Putsp = 0x24,
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVect {
    type Error = u8;
    fn try_from(vect: u8) -> Result<Self, Self::Error> {
        let trap = match vect {
            0x20 => TrapVect::Getc,
            0x21 => TrapVect::Out,
            0x22 => TrapVect::Puts,
            0x23 => TrapVect::In,
            0x24 => TrapVect::Putsp,
            0x25 => TrapVect::Halt,
            _ => return Err(vect),
        };
        Ok(trap)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s_ext() {
        #[rustfmt::skip]
        let cases: &[(_, &[_])] = &[
            // (input, [bits...])
            //           15      14      13      12      11      10      9       8       7       6       5       4       3       2       1
            (0x0000, &[0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000]),
            (0x0001, &[0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0xffff]),
            (0x00ff, &[0x00ff, 0x00ff, 0x00ff, 0x00ff, 0x00ff, 0x00ff, 0x00ff, 0xffff, 0xffff]),
            (0x0100, &[0x0100, 0x0100, 0x0100, 0x0100, 0x0100, 0x0100, 0xff00, 0x0000, 0x0000]),
            (0x01ff, &[0x01ff, 0x01ff, 0x01ff, 0x01ff, 0x01ff, 0x01ff, 0xffff, 0xffff, 0xffff]),
            (0x0400, &[0x0400, 0x0400, 0x0400, 0x0400, 0xfc00, 0x0000, 0x0000, 0x0000, 0x0000]),
            (0x07ff, &[0x07ff, 0x07ff, 0x07ff, 0x07ff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff]),
            (0x1000, &[0x1000, 0x1000, 0xf000, 0x0000, 0x0000]),
            (0x3fff, &[0x3fff, 0xffff, 0xffff, 0xffff, 0xffff]),
            (0x7000, &[0xf000, 0xf000, 0xf000, 0x0000, 0x0000]),
            (0xfffe, &[0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0xfffe, 0x0000]),
            (0xffff, &[0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff]),
        ];

        for (input, expecteds) in cases {
            for (i, expected) in expecteds.iter().enumerate() {
                let bits = 15 - i as u32;
                let actual = super::s_ext(*input, bits);
                assert_eq!(
                    actual, *expected,
                    "s_ext(0x{input:04x}, {bits}) == 0x{actual:04x}"
                );
            }
        }
    }

    #[test]
    fn s_ext_full_word_is_identity() {
        for val in [0x0000, 0x7fff, 0x8000, 0xffff, 0x1234] {
            assert_eq!(super::s_ext(val, 16), val);
        }
    }

    #[test]
    fn s_ext_recovers_masked_field() {
        for bits in 1..=16u32 {
            let mask = u16::MAX >> (16 - bits);
            for val in 0..=u16::MAX {
                let field = val & mask;
                assert_eq!(super::s_ext(field, bits) & mask, field);
            }
        }
    }

    #[test]
    fn fields() {
        // ADD R3, R5, #-2
        let instr = Instr(0b0001_011_101_1_11110);
        assert_eq!(instr.opcode(), Opcode::Add);
        assert_eq!(instr.dr(), 3);
        assert_eq!(instr.sr1(), 5);
        assert!(instr.is_imm());
        assert_eq!(instr.imm5(), (-2i16) as u16);

        // BRnz #-1
        let instr = Instr(0b0000_110_111111111);
        assert_eq!(instr.opcode(), Opcode::Br);
        assert_eq!(instr.cond(), 0b110);
        assert_eq!(instr.pc_offset9(), 0xffff);

        // JSR #1023
        let instr = Instr(0b0100_1_01111111111);
        assert!(instr.is_long());
        assert_eq!(instr.pc_offset11(), 1023);

        // LDR R1, R2, #-32
        let instr = Instr(0b0110_001_010_100000);
        assert_eq!(instr.offset6(), (-32i16) as u16);

        assert_eq!(Instr(0xF025).trap_vect(), 0x25);
    }

    #[test]
    fn opcode_per_nibble() {
        let expected = [
            Opcode::Br,
            Opcode::Add,
            Opcode::Ld,
            Opcode::St,
            Opcode::Jsr,
            Opcode::And,
            Opcode::Ldr,
            Opcode::Str,
            Opcode::Rti,
            Opcode::Not,
            Opcode::Ldi,
            Opcode::Sti,
            Opcode::Jmp,
            Opcode::Res,
            Opcode::Lea,
            Opcode::Trap,
        ];
        for (nibble, op) in expected.iter().enumerate() {
            assert_eq!(Opcode::from((nibble as u16) << 12 | 0x0abc), *op);
        }
        assert_eq!(Opcode::Trap.to_string(), "TRAP");
    }

    #[test]
    fn trap_vectors() {
        assert_eq!(TrapVect::try_from(0x20), Ok(TrapVect::Getc));
        assert_eq!(TrapVect::try_from(0x25), Ok(TrapVect::Halt));
        assert_eq!(TrapVect::try_from(0x26), Err(0x26));
        assert_eq!(TrapVect::try_from(0x00), Err(0x00));
    }
}
