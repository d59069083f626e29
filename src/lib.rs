// Machine
mod ops;
pub use ops::{s_ext, Instr, Opcode, TrapVect};
mod memory;
pub use memory::{Memory, KBDR, KBSR, MEMORY_MAX};
mod runtime;
pub use runtime::{Registers, RunFlag, RunState, Status, PC_START};
mod trap;

// Host
mod image;
pub use image::Image;
pub mod output;
pub mod term;

mod error;
