//! The per-cycle observer hook: a lightweight snapshot of what happened
//! during one `step()`, meant for the excluded UI to render. The bulk of
//! the simulator's state (registers, memory, FCSR) is read through
//! `Simulator`'s own getters; this struct only carries the events that are
//! specific to the cycle just executed.

use crate::error::{ExceptionKind, StallKind};
use crate::isa::Opcode;

#[derive(Clone, Copy, Debug, Default)]
pub struct StageOccupant {
    pub mnemonic: Option<Opcode>,
    pub encoding: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct CycleSnapshot {
    pub cycle: u64,
    pub if_: StageOccupant,
    pub id: StageOccupant,
    pub ex: StageOccupant,
    pub mem: StageOccupant,
    pub wb: StageOccupant,
    pub stalls: Vec<StallKind>,
    pub exception: Option<ExceptionKind>,
    pub jumped_to: Option<u64>,
    pub halted: bool,
}

impl CycleSnapshot {
    pub fn new(cycle: u64) -> CycleSnapshot {
        CycleSnapshot {
            cycle,
            ..CycleSnapshot::default()
        }
    }
}
