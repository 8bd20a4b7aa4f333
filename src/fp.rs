//! The floating point sub-pipeline: an Adder (4 stages), a Multiplier (7
//! stages) and an iterative, non-pipelined Divider, each independently
//! shifting in-flight instructions toward completion and racing each other
//! (and the integer EX stage) for the one MEM slot every cycle provides.

use crate::constants::{FP_ADDER_STAGES, FP_DIVIDER_LATENCY, FP_MULTIPLIER_STAGES};
use crate::error::StallKind;
use crate::fcsr::FpException;
use crate::isa::{Instruction, Opcode};

/// An FP instruction in flight, carrying the operand values it was
/// dispatched with (captured at issue time, not re-read later) and its
/// destination register.
#[derive(Clone, Copy, Debug)]
pub struct FpSlot {
    pub instr: Instruction,
    pub lhs: f64,
    pub rhs: f64,
    pub dest: usize,
}

/// The outcome of one functional unit finishing its work: the value to
/// commit and any exception the operation raised.
#[derive(Clone, Copy, Debug)]
pub struct FpOutcome {
    pub dest: usize,
    pub value: f64,
    pub exception: Option<FpException>,
    pub instr: Instruction,
}

fn evaluate(slot: &FpSlot) -> FpOutcome {
    let (value, exception) = match slot.instr.opcode {
        Opcode::AddD => (slot.lhs + slot.rhs, None),
        Opcode::SubD => (slot.lhs - slot.rhs, None),
        Opcode::MulD => (slot.lhs * slot.rhs, None),
        Opcode::DivD => {
            if slot.rhs == 0.0 {
                (f64::NAN, Some(FpException::DivisionByZero))
            } else {
                (slot.lhs / slot.rhs, None)
            }
        }
        _ => unreachable!("non-arithmetic opcode in FP functional unit"),
    };
    FpOutcome {
        dest: slot.dest,
        value,
        exception,
        instr: slot.instr,
    }
}

/// A fixed-depth shift register modeling the Adder or Multiplier: each
/// cycle, occupants shift one position closer to the exit, unless the
/// exit position is occupied and has not yet been claimed this cycle.
struct ShiftUnit {
    stages: Vec<Option<FpSlot>>,
}

impl ShiftUnit {
    fn new(depth: usize) -> ShiftUnit {
        ShiftUnit {
            stages: vec![None; depth],
        }
    }

    fn exit_ready(&self) -> bool {
        self.stages.last().unwrap().is_some()
    }

    fn exit_ref(&self) -> Option<&FpSlot> {
        self.stages.last().unwrap().as_ref()
    }

    fn can_accept(&self) -> bool {
        self.stages[0].is_none() && !self.exit_ready()
    }

    fn is_idle(&self) -> bool {
        self.stages.iter().all(Option::is_none)
    }

    fn dispatch(&mut self, slot: FpSlot) {
        debug_assert!(self.can_accept());
        self.stages[0] = Some(slot);
    }

    /// Advances the shift register by one position, unless the exit is
    /// blocked by an unclaimed result.
    fn tick(&mut self) {
        if self.exit_ready() {
            return;
        }
        for i in (1..self.stages.len()).rev() {
            self.stages[i] = self.stages[i - 1].take();
        }
    }

    fn take_exit(&mut self) -> Option<FpSlot> {
        self.stages.last_mut().unwrap().take()
    }
}

struct Divider {
    slot: Option<FpSlot>,
    remaining: u32,
}

impl Divider {
    fn new() -> Divider {
        Divider {
            slot: None,
            remaining: 0,
        }
    }

    fn busy(&self) -> bool {
        self.slot.is_some()
    }

    fn exit_ready(&self) -> bool {
        self.slot.is_some() && self.remaining == 0
    }

    fn exit_ref(&self) -> Option<&FpSlot> {
        if self.exit_ready() {
            self.slot.as_ref()
        } else {
            None
        }
    }

    fn dispatch(&mut self, slot: FpSlot) {
        debug_assert!(!self.busy());
        self.slot = Some(slot);
        self.remaining = FP_DIVIDER_LATENCY;
    }

    fn tick(&mut self) {
        if self.exit_ready() {
            return;
        }
        if self.busy() {
            self.remaining -= 1;
        }
    }

    fn take_exit(&mut self) -> Option<FpSlot> {
        if self.exit_ready() {
            self.remaining = 0;
            self.slot.take()
        } else {
            None
        }
    }
}

pub struct FpPipeline {
    adder: ShiftUnit,
    multiplier: ShiftUnit,
    divider: Divider,
}

impl FpPipeline {
    pub fn new() -> FpPipeline {
        FpPipeline {
            adder: ShiftUnit::new(FP_ADDER_STAGES),
            multiplier: ShiftUnit::new(FP_MULTIPLIER_STAGES),
            divider: Divider::new(),
        }
    }

    /// Attempts to dispatch `slot` into the functional unit its opcode
    /// requires. Fails with the stall the spec names for a busy unit.
    pub fn dispatch(&mut self, slot: FpSlot) -> Result<(), StallKind> {
        match slot.instr.opcode {
            Opcode::AddD | Opcode::SubD => {
                if self.adder.can_accept() {
                    self.adder.dispatch(slot);
                    Ok(())
                } else {
                    Err(StallKind::StructuralFpUnit)
                }
            }
            Opcode::MulD => {
                if self.multiplier.can_accept() {
                    self.multiplier.dispatch(slot);
                    Ok(())
                } else {
                    Err(StallKind::StructuralFpUnit)
                }
            }
            Opcode::DivD => {
                if !self.divider.busy() {
                    self.divider.dispatch(slot);
                    Ok(())
                } else {
                    Err(StallKind::StructuralDivider)
                }
            }
            _ => unreachable!("non-arithmetic opcode dispatched to FP pipeline"),
        }
    }

    /// Advances every functional unit's shift register by one position.
    /// Call once per cycle, after `complete` has drained whichever unit
    /// won arbitration.
    pub fn tick(&mut self) {
        self.adder.tick();
        self.multiplier.tick();
        self.divider.tick();
    }

    /// Picks at most one ready-to-exit result using the fixed
    /// `{Divider, Multiplier, Adder}` priority order and reports whether
    /// more than one unit was ready (for the `memoryStalls` accounting the
    /// spec calls for on a multi-way tie). Peeks only: the winning unit
    /// keeps its result until `commit` is called with the same priority
    /// pick, so a cycle that loses the MEM slot to the integer EX
    /// instruction simply leaves the FP result in place and retries next
    /// cycle.
    pub fn complete(&self) -> (Option<FpOutcome>, bool) {
        let ready_count = self.divider.exit_ready() as u32
            + self.adder.exit_ready() as u32
            + self.multiplier.exit_ready() as u32;
        let contention = ready_count > 1;

        let winner = self
            .divider
            .exit_ref()
            .or_else(|| self.multiplier.exit_ref())
            .or_else(|| self.adder.exit_ref());

        (winner.map(evaluate), contention)
    }

    /// Removes this cycle's arbitration winner (as picked by `complete`)
    /// from its functional unit. Call only when the winner's result has
    /// actually been handed to `EX` this cycle.
    pub fn commit(&mut self) {
        if self.divider.exit_ready() {
            self.divider.take_exit();
        } else if self.multiplier.exit_ready() {
            self.multiplier.take_exit();
        } else if self.adder.exit_ready() {
            self.adder.take_exit();
        }
    }

    /// True once neither functional unit holds an in-flight or
    /// not-yet-committed instruction. The integer pipeline's own drain
    /// check does not see into this sub-pipeline, so a `Stopping` CPU must
    /// consult this separately before declaring itself `Halted` - otherwise
    /// an FP result still shifting through the adder/multiplier/divider
    /// would be silently dropped.
    pub fn is_idle(&self) -> bool {
        self.adder.is_idle() && self.multiplier.is_idle() && !self.divider.busy()
    }

    pub fn divider_busy(&self) -> bool {
        self.divider.busy()
    }

    pub fn adder_free(&self) -> bool {
        self.adder.can_accept()
    }

    pub fn multiplier_free(&self) -> bool {
        self.multiplier.can_accept()
    }
}

impl Default for FpPipeline {
    fn default() -> FpPipeline {
        FpPipeline::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::Instruction;

    fn slot(opcode: Opcode, dest: usize, lhs: f64, rhs: f64) -> FpSlot {
        FpSlot {
            instr: Instruction {
                opcode,
                rs: 0,
                rt: 0,
                rd: dest as u8,
                shamt: 0,
                immediate: 0,
                target: 0,
                encoding: 0,
            },
            lhs,
            rhs,
            dest,
        }
    }

    #[test]
    fn adder_takes_four_cycles_to_become_ready() {
        let mut fp = FpPipeline::new();
        fp.dispatch(slot(Opcode::AddD, 1, 1.0, 2.0)).unwrap();
        for _ in 0..3 {
            let (outcome, _) = fp.complete();
            assert!(outcome.is_none());
            fp.tick();
        }
        let (outcome, _) = fp.complete();
        assert_eq!(outcome.unwrap().value, 3.0);
    }

    #[test]
    fn divider_rejects_second_instruction_while_busy() {
        let mut fp = FpPipeline::new();
        fp.dispatch(slot(Opcode::DivD, 1, 4.0, 2.0)).unwrap();
        let err = fp.dispatch(slot(Opcode::DivD, 2, 8.0, 4.0)).unwrap_err();
        assert_eq!(err, StallKind::StructuralDivider);
    }

    #[test]
    fn completion_priority_resolves_a_three_way_tie_as_divider_then_multiplier_then_adder() {
        let mut fp = FpPipeline::new();
        // Stagger dispatch so the divider (24 cycles), multiplier (7) and
        // adder (4) all become exit-ready on the very same tick.
        fp.dispatch(slot(Opcode::DivD, 1, 6.0, 2.0)).unwrap();
        for _ in 0..17 {
            fp.tick();
        }
        fp.dispatch(slot(Opcode::MulD, 2, 2.0, 3.0)).unwrap();
        for _ in 0..3 {
            fp.tick();
        }
        fp.dispatch(slot(Opcode::AddD, 3, 1.0, 1.0)).unwrap();
        for _ in 0..4 {
            fp.tick();
        }

        let (outcome, contention) = fp.complete();
        assert_eq!(outcome.unwrap().dest, 1);
        assert!(contention, "all three units should be ready at once");
        fp.commit();

        let (outcome, contention) = fp.complete();
        assert_eq!(outcome.unwrap().dest, 2);
        assert!(contention, "adder is still waiting behind the multiplier");
        fp.commit();

        let (outcome, contention) = fp.complete();
        assert_eq!(outcome.unwrap().dest, 3);
        assert!(!contention);
        fp.commit();

        assert!(fp.is_idle());
    }

    #[test]
    fn divide_by_zero_raises_exception() {
        let mut fp = FpPipeline::new();
        fp.dispatch(slot(Opcode::DivD, 1, 4.0, 0.0)).unwrap();
        for _ in 0..23 {
            fp.complete();
            fp.tick();
        }
        let (outcome, _) = fp.complete();
        assert_eq!(
            outcome.unwrap().exception,
            Some(FpException::DivisionByZero)
        );
    }

    #[test]
    fn completion_priority_prefers_divider_over_multiplier() {
        let mut fp = FpPipeline::new();
        fp.dispatch(slot(Opcode::MulD, 1, 2.0, 3.0)).unwrap();
        for _ in 0..6 {
            fp.complete();
            fp.tick();
        }
        // multiplier result now sits at the exit; dispatch a divider op
        // that resolves immediately isn't possible (24-cycle minimum), so
        // instead verify ready_count/contention accounting directly by
        // letting only the multiplier be ready.
        let (outcome, contention) = fp.complete();
        assert_eq!(outcome.unwrap().dest, 1);
        assert!(!contention);
    }

    #[test]
    fn is_idle_false_while_a_division_is_in_flight() {
        let mut fp = FpPipeline::new();
        assert!(fp.is_idle());
        fp.dispatch(slot(Opcode::DivD, 1, 4.0, 2.0)).unwrap();
        assert!(!fp.is_idle());
        for _ in 0..24 {
            fp.complete();
            fp.tick();
        }
        // Ready but not yet committed - still not idle.
        assert!(!fp.is_idle());
        fp.commit();
        assert!(fp.is_idle());
    }

    #[test]
    fn uncommitted_result_is_retried_next_cycle() {
        let mut fp = FpPipeline::new();
        fp.dispatch(slot(Opcode::AddD, 1, 1.0, 2.0)).unwrap();
        for _ in 0..3 {
            fp.complete();
            fp.tick();
        }
        // Result is ready but loses arbitration for MEM this cycle: the
        // simulator would skip `commit` in that case.
        let (outcome, _) = fp.complete();
        assert_eq!(outcome.unwrap().value, 3.0);
        fp.tick();
        // Still ready next cycle, with the same value.
        let (outcome, _) = fp.complete();
        assert_eq!(outcome.unwrap().value, 3.0);
        fp.commit();
        let (outcome, _) = fp.complete();
        assert!(outcome.is_none());
    }
}
