//! The `Simulator`: owns every subsystem (registers, memory, symbol
//! table, FCSR, the FP sub-pipeline and the integer pipeline registers)
//! and drives one cycle at a time through `step`. Nothing here is a
//! process-wide singleton; every piece is a plain field constructed by
//! `Simulator::new`, so multiple simulators can coexist (e.g. in tests).

use crate::config::{Config, SyncExceptionPolicy};
use crate::cycle::{CycleSnapshot, StageOccupant};
use crate::error::{ExceptionKind, InvariantError, SimError, StallKind};
use crate::fcsr::{Fcsr, FpException};
use crate::fp::{FpPipeline, FpSlot};
use crate::isa::{Family, Instruction, Opcode};
use crate::memory::Memory;
use crate::pipeline::{CpuState, InFlight, Pipeline, Slot};
use crate::register::{Cell, RegisterFile};
use crate::symbol::SymbolTable;

#[derive(Clone, Copy, Debug, Default)]
pub struct StallCounters {
    pub raw: u64,
    pub waw: u64,
    pub structural_divider: u64,
    pub structural_fp_unit: u64,
    pub structural_ex: u64,
    pub structural_memory: u64,
}

impl StallCounters {
    pub fn increment(&mut self, kind: StallKind) {
        match kind {
            StallKind::Raw => self.raw += 1,
            StallKind::Waw => self.waw += 1,
            StallKind::StructuralDivider => self.structural_divider += 1,
            StallKind::StructuralFpUnit => self.structural_fp_unit += 1,
            StallKind::StructuralEx => self.structural_ex += 1,
            StallKind::StructuralMemory => self.structural_memory += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.raw
            + self.waw
            + self.structural_divider
            + self.structural_fp_unit
            + self.structural_ex
            + self.structural_memory
    }
}

pub struct Simulator {
    config: Config,
    state: CpuState,
    registers: RegisterFile,
    fcsr: Fcsr,
    data_memory: Memory,
    code_memory: Vec<Instruction>,
    symbols: SymbolTable,
    fp: FpPipeline,
    pipeline: Pipeline,
    cycle: u64,
    instructions_retired: u64,
    stalls: StallCounters,
}

fn fcsr_from_config(config: &Config) -> Fcsr {
    let mut fcsr = Fcsr::new();
    fcsr.set_rounding_mode(config.fp_rounding_mode);
    fcsr.set_enabled(FpException::InvalidOperation, config.fp_exceptions.invalid_operation);
    fcsr.set_enabled(FpException::Overflow, config.fp_exceptions.overflow);
    fcsr.set_enabled(FpException::Underflow, config.fp_exceptions.underflow);
    fcsr.set_enabled(FpException::DivisionByZero, config.fp_exceptions.divide_by_zero);
    fcsr
}

impl Simulator {
    pub fn new(
        config: Config,
        code_memory: Vec<Instruction>,
        data_memory: Memory,
        symbols: SymbolTable,
    ) -> Simulator {
        let fcsr = fcsr_from_config(&config);
        Simulator {
            config,
            state: CpuState::Ready,
            registers: RegisterFile::new(),
            fcsr,
            data_memory,
            code_memory,
            symbols,
            fp: FpPipeline::new(),
            pipeline: Pipeline::new(),
            cycle: 0,
            instructions_retired: 0,
            stalls: StallCounters::default(),
        }
    }

    pub fn start(&mut self) {
        self.state = CpuState::Running;
    }

    pub fn reset(&mut self) {
        self.state = CpuState::Ready;
        self.registers = RegisterFile::new();
        self.fcsr = fcsr_from_config(&self.config);
        self.fp = FpPipeline::new();
        self.pipeline = Pipeline::new();
        self.cycle = 0;
        self.instructions_retired = 0;
        self.stalls = StallCounters::default();
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn instructions_retired(&self) -> u64 {
        self.instructions_retired
    }

    pub fn stalls(&self) -> StallCounters {
        self.stalls
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn fcsr(&self) -> &Fcsr {
        &self.fcsr
    }

    pub fn data_memory(&self) -> &Memory {
        &self.data_memory
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn fetch(&self, pc: u64) -> Slot {
        let index = (pc / 4) as usize;
        match self.code_memory.get(index) {
            Some(instr) => Slot::Filled(InFlight::new(*instr)),
            None => Slot::Empty,
        }
    }

    /// Runs one cycle. Stages execute in the order the spec fixes -
    /// WB, MEM, EX, ID, IF - so that a slot is only ever read after its
    /// downstream slot has already been vacated this cycle.
    pub fn step(&mut self) -> Result<CycleSnapshot, SimError> {
        if matches!(self.state, CpuState::Ready | CpuState::Halted) {
            return Err(SimError::Invariant(InvariantError::StoppedCpu));
        }

        self.cycle += 1;
        let mut snapshot = CycleSnapshot::new(self.cycle);

        self.stage_wb(&mut snapshot);

        if self.state == CpuState::Stopping && self.pipeline.drained() && self.fp.is_idle() {
            self.state = CpuState::Halted;
            snapshot.halted = true;
            return Ok(snapshot);
        }

        self.stage_mem(&mut snapshot)?;
        self.stage_ex(&mut snapshot)?;
        let id_stalled = self.stage_id(&mut snapshot);
        self.stage_if(&mut snapshot, id_stalled);

        snapshot.if_ = occupant(&self.pipeline.if_);
        snapshot.id = occupant(&self.pipeline.id);
        snapshot.ex = occupant(&self.pipeline.ex);
        snapshot.mem = occupant(&self.pipeline.mem);
        snapshot.wb = occupant(&self.pipeline.wb);

        Ok(snapshot)
    }

    fn stage_wb(&mut self, snapshot: &mut CycleSnapshot) {
        if let Slot::Filled(in_flight) = self.pipeline.wb.take() {
            self.writeback(&in_flight);
            self.instructions_retired += 1;
        }
        let _ = snapshot;
    }

    /// Commits a retiring instruction's result to the register file. GPR
    /// destinations are the common case; `L.D` and FP arithmetic results
    /// (routed here through `MEM` once their functional unit finishes,
    /// carrying the IEEE-754 bit pattern in `tr[0]`) commit to an FPR
    /// instead. `MOV.D`/`CVT.*` write their FPR destination directly in
    /// `EX` and never reach this path with one still pending.
    fn writeback(&mut self, in_flight: &InFlight) {
        let instr = &in_flight.instr;
        if let Some(dest) = instr.gpr_destination() {
            let mut cell = Cell::default();
            cell.set_i(in_flight.tr[0]);
            self.registers.set_gpr(dest, cell);
            self.registers.release_gpr(dest);
        }
        if matches!(
            instr.opcode,
            Opcode::LdC1 | Opcode::AddD | Opcode::SubD | Opcode::MulD | Opcode::DivD
        ) {
            if let Some(dest) = instr.fpr_destination() {
                let mut cell = Cell::default();
                cell.set_i(in_flight.tr[0]);
                self.registers.set_fpr(dest, cell);
                self.registers.release_fpr(dest);
            }
        }
    }

    fn stage_mem(&mut self, snapshot: &mut CycleSnapshot) -> Result<(), SimError> {
        let outcome = if let Slot::Filled(in_flight) = &mut self.pipeline.mem {
            self.mem_behavior(in_flight, snapshot)?
        } else {
            None
        };
        let _ = outcome;
        self.pipeline.wb = self.pipeline.mem.take();
        Ok(())
    }

    fn mem_behavior(
        &mut self,
        in_flight: &mut InFlight,
        snapshot: &mut CycleSnapshot,
    ) -> Result<(), SimError> {
        let address = in_flight.tr[0] as u64;
        let instr = in_flight.instr;
        let result = match instr.opcode {
            Opcode::Lb => self.data_memory.read_byte(address).map(|v| v as i8 as i64),
            Opcode::Lbu => self.data_memory.read_byte(address).map(|v| v as i64),
            Opcode::Lh => self.data_memory.read_half(address).map(|v| v as i16 as i64),
            Opcode::Lhu => self.data_memory.read_half(address).map(|v| v as i64),
            Opcode::Lw => self.data_memory.read_word(address).map(|v| v as i32 as i64),
            Opcode::Lwu => self.data_memory.read_word(address).map(|v| v as i64),
            Opcode::Ld => self.data_memory.read_doubleword(address).map(|v| v as i64),
            Opcode::Sb => {
                let value = in_flight.tr[1] as u8;
                self.data_memory.write_byte(address, value).map(|_| 0)
            }
            Opcode::Sh => {
                let value = in_flight.tr[1] as u16;
                self.data_memory.write_half(address, value).map(|_| 0)
            }
            Opcode::Sw => {
                let value = in_flight.tr[1] as u32;
                self.data_memory.write_word(address, value).map(|_| 0)
            }
            Opcode::Sd => {
                let value = in_flight.tr[1] as u64;
                self.data_memory.write_doubleword(address, value).map(|_| 0)
            }
            Opcode::LdC1 => self.data_memory.read_doubleword(address).map(|v| v as i64),
            Opcode::SdC1 => {
                let value = in_flight.tr[1] as u64;
                self.data_memory.write_doubleword(address, value).map(|_| 0)
            }
            // Every other family either carries its EX result straight
            // through `tr[0]` (ALU ops, effective-address-only loads
            // already handled above) or has nothing for MEM to do.
            _ => Ok(in_flight.tr[0]),
        };

        match result {
            Ok(value) => {
                in_flight.tr[0] = value;
                Ok(())
            }
            Err(SimError::Exception(kind)) => self.handle_sync_exception(kind, snapshot),
            Err(other) => Err(other),
        }
    }

    fn handle_sync_exception(
        &mut self,
        kind: ExceptionKind,
        snapshot: &mut CycleSnapshot,
    ) -> Result<(), SimError> {
        match self.config.sync_exceptions {
            SyncExceptionPolicy::Masked => Ok(()),
            SyncExceptionPolicy::Terminate => Err(SimError::Exception(kind)),
            SyncExceptionPolicy::Continue => {
                snapshot.exception = Some(kind);
                Ok(())
            }
        }
    }

    fn stage_ex(&mut self, snapshot: &mut CycleSnapshot) -> Result<(), SimError> {
        let (fp_outcome, contention) = self.fp.complete();
        if contention {
            self.stalls.increment(StallKind::StructuralMemory);
        }

        let ex_filled = self.pipeline.ex.is_filled();

        if let Some(outcome) = fp_outcome {
            if ex_filled {
                // The integer EX instruction keeps priority on the MEM
                // slot this cycle; the FP unit's result is left in place
                // (not committed) and `complete` reports it ready again
                // next cycle.
                self.stalls.increment(StallKind::StructuralMemory);
            } else {
                // `EX` is empty (checked above), so there is nothing for
                // `run_integer_ex` to move into `MEM` this cycle; the FP
                // result takes that slot instead and rides the ordinary
                // `MEM`/`WB` path to commit its destination register,
                // exactly like an integer result would.
                self.fp.commit();
                self.pipeline.ex.take();
                if let Some(exception) = outcome.exception {
                    if self.fcsr.raise(exception) {
                        self.handle_sync_exception(ExceptionKind::FpInvalidOperation, snapshot)?;
                    }
                }
                let mut in_flight = InFlight::new(outcome.instr);
                in_flight.tr[0] = outcome.value.to_bits() as i64;
                self.pipeline.mem = Slot::Filled(in_flight);
                self.fp.tick();
                return Ok(());
            }
        }

        self.run_integer_ex(snapshot)?;
        self.fp.tick();
        Ok(())
    }

    fn run_integer_ex(&mut self, snapshot: &mut CycleSnapshot) -> Result<(), SimError> {
        let mut in_flight = match self.pipeline.ex.take() {
            Slot::Filled(f) => f,
            other => {
                self.pipeline.mem = other;
                return Ok(());
            }
        };

        let exception = self.ex_behavior(&mut in_flight)?;
        if let Some(kind) = exception {
            self.handle_sync_exception(kind, snapshot)?;
        }
        self.pipeline.mem = Slot::Filled(in_flight);
        Ok(())
    }

    fn ex_behavior(&mut self, in_flight: &mut InFlight) -> Result<Option<ExceptionKind>, SimError> {
        let instr = in_flight.instr;
        let rs = in_flight.tr[0];
        let rt = in_flight.tr[1];

        let mut exception = None;

        let result: i64 = match instr.opcode {
            Opcode::Add => match rs.checked_add(rt) {
                Some(v) => v,
                None => {
                    exception = Some(ExceptionKind::IntegerOverflow);
                    rs.wrapping_add(rt)
                }
            },
            Opcode::Addu => rs.wrapping_add(rt),
            Opcode::Sub => match rs.checked_sub(rt) {
                Some(v) => v,
                None => {
                    exception = Some(ExceptionKind::IntegerOverflow);
                    rs.wrapping_sub(rt)
                }
            },
            Opcode::Subu => rs.wrapping_sub(rt),
            Opcode::And => rs & rt,
            Opcode::Or => rs | rt,
            Opcode::Xor => rs ^ rt,
            Opcode::Nor => !(rs | rt),
            Opcode::Sll => ((rt as u64) << instr.shamt) as i64,
            Opcode::Srl => ((rt as u64) >> instr.shamt) as i64,
            Opcode::Sra => rt >> instr.shamt,
            Opcode::Sllv => ((rt as u64) << (rs & 0x3f)) as i64,
            Opcode::Srlv => ((rt as u64) >> (rs & 0x3f)) as i64,
            Opcode::Srav => rt >> (rs & 0x3f),
            Opcode::Slt => (rs < rt) as i64,
            Opcode::Sltu => ((rs as u64) < (rt as u64)) as i64,
            Opcode::Mult => {
                let product = (rs as i128) * (rt as i128);
                self.registers.set_lo(cell_i(product as i64));
                self.registers.set_hi(cell_i((product >> 64) as i64));
                0
            }
            Opcode::Div => {
                if rt == 0 {
                    exception = Some(ExceptionKind::DivByZero);
                    0
                } else {
                    self.registers.set_lo(cell_i(rs.wrapping_div(rt)));
                    self.registers.set_hi(cell_i(rs.wrapping_rem(rt)));
                    0
                }
            }

            Opcode::Addi => match rs.checked_add(instr.immediate) {
                Some(v) => v,
                None => {
                    exception = Some(ExceptionKind::IntegerOverflow);
                    rs.wrapping_add(instr.immediate)
                }
            },
            Opcode::Addiu => rs.wrapping_add(instr.immediate),
            Opcode::Andi => rs & instr.immediate,
            Opcode::Ori => rs | instr.immediate,
            Opcode::Xori => rs ^ instr.immediate,
            Opcode::Lui => instr.immediate << 16,
            Opcode::Slti => (rs < instr.immediate) as i64,
            Opcode::Sltiu => ((rs as u64) < (instr.immediate as u64)) as i64,

            Opcode::Lb
            | Opcode::Lbu
            | Opcode::Lh
            | Opcode::Lhu
            | Opcode::Lw
            | Opcode::Lwu
            | Opcode::Ld => rs.wrapping_add(instr.immediate),
            Opcode::Sb | Opcode::Sh | Opcode::Sw | Opcode::Sd => {
                in_flight.tr[1] = rt;
                rs.wrapping_add(instr.immediate)
            }

            Opcode::Beq | Opcode::Bne | Opcode::Beqz | Opcode::Bnez | Opcode::Bgez
            | Opcode::Bltz => {
                let taken = match instr.opcode {
                    Opcode::Beq => rs == rt,
                    Opcode::Bne => rs != rt,
                    Opcode::Beqz => rs == 0,
                    Opcode::Bnez => rs != 0,
                    Opcode::Bgez => rs >= 0,
                    Opcode::Bltz => rs < 0,
                    _ => unreachable!(),
                };
                if taken {
                    self.take_jump(instr.target);
                }
                0
            }
            Opcode::J | Opcode::Jal => {
                if instr.opcode == Opcode::Jal {
                    in_flight.tr[0] = (self.registers.pc() as i64) + 4;
                }
                self.take_jump(instr.target);
                in_flight.tr[0]
            }
            Opcode::Jr | Opcode::Jalr => {
                let target = rs as u64;
                if instr.opcode == Opcode::Jalr {
                    in_flight.tr[0] = (self.registers.pc() as i64) + 4;
                }
                self.take_jump(target);
                in_flight.tr[0]
            }

            Opcode::MovD => {
                let mut cell = Cell::default();
                cell.set_f(self.registers.fpr(instr.rs as usize).f());
                self.registers.set_fpr(instr.rd as usize, cell);
                self.registers.release_fpr(instr.rd as usize);
                0
            }
            Opcode::CvtDL => {
                let value = self.registers.fpr(instr.rs as usize).i() as f64;
                let mut cell = Cell::default();
                cell.set_f(value);
                self.registers.set_fpr(instr.rd as usize, cell);
                self.registers.release_fpr(instr.rd as usize);
                0
            }
            Opcode::CvtLD => {
                let value = self.registers.fpr(instr.rs as usize).f() as i64;
                let mut cell = Cell::default();
                cell.set_i(value);
                self.registers.set_fpr(instr.rd as usize, cell);
                self.registers.release_fpr(instr.rd as usize);
                0
            }
            Opcode::LdC1 => rs.wrapping_add(instr.immediate),
            Opcode::SdC1 => {
                in_flight.tr[1] = self.registers.fpr(instr.rt as usize).i();
                rs.wrapping_add(instr.immediate)
            }

            Opcode::Halt | Opcode::Syscall => 0,
            Opcode::Break => {
                exception = Some(ExceptionKind::Trap);
                0
            }
            Opcode::Trap => {
                exception = Some(ExceptionKind::Trap);
                0
            }
            Opcode::Nop => 0,
        };

        in_flight.tr[0] = result;
        Ok(exception)
    }

    /// Redirects fetch to `target`. The instruction already sitting in
    /// `ID` this cycle (fetched the cycle after the branch/jump itself) is
    /// the classic-MIPS delay slot: with `branch_delay_slot` enabled it is
    /// left alone and allowed to reach `EX` normally; otherwise it is
    /// discarded along with the rest of the stale fetch stream.
    fn take_jump(&mut self, target: u64) {
        // `if_` is primed with the target instruction directly; the
        // ordinary fetch-and-promote in `stage_if` (which still runs this
        // same cycle) moves it into `ID` and then fetches the instruction
        // after it. That follow-up fetch reads `registers.pc()`, so the PC
        // is advanced to `target + 4` here rather than `target` itself.
        self.registers.set_pc(target + 4);
        self.pipeline.if_ = self.fetch(target);
        if !self.config.branch_delay_slot {
            self.pipeline.id = Slot::Bubble;
        }
    }

    /// Decode-and-dispatch. Returns whether the instruction stayed put
    /// (a stall), which also tells `stage_if` to freeze fetch.
    fn stage_id(&mut self, snapshot: &mut CycleSnapshot) -> bool {
        let mut in_flight = match self.pipeline.id {
            Slot::Filled(f) => f,
            Slot::Bubble => {
                self.pipeline.ex = self.pipeline.id.take();
                return false;
            }
            Slot::Empty => {
                self.pipeline.ex = Slot::Empty;
                return false;
            }
        };

        let instr = in_flight.instr;

        if instr.opcode.is_fp_arithmetic() {
            if let Some(kind) = self.check_fp_hazard(&instr) {
                self.stalls.increment(kind);
                snapshot.stalls.push(kind);
                self.pipeline.ex = Slot::Bubble;
                return true;
            }
        } else if self.pipeline.ex.is_filled() {
            self.stalls.increment(StallKind::StructuralEx);
            snapshot.stalls.push(StallKind::StructuralEx);
            self.pipeline.ex = Slot::Bubble;
            return true;
        }

        if let Some(kind) = self.check_raw_hazard(&instr) {
            self.stalls.increment(kind);
            snapshot.stalls.push(kind);
            self.pipeline.ex = Slot::Bubble;
            return true;
        }

        if let Some(kind) = self.check_fpr_source_hazard(&instr) {
            self.stalls.increment(kind);
            snapshot.stalls.push(kind);
            self.pipeline.ex = Slot::Bubble;
            return true;
        }

        in_flight.tr[0] = self.read_source_one(&instr);
        in_flight.tr[1] = self.read_source_two(&instr);

        if let Some(dest) = instr.gpr_destination() {
            self.registers.reserve_gpr(dest);
        }

        if instr.opcode.is_fp_arithmetic() {
            let dest = instr.fpr_destination().unwrap();
            self.registers.reserve_fpr(dest);
            let slot = FpSlot {
                instr,
                lhs: self.registers.fpr(instr.rs as usize).f(),
                rhs: self.registers.fpr(instr.rt as usize).f(),
                dest,
            };
            // Dispatch is guaranteed to succeed: `check_fp_hazard` already
            // verified the unit can accept this instruction.
            let _ = self.fp.dispatch(slot);
            self.pipeline.id = Slot::Empty;
            self.pipeline.ex = Slot::Bubble;
            return false;
        }

        if let Some(dest) = instr.fpr_destination() {
            self.registers.reserve_fpr(dest);
        }

        if instr.opcode.is_terminating() {
            self.state = CpuState::Stopping;
        }

        self.pipeline.id = Slot::Empty;
        self.pipeline.ex = Slot::Filled(in_flight);
        false
    }

    fn read_source_one(&self, instr: &Instruction) -> i64 {
        match instr.opcode.family() {
            Family::Jump if matches!(instr.opcode, Opcode::Jr | Opcode::Jalr) => {
                self.read_gpr(instr.rs as usize)
            }
            Family::Jump => 0,
            _ => self.read_gpr(instr.rs as usize),
        }
    }

    fn read_source_two(&self, instr: &Instruction) -> i64 {
        match instr.opcode.family() {
            Family::AluR | Family::Store | Family::FpLoadStore => {
                self.read_gpr(instr.rt as usize)
            }
            Family::Branch if matches!(instr.opcode, Opcode::Beq | Opcode::Bne) => {
                self.read_gpr(instr.rt as usize)
            }
            _ => 0,
        }
    }

    /// Reads GPR `id`, substituting a forwarded value from `MEM`/`WB` when
    /// the register is reserved by an in-flight producer. `check_raw_hazard`
    /// only lets dispatch through on a reserved source when it is
    /// forwardable, so the fallback below always finds one.
    fn read_gpr(&self, id: usize) -> i64 {
        if self.registers.gpr_reserved(id) {
            if let Some(value) = self.forwarded_gpr(id) {
                return value;
            }
        }
        self.registers.gpr(id).i()
    }

    fn forwarded_gpr(&self, id: usize) -> Option<i64> {
        if let Slot::Filled(f) = &self.pipeline.mem {
            if f.instr.gpr_destination() == Some(id) && !f.instr.opcode.is_load() {
                return Some(f.tr[0]);
            }
        }
        if let Slot::Filled(f) = &self.pipeline.wb {
            if f.instr.gpr_destination() == Some(id) {
                return Some(f.tr[0]);
            }
        }
        None
    }

    /// RAW hazard check. Without forwarding, any pending writer on a
    /// source register stalls. With forwarding, a pending writer sitting
    /// in `MEM` (non-load: result already known) or `WB` (MEM already
    /// ran: result always known) can bypass straight to this cycle's read;
    /// a load still sitting in `MEM` cannot, since its data only becomes
    /// known when `MEM` runs for it next cycle.
    fn check_raw_hazard(&self, instr: &Instruction) -> Option<StallKind> {
        for source in instr.gpr_sources() {
            if !self.registers.gpr_reserved(source) {
                continue;
            }
            if !self.config.forwarding {
                return Some(StallKind::Raw);
            }
            let forwardable = self.forwarding_source(source);
            if !forwardable {
                return Some(StallKind::Raw);
            }
        }
        None
    }

    /// FP-source RAW hazard. The FP sub-pipeline has no forwarding network
    /// of its own, so any pending writer on an FPR source (typically an
    /// `L.D` or another FP arithmetic op still in flight) simply stalls
    /// dispatch until it retires through `WB`.
    fn check_fpr_source_hazard(&self, instr: &Instruction) -> Option<StallKind> {
        for source in instr.fpr_sources() {
            if self.registers.fpr_reserved(source) {
                return Some(StallKind::Raw);
            }
        }
        None
    }

    fn forwarding_source(&self, register: usize) -> bool {
        let mem_match = self
            .pipeline
            .mem
            .instruction()
            .map(|i| i.gpr_destination() == Some(register) && !i.opcode.is_load())
            .unwrap_or(false);
        let wb_match = self
            .pipeline
            .wb
            .instruction()
            .map(|i| i.gpr_destination() == Some(register))
            .unwrap_or(false);
        mem_match || wb_match
    }

    fn check_fp_hazard(&mut self, instr: &Instruction) -> Option<StallKind> {
        let dest = instr.fpr_destination().unwrap();
        if self.registers.fpr_reserved(dest) {
            return Some(StallKind::Waw);
        }
        match instr.opcode {
            Opcode::DivD if self.fp_divider_busy() => Some(StallKind::StructuralDivider),
            Opcode::AddD | Opcode::SubD if !self.fp_adder_free() => {
                Some(StallKind::StructuralFpUnit)
            }
            Opcode::MulD if !self.fp_multiplier_free() => Some(StallKind::StructuralFpUnit),
            _ => None,
        }
    }

    fn fp_divider_busy(&self) -> bool {
        self.fp.divider_busy()
    }

    fn fp_adder_free(&self) -> bool {
        self.fp.adder_free()
    }

    fn fp_multiplier_free(&self) -> bool {
        self.fp.multiplier_free()
    }

    fn stage_if(&mut self, snapshot: &mut CycleSnapshot, id_stalled: bool) {
        if id_stalled || self.state == CpuState::Halted {
            return;
        }

        if self.state == CpuState::Stopping {
            self.pipeline.id = Slot::Bubble;
            return;
        }

        // `BREAK`'s trap is raised once, from `EX`, via the ordinary
        // policy-respecting `handle_sync_exception` path; `IF` only moves
        // instructions, it never overwrites this cycle's exception report.
        let pc = self.registers.pc();
        let current = self.pipeline.if_.take();
        self.pipeline.id = current;
        self.pipeline.if_ = self.fetch(pc);
        self.registers.set_pc(pc + 4);
        let _ = snapshot;
    }
}

fn cell_i(value: i64) -> Cell {
    let mut cell = Cell::default();
    cell.set_i(value);
    cell
}

fn occupant(slot: &Slot) -> StageOccupant {
    match slot {
        Slot::Filled(in_flight) => StageOccupant {
            mnemonic: Some(in_flight.instr.opcode),
            encoding: Some(in_flight.instr.encoding),
        },
        _ => StageOccupant::default(),
    }
}
