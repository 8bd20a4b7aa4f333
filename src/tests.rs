//! End-to-end scenarios driving the whole pipeline through `Simulator::step`,
//! built directly from decoded `Instruction`s rather than through the
//! assembler (which lives in its own crate). Each program is handwritten so
//! the pipeline timing can be reasoned about exactly.

use crate::config::Config;
use crate::isa::{Instruction, Opcode};
use crate::memory::Memory;
use crate::pipeline::CpuState;
use crate::simulator::Simulator;
use crate::symbol::SymbolTable;

fn instr(opcode: Opcode, rs: u8, rt: u8, rd: u8, immediate: i64, target: u64) -> Instruction {
    Instruction {
        opcode,
        rs,
        rt,
        rd,
        shamt: 0,
        immediate,
        target,
        encoding: 0,
    }
}

fn make_simulator(config: Config, code: Vec<Instruction>, data: Memory) -> Simulator {
    let mut sim = Simulator::new(config, code, data, SymbolTable::new());
    sim.start();
    sim
}

/// Steps until `Halted`, panicking instead of looping forever if the
/// program does not halt within `max_cycles` - a bug should fail the test,
/// not hang it.
fn run_to_halt(sim: &mut Simulator, max_cycles: u32) {
    for _ in 0..max_cycles {
        if sim.state() == CpuState::Halted {
            return;
        }
        sim.step().expect("step should not error in these programs");
    }
    panic!("program did not halt within {} cycles", max_cycles);
}

#[test]
fn r0_write_is_never_observable() {
    // ADDI R1, R0, 5 ; ADD R0, R1, R1 ; HALT
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 5, 0),
        instr(Opcode::Add, 1, 1, 0, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, Memory::new(0));
    run_to_halt(&mut sim, 20);

    assert_eq!(sim.registers().gpr(0).i(), 0);
    assert_eq!(sim.registers().gpr(1).i(), 5);
    assert_eq!(sim.instructions_retired(), 3);
}

#[test]
fn forwarding_lets_a_back_to_back_dependent_add_dispatch_without_stalling() {
    // ADDI R1, R0, 5 ; NOP ; ADD R3, R1, R1 ; HALT
    //
    // By the cycle ADD reaches ID, the ADDI two instructions earlier has
    // just landed in MEM this same cycle - forwardable without a stall.
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 5, 0),
        instr(Opcode::Nop, 0, 0, 0, 0, 0),
        instr(Opcode::Add, 1, 1, 3, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, Memory::new(0));
    run_to_halt(&mut sim, 20);

    assert_eq!(sim.registers().gpr(3).i(), 10);
    assert_eq!(sim.stalls().raw, 0);
    assert_eq!(sim.instructions_retired(), 4);
}

#[test]
fn disabling_forwarding_forces_a_raw_stall_on_the_same_program() {
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 5, 0),
        instr(Opcode::Nop, 0, 0, 0, 0, 0),
        instr(Opcode::Add, 1, 1, 3, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let config = Config {
        forwarding: false,
        ..Config::default()
    };
    let mut sim = make_simulator(config, code, Memory::new(0));
    run_to_halt(&mut sim, 20);

    // Correctness doesn't depend on forwarding, only timing does.
    assert_eq!(sim.registers().gpr(3).i(), 10);
    assert!(sim.stalls().raw > 0);
}

#[test]
fn load_use_hazard_stalls_but_still_computes_the_right_value() {
    // ADDI R1, R0, 0 ; LW R2, 0(R1) ; ADD R3, R2, R2 ; HALT
    let mut data = Memory::new(16);
    data.write_word(0, 100).unwrap();
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 0, 0),
        instr(Opcode::Lw, 1, 2, 0, 0, 0),
        instr(Opcode::Add, 2, 2, 3, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, data);
    run_to_halt(&mut sim, 30);

    assert_eq!(sim.registers().gpr(3).i(), 200);
    assert!(sim.stalls().raw > 0);
    assert_eq!(sim.instructions_retired(), 4);
}

#[test]
fn taken_branch_flushes_the_delay_slot_by_default() {
    // ADDI R1, R0, 1 ; BEQ R0, R0, +16 ; ADDI R1, R0, 999 ; NOP ; HALT
    //
    // `branch_delay_slot` defaults to false: the instruction fetched into
    // the delay slot is discarded and must never commit.
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 1, 0),
        instr(Opcode::Beq, 0, 0, 0, 0, 16),
        instr(Opcode::Addi, 0, 1, 0, 999, 0),
        instr(Opcode::Nop, 0, 0, 0, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, Memory::new(0));
    run_to_halt(&mut sim, 20);

    assert_eq!(sim.registers().gpr(1).i(), 1);
    assert_eq!(sim.instructions_retired(), 3);
}

#[test]
fn branch_delay_slot_config_lets_the_delay_slot_instruction_execute() {
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 1, 0),
        instr(Opcode::Beq, 0, 0, 0, 0, 16),
        instr(Opcode::Addi, 0, 1, 0, 999, 0),
        instr(Opcode::Nop, 0, 0, 0, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let config = Config {
        branch_delay_slot: true,
        ..Config::default()
    };
    let mut sim = make_simulator(config, code, Memory::new(0));
    run_to_halt(&mut sim, 20);

    // This time the instruction right after the branch is the delay slot,
    // not discarded fetch-stream garbage, and commits its result.
    assert_eq!(sim.registers().gpr(1).i(), 999);
    assert_eq!(sim.instructions_retired(), 4);
}

#[test]
fn fp_divider_rejects_a_second_division_while_busy() {
    // DIV.D F2, F0, F1 ; DIV.D F4, F0, F1 ; HALT
    //
    // Both divides run against whatever is in F0/F1 (zero by default, so
    // both raise a divide-by-zero FP exception) - what this test is
    // actually after is the 24-cycle structural stall the second DIV.D
    // takes waiting for the non-pipelined divider to free up.
    let code = vec![
        instr(Opcode::DivD, 0, 1, 2, 0, 0),
        instr(Opcode::DivD, 0, 1, 4, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, Memory::new(0));
    run_to_halt(&mut sim, 200);

    assert!(sim.stalls().structural_divider > 0);
    assert_eq!(sim.instructions_retired(), 3);
}

#[test]
fn fp_add_result_commits_through_writeback() {
    // ADDI R1, R0, 0 ; L.D F0, 0(R1) ; L.D F1, 8(R1) ; ADD.D F2, F0, F1 ; HALT
    let mut data = Memory::new(16);
    data.write_doubleword(0, 2.0f64.to_bits()).unwrap();
    data.write_doubleword(8, 3.0f64.to_bits()).unwrap();
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 0, 0),
        instr(Opcode::LdC1, 1, 0, 0, 0, 0),
        instr(Opcode::LdC1, 1, 1, 0, 8, 0),
        instr(Opcode::AddD, 0, 1, 2, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, data);
    run_to_halt(&mut sim, 100);

    assert_eq!(sim.registers().fpr(2).f(), 5.0);
    assert_eq!(sim.instructions_retired(), 5);
}

#[test]
fn fp_source_raw_hazard_stalls_until_the_loaded_operand_is_ready() {
    // Same program as above, but what this test actually checks is that
    // ADD.D never dispatches with a stale (pre-load) FPR value: without a
    // stall here the result would be 0.0 + 3.0 instead of 2.0 + 3.0.
    let mut data = Memory::new(16);
    data.write_doubleword(0, 2.0f64.to_bits()).unwrap();
    data.write_doubleword(8, 3.0f64.to_bits()).unwrap();
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 0, 0),
        instr(Opcode::LdC1, 1, 0, 0, 0, 0),
        instr(Opcode::LdC1, 1, 1, 0, 8, 0),
        instr(Opcode::AddD, 0, 1, 2, 0, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, data);
    run_to_halt(&mut sim, 100);

    assert_eq!(sim.registers().fpr(2).f(), 5.0);
}

#[test]
fn halt_drains_the_pipeline_before_reaching_halted() {
    let code = vec![
        instr(Opcode::Addi, 0, 1, 0, 1, 0),
        instr(Opcode::Addi, 0, 2, 0, 2, 0),
        instr(Opcode::Halt, 0, 0, 0, 0, 0),
    ];
    let mut sim = make_simulator(Config::default(), code, Memory::new(0));

    sim.step().unwrap();
    assert_ne!(sim.state(), CpuState::Halted);

    run_to_halt(&mut sim, 20);
    assert_eq!(sim.registers().gpr(1).i(), 1);
    assert_eq!(sim.registers().gpr(2).i(), 2);
}
