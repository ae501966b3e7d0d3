//! Instruction-level tests for the classic Z80 core.

use super::*;

fn run_one(cpu: &mut Cpu, bus: &mut Bus) -> u32 {
    cpu.step(bus)
}

#[test]
fn nop_advances_pc_by_one() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0x00]);
    cpu.pc = 0;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 1);
}

#[test]
fn ld_r_n_loads_immediate_into_register() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0x06, 0x42]); // LD B,0x42
    cpu.pc = 0;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.b(), 0x42);
    assert_eq!(cpu.pc, 2);
}

#[test]
fn ld_rp_nn_loads_16_bit_immediate() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0x21, 0x34, 0x12]); // LD HL,0x1234
    cpu.pc = 0;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.hl, 0x1234);
}

#[test]
fn inc_b_sets_zero_flag_on_wraparound() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0x04]); // INC B
    cpu.pc = 0;
    cpu.set_b(0xFF);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.b(), 0x00);
    assert!(cpu.flag_z());
}

#[test]
fn dec_b_sets_half_carry_on_nibble_borrow() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0x05]); // DEC B
    cpu.pc = 0;
    cpu.set_b(0x00);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.b(), 0xFF);
    assert!(cpu.flag_n());
}

#[test]
fn add_a_n_sets_carry_on_overflow() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xC6, 0x01]); // ADD A,1
    cpu.pc = 0;
    cpu.a = 0xFF;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.a, 0x00);
    assert!(cpu.flag_c());
    assert!(cpu.flag_z());
}

#[test]
fn sub_n_clears_zero_when_result_nonzero() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xD6, 0x01]); // SUB 1
    cpu.pc = 0;
    cpu.a = 0x05;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.a, 0x04);
    assert!(!cpu.flag_z());
    assert!(cpu.flag_n());
}

#[test]
fn jp_nn_sets_pc_directly() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xC3, 0x00, 0x40]); // JP 0x4000
    cpu.pc = 0;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x4000);
}

#[test]
fn call_and_ret_round_trip_through_the_stack() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xCD, 0x00, 0x10]); // CALL 0x1000
    load_program(&mut bus, 0x1000, &[0xC9]); // RET
    cpu.pc = 0;
    cpu.sp = 0x2000;
    run_one(&mut cpu, &mut bus); // CALL
    assert_eq!(cpu.pc, 0x1000);
    run_one(&mut cpu, &mut bus); // RET
    assert_eq!(cpu.pc, 0x0003);
    assert_eq!(cpu.sp, 0x2000);
}

#[test]
fn push_pop_round_trips_a_register_pair() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xC5, 0xD1]); // PUSH BC; POP DE
    cpu.pc = 0;
    cpu.sp = 0x2000;
    cpu.bc = 0xBEEF;
    run_one(&mut cpu, &mut bus);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.de, 0xBEEF);
    assert_eq!(cpu.sp, 0x2000);
}

#[test]
fn halt_stalls_the_pc_until_an_interrupt_wakes_it() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0x76]); // HALT
    cpu.pc = 0;
    run_one(&mut cpu, &mut bus);
    assert!(cpu.halted);
    assert_eq!(cpu.pc, 1);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 1, "HALT must not advance PC while stalled");

    cpu.iff1 = true;
    cpu.irq_pending = true;
    cpu.im = InterruptMode::Mode1;
    run_one(&mut cpu, &mut bus);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0038);
}

#[test]
fn di_clears_iff1_and_ei_takes_effect_after_the_next_instruction() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xFB, 0x00, 0x00]); // EI; NOP; NOP
    cpu.pc = 0;
    cpu.iff1 = false;
    run_one(&mut cpu, &mut bus); // EI
    assert!(!cpu.iff1, "EI's effect is delayed by one instruction");
    run_one(&mut cpu, &mut bus); // NOP — EI takes effect here
    assert!(cpu.iff1);
}

#[test]
fn bit_instruction_via_cb_prefix_tests_a_bit_without_mutating_it() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xCB, 0x47]); // BIT 0,A
    cpu.pc = 0;
    cpu.a = 0x00;
    run_one(&mut cpu, &mut bus);
    assert!(cpu.flag_z());
    assert_eq!(cpu.a, 0x00);
}

#[test]
fn exx_swaps_in_the_shadow_register_set() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    load_program(&mut bus, 0, &[0xD9]); // EXX
    cpu.pc = 0;
    cpu.bc = 0x1111;
    cpu.bc_prime = 0x2222;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.bc, 0x2222);
    assert_eq!(cpu.bc_prime, 0x1111);
}

#[test]
fn nmi_vectors_to_0x0066_and_preserves_iff1_in_iff2() {
    let mut cpu = Cpu::new();
    let mut bus = test_bus();
    cpu.pc = 0x1234;
    cpu.sp = 0x2000;
    cpu.iff1 = true;
    cpu.nmi_pending = true;
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x0066);
    assert!(!cpu.iff1);
    assert!(cpu.iff2);
}

#[test]
fn cpu_state_snapshot_round_trips() {
    let mut cpu = Cpu::new();
    cpu.a = 0x11;
    cpu.bc = 0x2233;
    cpu.pc = 0x4455;
    cpu.iff1 = true;
    let snap = cpu.to_bytes();

    let mut restored = Cpu::new();
    restored.from_bytes(&snap).unwrap();
    assert_eq!(restored.a, 0x11);
    assert_eq!(restored.bc, 0x2233);
    assert_eq!(restored.pc, 0x4455);
    assert!(restored.iff1);
}
