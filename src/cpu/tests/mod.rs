//! Z80 CPU tests
//!
//! - `instructions.rs`: individual instruction and instruction-family tests
//! - `parity.rs`: property tests for the flag-derivation and DAA laws

use super::*;
use crate::bus::Bus;

mod instructions;

/// A bus backed by flat RAM across the whole address space, so test programs
/// can be poked in directly without touching the flash command state machine.
pub(crate) fn test_bus() -> Bus {
    let mut bus = Bus::new(0x4000, 0x10000);
    bus.set_page(0, crate::bus::PageEntry::ram(0));
    bus.set_page(1, crate::bus::PageEntry::ram(1));
    bus.set_page(2, crate::bus::PageEntry::ram(2));
    bus.set_page(3, crate::bus::PageEntry::ram(3));
    bus
}

pub(crate) fn load_program(bus: &mut Bus, at: u16, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        bus.write_byte(at as u32 + i as u32, *b);
    }
}

#[allow(dead_code)]
pub(crate) fn assert_flags(cpu: &Cpu, expected: u8, context: &str) {
    assert_eq!(
        cpu.f, expected,
        "{}: flags mismatch. expected {:08b}, got {:08b} (S={} Z={} H={} PV={} N={} C={})",
        context,
        expected,
        cpu.f,
        cpu.flag_s() as u8,
        cpu.flag_z() as u8,
        cpu.flag_h() as u8,
        cpu.flag_pv() as u8,
        cpu.flag_n() as u8,
        cpu.flag_c() as u8,
    );
}

#[test]
fn fresh_cpu_matches_power_on_state() {
    let cpu = Cpu::new();
    assert_eq!(cpu.pc, 0x0000);
    assert_eq!(cpu.sp, 0xFFFF);
    assert_eq!(cpu.a, 0xFF);
    assert!(!cpu.iff1);
    assert!(!cpu.halted);
}
