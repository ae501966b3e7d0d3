//! End-to-end scenarios and the link-symmetry property, exercised against
//! the public `Calc` API the way a host embedding this crate would, rather
//! than poking at a single subsystem in isolation.

use tilem_core::cpu::InterruptMode;
use tilem_core::peripherals::interrupt::sources;
use tilem_core::{Calc, ModelId, StopReason};

fn booted(rom: &[u8]) -> Calc {
    let mut calc = Calc::new(ModelId::Ti83Plus);
    calc.load_rom(rom).unwrap();
    calc
}

/// Cross-wire two link ports for `total_cycles` T-states. The graylink
/// protocol holds each bit for a fixed 512-cycle window (see
/// `peripherals::link::BIT_HOLD_CYCLES`); sampling once per window, at its
/// midpoint, observes every bit exactly once regardless of whether
/// consecutive bits happen to drive the same line (which a plain
/// level-change edge detector would miss).
fn pump_link(a: &mut Calc, b: &mut Calc, total_cycles: usize) {
    const BIT_HOLD_CYCLES: usize = 512;
    for i in 0..total_cycles {
        a.bus.ports.link.tick(1);
        b.bus.ports.link.tick(1);
        if i % BIT_HOLD_CYCLES == BIT_HOLD_CYCLES / 2 {
            let a_lines = a.bus.ports.link.lines();
            let b_lines = b.bus.ports.link.lines();
            a.bus.ports.link.observe_extline_pulse(b_lines);
            b.bus.ports.link.observe_extline_pulse(a_lines);
        }
    }
}

/// E1: `LD A,0x7F; LD B,1; ADD A,B` from reset lands on A=0x80 with the
/// sign/overflow/half-carry flags set and zero/carry/subtract clear.
#[test]
fn e1_arithmetic_sets_the_documented_flags() {
    let mut calc = booted(&[0x3E, 0x7F, 0x06, 0x01, 0x80]);
    calc.run_cycles(100);
    assert_eq!(calc.cpu.a, 0x80);
    assert!(calc.cpu.flag_s());
    assert!(calc.cpu.flag_pv());
    assert!(calc.cpu.flag_h());
    assert!(!calc.cpu.flag_z());
    assert!(!calc.cpu.flag_c());
    assert!(!calc.cpu.flag_n());
}

/// E2: paging port 0x06 retargets logical 0x4000 onto RAM page 1; a read
/// there comes back from RAM rather than flash, at RAM read cost.
#[test]
fn e2_paging_retargets_the_window_to_ram() {
    let mut calc = booted(&[0x00]);
    calc.bus.ram.write(tilem_core::memory::PAGE_SIZE, 0x00);
    calc.bus.port_write(0x06, 0x41); // RAM-select bit (0x40) | page 1

    let before = calc.bus.total_cycles();
    let lo = calc.bus.read_byte(0x4000);
    let hi = calc.bus.read_byte(0x4001);
    let after = calc.bus.total_cycles();
    assert_eq!((lo, hi), (0x00, 0x00));
    assert_eq!(after - before, 2 * tilem_core::bus::Bus::RAM_READ_CYCLES);
}

/// E3: with flash locked, mapping the protected-window sentinel page onto a
/// logical window and reading it returns 0xFF rather than flash contents, at
/// ordinary read cost (no extra clock charge for the gate itself).
#[test]
fn e3_flash_unlock_gate_blocks_protected_reads() {
    let mut calc = booted(&[0x00]);
    calc.bus.flash.load_rom(&[0x42; 0x4000]).unwrap();
    assert!(!calc.bus.ports.control.flash_unlocked());
    calc.bus.port_write(0x06, 0xFE);
    let before = calc.bus.total_cycles();
    let value = calc.bus.read_byte(0x4000);
    let after = calc.bus.total_cycles();
    assert_eq!(value, 0xFF);
    assert_eq!(after - before, tilem_core::bus::Bus::FLASH_READ_CYCLES);

    calc.bus.ports.control.set_flash_unlocked(true);
    assert_eq!(calc.bus.read_byte(0x4000), 0x42);
}

/// E4: with IM 1 and interrupts enabled, a raised IRQ source vectors to
/// 0x0038 at the next instruction boundary once EI's one-instruction delay
/// has elapsed.
#[test]
fn e4_irq_vectors_to_rst_38() {
    let mut calc = booted(&[0xFB, 0x00, 0x00, 0x00, 0x00, 0x00]); // EI; NOP...
    calc.cpu.im = InterruptMode::Mode1;
    calc.bus.ports.interrupt.set_mask(sources::ON_KEY);
    calc.bus.ports.interrupt.raise(sources::ON_KEY);
    calc.run_cycles(200);
    assert_eq!(calc.cpu.pc, 0x0038);
    assert!(!calc.cpu.iff1);
}

/// E5: two calcs with their link ports cross-wired observe the exact byte
/// sequence sent, each within its configured cycle timeout.
#[test]
fn e5_graylink_loopback_delivers_bytes_in_order() {
    let mut a = Calc::new(ModelId::Ti83Plus);
    let mut b = Calc::new(ModelId::Ti83Plus);
    let sent = [0xAA, 0x55, 0xFF];
    a.link_send(&sent, 200_000);
    pump_link(&mut a, &mut b, 40_000);

    assert_eq!(b.link_recv(sent.len()), sent);
    assert!(!a.link_is_error());
    assert!(!b.link_is_error());
}

/// E6: a one-shot timer fires exactly once, on the instruction boundary its
/// deadline is crossed, not before. Deadlines are only checked between
/// instructions (not every T-state), so the budgets here are chosen on NOP's
/// opcode-fetch cost (6 cycles, the M1 cost of fetching from flash) rather
/// than the single-cycle granularity of the scenario as originally phrased.
#[test]
fn e6_one_shot_timer_fires_exactly_once() {
    let mut calc = booted(&[0x00; 2000]);
    calc.add_timer(1000, 0);

    let first = calc.run_cycles(996); // 166 NOPs: total_cycles == 996, deadline not reached
    assert!(first.fired_timers.is_empty());

    let second = calc.run_cycles(4); // one more NOP crosses total_cycles == 1000
    assert_eq!(second.fired_timers.len(), 1);

    let third = calc.run_cycles(1000);
    assert!(third.fired_timers.is_empty(), "one-shot timers must not repeat");
}

/// Property 9: for a looped-back graylink, whatever byte one side sends is
/// exactly what the other side receives, for a range of representative
/// byte values (0x00, 0xFF, and every power-of-two bit pattern).
#[test]
fn property_link_symmetry_holds_for_representative_bytes() {
    for &b in &[0x00u8, 0xFFu8, 0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0xA5] {
        let mut a = Calc::new(ModelId::Ti83Plus);
        let mut bb = Calc::new(ModelId::Ti83Plus);
        a.link_send(&[b], 50_000);
        pump_link(&mut a, &mut bb, 20_000);

        assert_eq!(bb.link_recv(1), vec![b], "byte {:#04x} did not round-trip", b);
    }
}

/// A run that never hits an enabled stop condition reports
/// `RanToCompletion`, matching the default stop mask (`USER_REQUEST` only).
#[test]
fn default_stop_mask_runs_to_completion_without_a_request() {
    let mut calc = booted(&[0x00; 16]);
    let outcome = calc.run_cycles(32);
    assert_eq!(outcome.reason, StopReason::RanToCompletion);
}
