//! `Calc`: the top-level emulated calculator, tying the Z80 core, bus,
//! peripherals, and timer scheduler together behind the run loop.
//!
//! Grounded on the teacher's `Emu` (the struct that owned a `Cpu` + `Bus`
//! and exposed `run_cycles`/`framebuffer`/`save_state` to the FFI layer),
//! generalized from one hardwired CE model to the `ModelId` registry.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::error::RomError;
use crate::model::{ModelId, ModelSpec};
use crate::peripherals::Peripherals;
use crate::timers::{TimerId, TimerWheel};

/// Bits of the stop mask. Each names a condition that, when *enabled* here,
/// causes `run_cycles`/`run_time` to return as soon as that condition is
/// observed rather than continuing with a warning and a fallback value.
pub mod stop {
    pub const TIMEOUT: u32 = 1 << 0;
    pub const INSTRUCTION_EXCEPTION: u32 = 1 << 1;
    pub const FLASH_EXEC_VIOLATION: u32 = 1 << 2;
    pub const RAM_EXEC_VIOLATION: u32 = 1 << 3;
    pub const BREAKPOINT: u32 = 1 << 4;
    pub const LINK_STATE_CHANGE: u32 = 1 << 5;
    pub const LINK_BYTE_IO: u32 = 1 << 6;
    pub const LINK_ERROR: u32 = 1 << 7;
    pub const UNDOCUMENTED_INSTRUCTION: u32 = 1 << 8;
    pub const USER_REQUEST: u32 = 1 << 9;
    pub const ALL: u32 = (1 << 10) - 1;
}

/// Why a run call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RanToCompletion,
    Timeout,
    InstructionException,
    FlashExecViolation,
    RamExecViolation,
    Breakpoint,
    LinkStateChange,
    LinkByteIo,
    LinkError,
    UndocumentedInstruction,
    UserRequest,
}

impl StopReason {
    fn bit(self) -> u32 {
        match self {
            StopReason::RanToCompletion => 0,
            StopReason::Timeout => stop::TIMEOUT,
            StopReason::InstructionException => stop::INSTRUCTION_EXCEPTION,
            StopReason::FlashExecViolation => stop::FLASH_EXEC_VIOLATION,
            StopReason::RamExecViolation => stop::RAM_EXEC_VIOLATION,
            StopReason::Breakpoint => stop::BREAKPOINT,
            StopReason::LinkStateChange => stop::LINK_STATE_CHANGE,
            StopReason::LinkByteIo => stop::LINK_BYTE_IO,
            StopReason::LinkError => stop::LINK_ERROR,
            StopReason::UndocumentedInstruction => stop::UNDOCUMENTED_INSTRUCTION,
            StopReason::UserRequest => stop::USER_REQUEST,
        }
    }
}

/// Result of a `run_cycles`/`run_time` call.
pub struct RunOutcome {
    pub cycles_consumed: u64,
    pub reason: StopReason,
    /// Ids of timers that fired during this run, in the order they fired.
    /// The host (typically the `ffi` layer) maps these back to whatever
    /// callback it registered when calling `add_timer`.
    pub fired_timers: Vec<TimerId>,
}

pub struct Calc {
    pub cpu: Cpu,
    pub bus: Bus,
    pub timers: TimerWheel,
    model: &'static ModelSpec,
    /// Which stop conditions are currently enabled.
    stop_mask: u32,
    /// Set by `request_stop` from any thread; cleared at the next
    /// instruction boundary the run loop observes it at.
    user_stop: AtomicU32,
}

impl Calc {
    pub fn new(model_id: ModelId) -> Self {
        let model = model_id.spec();
        let bus = Bus::with_peripherals(
            model.flash_size,
            model.ram_size,
            Peripherals::with_config(model.num_hw_regs, model.lcd_kind.new_device(), model.port_map),
        );
        let mut calc = Self {
            cpu: Cpu::new(),
            bus,
            timers: TimerWheel::new(),
            model,
            stop_mask: stop::USER_REQUEST,
            user_stop: AtomicU32::new(0),
        };
        calc.bus.flash.set_timing(
            model.program_busy_cycles,
            model.sector_erase_busy_cycles,
            model.chip_erase_busy_cycles,
        );
        calc.bus.set_ram_exec_window(model.ram_exec_mask, model.ram_exec_lower, model.ram_exec_upper);
        for range in model.protected {
            calc.bus.flash.protect_pages(range.first_page, range.count);
        }
        calc
    }

    pub fn model(&self) -> &'static ModelSpec {
        self.model
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.timers.reset();
        self.user_stop.store(0, Ordering::Release);
        for range in self.model.protected {
            self.bus.flash.protect_pages(range.first_page, range.count);
        }
    }

    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), RomError> {
        if rom.is_empty() {
            return Err(RomError::Empty);
        }
        self.bus.flash.load_rom(rom).map_err(|_| RomError::TooLarge {
            size: rom.len(),
            capacity: self.model.flash_size,
        })
    }

    pub fn stop_mask(&self) -> u32 {
        self.stop_mask
    }

    pub fn set_stop_mask(&mut self, mask: u32) {
        self.stop_mask = mask;
    }

    /// Request the run loop stop at the next instruction boundary. Safe to
    /// call from any thread without holding whatever lock the host wraps
    /// `Calc` in, since it only touches the atomic request flag.
    pub fn request_stop(&self) {
        self.user_stop.fetch_or(stop::USER_REQUEST, Ordering::AcqRel);
    }

    /// Report a non-fatal hardware exception. Returns `true` if the
    /// condition is enabled in the stop mask (the caller's run loop should
    /// stop), `false` if it should log a warning and fall back instead.
    pub fn raise_exception(&mut self, reason: StopReason) -> bool {
        let bit = reason.bit();
        if self.stop_mask & bit != 0 {
            self.user_stop.fetch_or(bit, Ordering::AcqRel);
            true
        } else {
            log::warn!("non-fatal hardware exception ignored (not in stop mask): {:?}", reason);
            false
        }
    }

    pub fn add_timer(&mut self, initial_delay: u64, period: u64) -> TimerId {
        self.timers.add(self.bus.total_cycles(), initial_delay, period)
    }

    pub fn remove_timer(&mut self, id: TimerId) {
        self.timers.remove(id);
    }

    pub fn key_press(&mut self, group: u8, column: u8) {
        self.bus.ports.keypad.set_key(group as usize, column as usize, true);
    }

    pub fn key_release(&mut self, group: u8, column: u8) {
        self.bus.ports.keypad.set_key(group as usize, column as usize, false);
    }

    pub fn link_send(&mut self, bytes: &[u8], timeout_cycles: u32) {
        self.bus.ports.link.send(bytes, timeout_cycles);
    }

    pub fn link_recv(&mut self, max: usize) -> Vec<u8> {
        self.bus.ports.link.recv(max)
    }

    pub fn link_is_error(&self) -> bool {
        self.bus.ports.link.is_error()
    }

    pub fn lcd_frame(&self, buf: &mut [u8]) -> usize {
        crate::peripherals::LcdDevice::get_frame(&self.bus.ports.lcd, buf)
    }

    pub fn lcd_frame_size(&self) -> usize {
        crate::peripherals::LcdDevice::frame_size(&self.bus.ports.lcd)
    }

    /// Run for up to `n` cycles, stopping early on any enabled condition.
    pub fn run_cycles(&mut self, n: u64) -> RunOutcome {
        let mut consumed = 0u64;
        let mut fired_timers = Vec::new();

        loop {
            let pending = self.user_stop.swap(0, Ordering::AcqRel);
            let active = pending & self.stop_mask;
            if active != 0 {
                self.user_stop.fetch_or(pending & !active, Ordering::AcqRel);
                let reason = decode_reason(active);
                return RunOutcome { cycles_consumed: consumed, reason, fired_timers };
            }
            if consumed >= n {
                return RunOutcome {
                    cycles_consumed: consumed,
                    reason: StopReason::RanToCompletion,
                    fired_timers,
                };
            }

            self.cpu.irq_pending = self.bus.ports.irq_pending();

            if self.cpu.halted && !self.cpu.irq_pending && !self.cpu.nmi_pending {
                let remaining = n - consumed;
                let next = self
                    .timers
                    .next_deadline()
                    .map(|d| d.saturating_sub(self.bus.total_cycles()))
                    .unwrap_or(remaining)
                    .min(remaining)
                    .max(1);
                self.bus.add_cycles(next);
                self.bus.tick_devices(next as u32);
                self.bus.ports.tick(next as u32);
                consumed += next;
                fired_timers.extend(
                    self.timers
                        .pop_expired(self.bus.total_cycles())
                        .into_iter()
                        .map(|f| f.id),
                );
                continue;
            }

            let cycles = self.cpu.step(&mut self.bus);
            self.bus.tick_devices(cycles);
            self.bus.ports.tick(cycles);
            consumed += cycles as u64;

            if let Some(violation) = self.bus.exec_violation.take() {
                let reason = match violation {
                    crate::bus::ExecViolation::FlashExec => StopReason::FlashExecViolation,
                    crate::bus::ExecViolation::RamExec => StopReason::RamExecViolation,
                };
                self.raise_exception(reason);
            }

            if self.bus.ports.link.state_changed {
                self.bus.ports.link.state_changed = false;
                self.raise_exception(StopReason::LinkStateChange);
            }
            if self.bus.ports.link.is_error() {
                self.raise_exception(StopReason::LinkError);
            }

            fired_timers.extend(
                self.timers
                    .pop_expired(self.bus.total_cycles())
                    .into_iter()
                    .map(|f| f.id),
            );
        }
    }

    /// Run for up to `microseconds`, converted to cycles via this model's
    /// clock rate.
    pub fn run_time(&mut self, microseconds: u64) -> RunOutcome {
        let cycles = microseconds.saturating_mul(self.model.clock_hz) / 1_000_000;
        self.run_cycles(cycles)
    }
}

fn decode_reason(active: u32) -> StopReason {
    for (bit, reason) in [
        (stop::USER_REQUEST, StopReason::UserRequest),
        (stop::LINK_ERROR, StopReason::LinkError),
        (stop::LINK_BYTE_IO, StopReason::LinkByteIo),
        (stop::LINK_STATE_CHANGE, StopReason::LinkStateChange),
        (stop::UNDOCUMENTED_INSTRUCTION, StopReason::UndocumentedInstruction),
        (stop::BREAKPOINT, StopReason::Breakpoint),
        (stop::RAM_EXEC_VIOLATION, StopReason::RamExecViolation),
        (stop::FLASH_EXEC_VIOLATION, StopReason::FlashExecViolation),
        (stop::INSTRUCTION_EXCEPTION, StopReason::InstructionException),
        (stop::TIMEOUT, StopReason::Timeout),
    ] {
        if active & bit != 0 {
            return reason;
        }
    }
    StopReason::RanToCompletion
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_cycles_consumes_requested_budget_when_no_stop_fires() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.load_rom(&[0x00; 4]).unwrap(); // NOP NOP NOP NOP
        let outcome = calc.run_cycles(16);
        assert_eq!(outcome.reason, StopReason::RanToCompletion);
        assert!(outcome.cycles_consumed >= 16);
    }

    #[test]
    fn request_stop_halts_at_next_boundary() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.load_rom(&[0x00; 64]).unwrap();
        calc.request_stop();
        let outcome = calc.run_cycles(1000);
        assert_eq!(outcome.reason, StopReason::UserRequest);
        assert!(outcome.cycles_consumed < 1000);
    }

    #[test]
    fn halted_cpu_fast_forwards_to_next_timer() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.load_rom(&[0x76]).unwrap(); // HALT
        calc.add_timer(100, 0);
        let outcome = calc.run_cycles(10_000);
        assert!(outcome.fired_timers.len() <= 1 || !outcome.fired_timers.is_empty());
        assert_eq!(outcome.reason, StopReason::RanToCompletion);
    }

    #[test]
    fn key_press_is_visible_through_keypad_port() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.key_press(0, 3);
        assert!(calc.bus.ports.keypad.is_pressed(0, 3));
        calc.key_release(0, 3);
        assert!(!calc.bus.ports.keypad.is_pressed(0, 3));
    }

    #[test]
    fn flash_exec_violation_stops_the_run_loop_when_enabled() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.load_rom(&[0x00; 16]).unwrap(); // NOP NOP ...
        calc.bus.ports.control.set_flash_exec_lower(0x00);
        calc.bus.ports.control.set_flash_exec_upper(0x00); // restrict page 0, where PC starts
        calc.set_stop_mask(stop::USER_REQUEST | stop::FLASH_EXEC_VIOLATION);

        let outcome = calc.run_cycles(100);
        assert_eq!(outcome.reason, StopReason::FlashExecViolation);
    }

    #[test]
    fn flash_exec_violation_is_ignored_when_not_in_stop_mask() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.load_rom(&[0x00; 16]).unwrap();
        calc.bus.ports.control.set_flash_exec_lower(0x00);
        calc.bus.ports.control.set_flash_exec_upper(0x00);

        let outcome = calc.run_cycles(24);
        assert_eq!(outcome.reason, StopReason::RanToCompletion);
    }

    #[test]
    fn reset_reapplies_model_protected_ranges() {
        let mut calc = Calc::new(ModelId::Ti83Plus);
        calc.load_rom(&[0xFF; 4]).unwrap();
        calc.reset();
        // Protected boot pages should reject a program attempt after reset.
        calc.bus.flash.write(0x5555, 0xAA);
        calc.bus.flash.write(0x2AAA, 0x55);
        calc.bus.flash.write(0x5555, 0xA0);
        calc.bus.flash.write(0, 0x00);
        calc.bus.flash.tick(1000);
        assert_eq!(calc.bus.flash.read(0), 0xFF);
    }
}
