//! Port-mapped peripheral controllers.
//!
//! Unlike the 24-bit eZ80 parts, the classic Z80 calculators address
//! peripherals through the 8-bit `IN`/`OUT` port space rather than memory.
//! Each model publishes a `&'static [(u8, PortHandler)]` table; [`Peripherals`]
//! looks up the handler tag for a given port and dispatches to the matching
//! controller, the same range-dispatch shape the teacher's
//! `Peripherals::read`/`write` used for its memory-mapped windows.

pub mod control;
pub mod interrupt;
pub mod keypad;
pub mod lcd;
pub mod link;

pub use control::Control;
pub use interrupt::InterruptController;
pub use keypad::Keypad;
pub use lcd::{Lcd, LcdDevice, LcdSnapshot, T6a04};
pub use link::LinkPort;

use crate::bus::{PageEntry, NUM_SLOTS};
use interrupt::sources;

/// What a given port number does when read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortHandler {
    LcdCommand,
    LcdData,
    KeypadScanGroup,
    KeypadData,
    Link,
    FlashLock,
    /// Bank-switch port; the value selects the page mapped into this bus
    /// window slot.
    Paging(usize),
    InterruptMask,
    InterruptAck,
    /// PORT22: low byte of the flash execute-window's first restricted page.
    FlashExecLower,
    /// PORT23: low byte of the flash execute-window's last restricted page.
    FlashExecUpper,
    /// PORT24: high bits of PORT22/PORT23.
    FlashExecExtra,
    /// Generic hardware register with no special side effect, addressed by
    /// index into `Control`'s flat register array.
    Raw(usize),
}

pub type PortMap = &'static [(u8, PortHandler)];

/// Default TI-83+-shaped port map, used when no model-specific map is
/// supplied (e.g. by unit tests exercising `Bus` in isolation).
pub static DEFAULT_PORT_MAP: &[(u8, PortHandler)] = &[
    (0x06, PortHandler::Paging(1)),
    (0x07, PortHandler::Paging(2)),
    (0x10, PortHandler::LcdCommand),
    (0x11, PortHandler::LcdData),
    (0x01, PortHandler::KeypadScanGroup),
    (0x00, PortHandler::KeypadData),
    (0x02, PortHandler::InterruptMask),
    (0x03, PortHandler::InterruptAck),
    (0x09, PortHandler::Link),
    (0x14, PortHandler::FlashLock),
];

pub const DEFAULT_NUM_HW_REGS: usize = 16;

#[derive(Debug, Clone)]
pub struct Peripherals {
    pub control: Control,
    pub interrupt: InterruptController,
    pub keypad: Keypad,
    pub lcd: Lcd,
    pub link: LinkPort,
    port_map: PortMap,
}

impl Peripherals {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_NUM_HW_REGS, Lcd::Mono(T6a04::new()), DEFAULT_PORT_MAP)
    }

    pub fn with_config(num_hw_regs: usize, lcd: Lcd, port_map: PortMap) -> Self {
        Self {
            control: Control::new(num_hw_regs),
            interrupt: InterruptController::new(),
            keypad: Keypad::new(),
            lcd,
            link: LinkPort::new(),
            port_map,
        }
    }

    pub fn reset(&mut self) {
        self.control.reset();
        self.interrupt.reset();
        self.keypad.reset();
        self.lcd.reset();
        self.link.reset();
    }

    fn handler_for(&self, port: u16) -> Option<PortHandler> {
        let port = (port & 0xFF) as u8;
        self.port_map
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, h)| *h)
    }

    pub fn read(&mut self, port: u16, _cycle: u64) -> u8 {
        match self.handler_for(port) {
            Some(PortHandler::LcdCommand) | Some(PortHandler::LcdData) => self.lcd.read_status(),
            Some(PortHandler::KeypadScanGroup) => self.keypad.scan_group(),
            Some(PortHandler::KeypadData) => self.keypad.read_data(),
            Some(PortHandler::Link) => self.link.effective_lines(),
            Some(PortHandler::FlashLock) => self.control.flash_unlocked() as u8,
            Some(PortHandler::InterruptMask) => self.interrupt.mask(),
            Some(PortHandler::InterruptAck) => self.interrupt.status(),
            Some(PortHandler::FlashExecLower) => self.control.flash_exec_window().0 as u8,
            Some(PortHandler::FlashExecUpper) => self.control.flash_exec_window().1 as u8,
            Some(PortHandler::FlashExecExtra) => 0xFF,
            Some(PortHandler::Raw(idx)) => self.control.read_raw(idx),
            Some(PortHandler::Paging(slot)) => slot as u8,
            None => 0xFF,
        }
    }

    pub fn write(&mut self, port: u16, value: u8, page_map: &mut [PageEntry; NUM_SLOTS]) {
        match self.handler_for(port) {
            Some(PortHandler::LcdCommand) => self.lcd.command(value),
            Some(PortHandler::LcdData) => self.lcd.data_write(value),
            Some(PortHandler::KeypadScanGroup) => self.keypad.write_scan_group(value),
            Some(PortHandler::KeypadData) => {}
            Some(PortHandler::Link) => self.link.set_lines(value),
            Some(PortHandler::FlashLock) => self.control.set_flash_unlocked(value != 0),
            Some(PortHandler::Paging(slot)) => {
                if slot < NUM_SLOTS {
                    page_map[slot] = Control::decode_page(value);
                }
            }
            Some(PortHandler::InterruptMask) => self.interrupt.set_mask(value),
            Some(PortHandler::InterruptAck) => self.interrupt.acknowledge(value),
            Some(PortHandler::FlashExecLower) => self.control.set_flash_exec_lower(value),
            Some(PortHandler::FlashExecUpper) => self.control.set_flash_exec_upper(value),
            Some(PortHandler::FlashExecExtra) => self.control.set_flash_exec_extra(value),
            Some(PortHandler::Raw(idx)) => self.control.write_raw(idx, value),
            None => {}
        }
    }

    /// Advance keypad macro playback, link-port framing, and raise the ON-key
    /// interrupt source if latched. Called once per executed instruction.
    pub fn tick(&mut self, cycles: u32) {
        self.keypad.tick(cycles);
        self.link.tick(cycles);
        if self.link.is_error() {
            self.interrupt.raise(sources::LINK);
        }
    }

    pub fn irq_pending(&self) -> bool {
        self.interrupt.irq_pending()
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PageKind;

    fn blank_page_map() -> [PageEntry; NUM_SLOTS] {
        [
            PageEntry::flash(0),
            PageEntry::flash(1),
            PageEntry::ram(0),
            PageEntry::ram(1),
        ]
    }

    #[test]
    fn paging_port_retargets_slot() {
        let mut p = Peripherals::new();
        let mut pm = blank_page_map();
        p.write(0x06, 0x42, &mut pm);
        assert_eq!(pm[1].kind, PageKind::Ram);
        assert_eq!(pm[1].page, 2);
    }

    #[test]
    fn keypad_routes_through_default_map() {
        let mut p = Peripherals::new();
        let mut pm = blank_page_map();
        p.keypad.set_key(0, 3, true);
        p.write(0x01, 0x01, &mut pm);
        assert_eq!(p.read(0x00, 0), 0xFF ^ (1 << 3));
    }

    #[test]
    fn interrupt_mask_and_ack_round_trip() {
        let mut p = Peripherals::new();
        let mut pm = blank_page_map();
        p.write(0x02, 0x01, &mut pm);
        p.interrupt.raise(0x01);
        assert!(p.irq_pending());
        p.write(0x03, 0x01, &mut pm);
        assert!(!p.irq_pending());
    }

    #[test]
    fn unmapped_port_reads_high() {
        let mut p = Peripherals::new();
        assert_eq!(p.read(0xAB, 0), 0xFF);
    }

    #[test]
    fn reset_clears_subsystems() {
        let mut p = Peripherals::new();
        p.keypad.set_key(1, 1, true);
        p.interrupt.raise(0x01);
        p.reset();
        assert!(!p.keypad.is_pressed(1, 1));
        assert!(!p.irq_pending());
    }
}
