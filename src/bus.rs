//! System bus connecting the CPU to flash, RAM, and memory-mapped I/O.
//!
//! The Z80's 16-bit address space is split into four fixed 16KB windows
//! (`0x0000`, `0x4000`, `0x8000`, `0xC000`), each independently mapped to a
//! physical 16KB page of either flash or RAM. Port writes from
//! `peripherals::control` retarget these windows (bank switching); the bus
//! itself just resolves `logical address -> (region, physical page, offset)`
//! the way `xc_mem_ltop`/`xc_mem_ptol` do in the original hardware model.
//!
//! Instruction fetches are tracked through a short circular buffer so the
//! flash-unlock byte sequence (the `PROTECTSTATE` detector) can be recognized
//! regardless of where in the fetch stream it starts.

use crate::memory::{Flash, Ram, PAGE_SIZE};
use crate::peripherals::Peripherals;

/// Number of 16KB logical windows in the 64KB address space.
pub const NUM_SLOTS: usize = 4;
/// Size of each logical window.
pub const SLOT_SIZE: usize = 0x4000;

/// Which physical device a logical page slot currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Flash,
    Ram,
    /// The PORT27/PORT28-style "protected window" sentinel page (0xFE):
    /// reads are only honored once the host has unlocked flash (see
    /// [`crate::peripherals::control::Control::flash_unlocked`]); otherwise
    /// they return 0xFF and log a warning instead of touching flash.
    Protected,
}

/// One 16KB logical window's current mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub kind: PageKind,
    pub page: usize,
}

impl PageEntry {
    pub const fn flash(page: usize) -> Self {
        Self {
            kind: PageKind::Flash,
            page,
        }
    }

    pub const fn ram(page: usize) -> Self {
        Self {
            kind: PageKind::Ram,
            page,
        }
    }

    pub const fn protected(page: usize) -> Self {
        Self {
            kind: PageKind::Protected,
            page,
        }
    }
}

/// Region a decoded address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    Flash,
    Ram,
}

/// A non-fatal execute-permission violation observed by `read_m1`, pending
/// until the run loop drains it into `Calc::raise_exception`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecViolation {
    FlashExec,
    RamExec,
}

/// Length of the instruction-fetch history buffer used to recognize the
/// flash-unlock byte sequence regardless of alignment.
const FETCH_BUFFER_SIZE: usize = 8;

/// The byte sequence TI OSes write when entering a flash-unlock routine: a
/// pair of padding bytes followed by `IM 2 / DI / OUT (n),A`-style setup.
/// Recognizing it flags "the next program/erase command came from OS code"
/// for diagnostics; unlike real hardware it does not gate flash writes
/// (arbitrary code can still drive the AMD state machine), since enforcing
/// that privilege boundary is out of scope here.
const PROTECT_SEQUENCE: [u8; 6] = [0x00, 0x00, 0xED, 0x56, 0xF3, 0xD3];

pub struct Bus {
    pub flash: Flash,
    pub ram: Ram,
    pub ports: Peripherals,
    page_map: [PageEntry; NUM_SLOTS],
    cycles: u64,
    fetch_buffer: [u8; FETCH_BUFFER_SIZE],
    fetch_len: usize,
    protect_armed: bool,
    /// Set by `read_m1` when an opcode fetch crosses an execute-permission
    /// window; drained by `Calc::run_cycles` after each `Cpu::step`.
    pub exec_violation: Option<ExecViolation>,
    /// `(mask, lower, upper)` RAM execute window, per the model's
    /// `ModelSpec`; defaults to the disabled sentinel until `Calc::new`
    /// configures it.
    model_ram_exec: (u16, u16, u16),
}

impl Bus {
    pub const FLASH_READ_CYCLES: u64 = 5;
    pub const FLASH_WRITE_CYCLES: u64 = 5;
    pub const RAM_READ_CYCLES: u64 = 2;
    pub const RAM_WRITE_CYCLES: u64 = 2;
    pub const PORT_READ_CYCLES: u64 = 2;
    pub const PORT_WRITE_CYCLES: u64 = 2;
    /// M1 opcode-fetch cost from flash, one cycle above a plain read: the
    /// flash ASIC latches the M1 line earlier in the cycle than an ordinary
    /// MREQ-only access.
    pub const FLASH_EXEC_CYCLES: u64 = 6;
    /// M1 opcode-fetch cost from RAM.
    pub const RAM_EXEC_CYCLES: u64 = 3;

    pub fn new(flash_size: usize, ram_size: usize) -> Self {
        Self::with_peripherals(flash_size, ram_size, Peripherals::new())
    }

    /// Build a bus wired up for a specific model's peripheral set (port map,
    /// LCD panel type, hardware register count) rather than the default
    /// TI-83+-shaped one `new` uses.
    pub fn with_peripherals(flash_size: usize, ram_size: usize, ports: Peripherals) -> Self {
        Self {
            flash: Flash::new(flash_size),
            ram: Ram::new(ram_size),
            ports,
            page_map: [
                PageEntry::flash(0),
                PageEntry::flash(1),
                PageEntry::ram(0),
                PageEntry::ram(1),
            ],
            cycles: 0,
            fetch_buffer: [0; FETCH_BUFFER_SIZE],
            fetch_len: 0,
            protect_armed: false,
            exec_violation: None,
            model_ram_exec: (0, 0, 0xFFFF),
        }
    }

    /// Configure the RAM execute-permission window `read_m1` validates
    /// against, from the owning model's `ModelSpec`.
    pub fn set_ram_exec_window(&mut self, mask: u16, lower: u16, upper: u16) {
        self.model_ram_exec = (mask, lower, upper);
    }

    /// Remap one of the four 16KB logical windows. Called by the control
    /// peripheral's bank-switch port handlers.
    pub fn set_page(&mut self, slot: usize, entry: PageEntry) {
        if slot < NUM_SLOTS {
            self.page_map[slot] = entry;
        }
    }

    pub fn page(&self, slot: usize) -> PageEntry {
        self.page_map[slot]
    }

    /// Logical-to-physical translation (`ltop`): which device and offset a
    /// 16-bit address currently resolves to.
    fn ltop(&self, addr: u16) -> (PageEntry, usize) {
        let slot = (addr as usize) / SLOT_SIZE;
        let within = (addr as usize) % SLOT_SIZE;
        let entry = self.page_map[slot];
        (entry, entry.page * PAGE_SIZE + within)
    }

    pub fn total_cycles(&self) -> u64 {
        self.cycles
    }

    pub fn add_cycles(&mut self, n: u64) {
        self.cycles += n;
    }

    /// Instruction fetch: like `read_byte` but also feeds the
    /// flash-unlock-sequence detector.
    pub fn fetch_byte(&mut self, addr: u32, _pc: u16) -> u8 {
        let val = self.read_byte(addr);
        self.push_fetch(val);
        val
    }

    fn push_fetch(&mut self, byte: u8) {
        if self.fetch_len < FETCH_BUFFER_SIZE {
            self.fetch_buffer[self.fetch_len] = byte;
            self.fetch_len += 1;
        } else {
            self.fetch_buffer.copy_within(1.., 0);
            self.fetch_buffer[FETCH_BUFFER_SIZE - 1] = byte;
        }
        self.protect_armed = self.fetch_len >= PROTECT_SEQUENCE.len()
            && self.fetch_buffer[self.fetch_len - PROTECT_SEQUENCE.len()..self.fetch_len]
                == PROTECT_SEQUENCE;
    }

    /// Whether the flash-unlock byte sequence was just observed in the
    /// instruction stream (diagnostic/tracing use only).
    pub fn protect_sequence_armed(&self) -> bool {
        self.protect_armed
    }

    /// True M1 opcode fetch: like `fetch_byte`, but charges the M1 timing
    /// cost rather than a plain read's, and validates execute permission
    /// against the flash/RAM execute windows. Call this only for the byte
    /// that is itself an opcode (the main opcode and each CB/ED/DD/FD
    /// prefix continuation byte) — displacement and immediate operand
    /// bytes are ordinary reads and must go through `fetch_byte` instead.
    pub fn read_m1(&mut self, addr: u32) -> u8 {
        let addr_u16 = addr as u16;
        let (entry, phys) = self.ltop(addr_u16);
        self.add_cycles(match entry.kind {
            PageKind::Flash | PageKind::Protected => Self::FLASH_EXEC_CYCLES,
            PageKind::Ram => Self::RAM_EXEC_CYCLES,
        });

        match entry.kind {
            PageKind::Flash | PageKind::Protected => {
                if self.ports.control.flash_exec_restricted(entry.page) {
                    log::warn!("fetching opcode from restricted flash page {:#04x}", entry.page);
                    self.exec_violation = Some(ExecViolation::FlashExec);
                }
            }
            PageKind::Ram => {
                let mask = self.model_ram_exec.0;
                let lower = self.model_ram_exec.1;
                let upper = self.model_ram_exec.2;
                let m = (phys as u16) & mask;
                if m < lower || m > upper {
                    log::warn!("fetching opcode from restricted RAM address {:#06x}", addr_u16);
                    self.exec_violation = Some(ExecViolation::RamExec);
                }
            }
        }

        let value = match entry.kind {
            PageKind::Flash => self.flash.read(phys),
            PageKind::Ram => self.ram.read(phys),
            PageKind::Protected => {
                if self.ports.control.flash_unlocked() {
                    self.flash.read(phys)
                } else {
                    log::warn!("read-protected sector at {:#06x} while flash is locked", addr_u16);
                    0xFF
                }
            }
        };

        if value == 0xFF && addr_u16 == 0x0038 {
            log::warn!("no OS installed: fetched 0xFF at the RST 0x38 vector");
            self.exec_violation = Some(ExecViolation::FlashExec);
        }

        self.push_fetch(value);
        value
    }

    pub fn read_byte(&mut self, addr: u32) -> u8 {
        let addr_u16 = addr as u16;
        let (entry, phys) = self.ltop(addr_u16);
        self.add_cycles(match entry.kind {
            PageKind::Flash | PageKind::Protected => Self::FLASH_READ_CYCLES,
            PageKind::Ram => Self::RAM_READ_CYCLES,
        });
        match entry.kind {
            PageKind::Flash => self.flash.read(phys),
            PageKind::Ram => self.ram.read(phys),
            PageKind::Protected => {
                if self.ports.control.flash_unlocked() {
                    self.flash.read(phys)
                } else {
                    log::warn!("read-protected sector at {:#06x} while flash is locked", addr_u16);
                    0xFF
                }
            }
        }
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        let addr = addr as u16;
        let (entry, phys) = self.ltop(addr);
        self.add_cycles(match entry.kind {
            PageKind::Flash | PageKind::Protected => Self::FLASH_WRITE_CYCLES,
            PageKind::Ram => Self::RAM_WRITE_CYCLES,
        });
        match entry.kind {
            PageKind::Flash | PageKind::Protected => self.flash.write(phys, value),
            PageKind::Ram => self.ram.write(phys, value),
        }
    }

    /// Debug-style read with no timing or command-state side effects.
    pub fn peek_byte(&self, addr: u32) -> u8 {
        let (entry, phys) = self.ltop(addr as u16);
        match entry.kind {
            PageKind::Flash | PageKind::Protected => self.flash.peek(phys),
            PageKind::Ram => self.ram.read(phys),
        }
    }

    pub fn read_word(&mut self, addr: u32) -> u16 {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        self.write_byte(addr, value as u8);
        self.write_byte(addr.wrapping_add(1), (value >> 8) as u8);
    }

    /// Port (`IN`) read.
    pub fn port_read(&mut self, port: u16) -> u8 {
        self.add_cycles(Self::PORT_READ_CYCLES);
        let cycle = self.cycles;
        self.ports.read(port, cycle)
    }

    /// Port (`OUT`) write. Bank-switch ports mutate the bus's own page map
    /// directly, so the page map is threaded through rather than owned by
    /// `Peripherals`.
    pub fn port_write(&mut self, port: u16, value: u8) {
        self.add_cycles(Self::PORT_WRITE_CYCLES);
        self.ports.write(port, value, &mut self.page_map);
    }

    /// Advance flash busy-state timers; called once per executed instruction.
    pub fn tick_devices(&mut self, cycles: u32) {
        self.flash.tick(cycles);
    }

    pub fn reset(&mut self) {
        self.page_map = [
            PageEntry::flash(0),
            PageEntry::flash(1),
            PageEntry::ram(0),
            PageEntry::ram(1),
        ];
        self.flash.reset();
        self.ram.reset();
        self.ports.reset();
        self.cycles = 0;
        self.fetch_len = 0;
        self.protect_armed = false;
        self.exec_violation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_window_reads_loaded_rom() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.flash.load_rom(&[0xAB, 0xCD]).unwrap();
        assert_eq!(bus.read_byte(0x0000), 0xAB);
        assert_eq!(bus.read_byte(0x0001), 0xCD);
    }

    #[test]
    fn ram_window_is_writable() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.write_byte(0x8000, 0x42);
        assert_eq!(bus.read_byte(0x8000), 0x42);
    }

    #[test]
    fn read_m1_charges_exec_cycles_not_plain_read_cycles() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.flash.load_rom(&[0x00]).unwrap();
        let before = bus.total_cycles();
        bus.read_m1(0x0000);
        assert_eq!(bus.total_cycles() - before, Bus::FLASH_EXEC_CYCLES);
    }

    #[test]
    fn read_m1_flags_flash_exec_violation_inside_restricted_window() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.flash.load_rom(&[0x00; PAGE_SIZE * 2]).unwrap();
        bus.ports.control.set_flash_exec_lower(0x00);
        bus.ports.control.set_flash_exec_upper(0x00);
        assert!(bus.exec_violation.is_none());
        bus.read_m1(0x0000); // page 0 is inside the restricted window
        assert_eq!(bus.exec_violation, Some(ExecViolation::FlashExec));

        bus.exec_violation = None;
        bus.read_m1(0x4000); // page 1 is outside it
        assert!(bus.exec_violation.is_none());
    }

    #[test]
    fn read_m1_flags_ram_exec_violation_outside_allowed_window() {
        // Unlike the flash window, [lower, upper] is the *allowed* RAM
        // execution range here; a fetch outside it is the violation.
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.set_page(1, PageEntry::ram(0));
        bus.set_ram_exec_window(0xFFFF, 0x0000, 0x0000);
        bus.read_m1(0x4000); // RAM offset 0, inside [0, 0]
        assert!(bus.exec_violation.is_none());

        bus.read_m1(0x4001); // RAM offset 1, outside it
        assert_eq!(bus.exec_violation, Some(ExecViolation::RamExec));
    }

    #[test]
    fn read_m1_flags_missing_os_at_rst38_vector() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        // A blank flash device reads 0xFF everywhere.
        assert!(bus.exec_violation.is_none());
        bus.read_m1(0x0038);
        assert_eq!(bus.exec_violation, Some(ExecViolation::FlashExec));
    }

    #[test]
    fn bank_switch_changes_window_contents() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        let mut data = vec![0u8; PAGE_SIZE * 2];
        data[PAGE_SIZE] = 0x99;
        bus.flash.load_rom(&data).unwrap();

        bus.set_page(1, PageEntry::flash(1));
        assert_eq!(bus.read_byte(0x4000), 0x99);
    }

    #[test]
    fn protected_window_reads_0xff_while_locked() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.flash.load_rom(&[0x42]).unwrap();
        bus.set_page(1, PageEntry::protected(0));
        assert_eq!(bus.read_byte(0x4000), 0xFF);
    }

    #[test]
    fn protected_window_reads_through_once_unlocked() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.flash.load_rom(&[0x42]).unwrap();
        bus.set_page(1, PageEntry::protected(0));
        bus.ports.control.set_flash_unlocked(true);
        assert_eq!(bus.read_byte(0x4000), 0x42);
    }

    #[test]
    fn protect_sequence_is_detected() {
        let mut bus = Bus::new(PAGE_SIZE * 4, PAGE_SIZE * 4);
        bus.flash
            .load_rom(&[0x00, 0x00, 0xED, 0x56, 0xF3, 0xD3])
            .unwrap();
        for addr in 0..6u32 {
            bus.fetch_byte(addr, addr as u16);
        }
        assert!(bus.protect_sequence_armed());
    }
}
