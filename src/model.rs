//! Model registry: per-calculator constants and configuration.
//!
//! The design notes call out two valid shapes for per-model dispatch: a
//! trait implemented per model, or a static table of per-model records
//! indexed by id. Every axis calculator models actually differ on here
//! (flash/RAM size, clock rate, port map, LCD type, flash timing) is *data*,
//! not behavior, so this crate uses the table shape — one `&'static
//! ModelSpec` per [`ModelId`], selected by [`ModelId::spec`] — rather than
//! introducing a trait with no model-specific logic behind it.

use crate::peripherals::lcd::{ColorLcd, Lcd, T6a04};
use crate::peripherals::{PortHandler, PortMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModelId {
    Ti73 = 0,
    Ti81 = 1,
    Ti82 = 2,
    Ti83 = 3,
    Ti83Plus = 4,
    Ti83PlusSe = 5,
    Ti84Plus = 6,
    Ti84PlusSe = 7,
    Ti85 = 8,
    Ti86 = 9,
}

impl ModelId {
    pub const ALL: [ModelId; 10] = [
        ModelId::Ti73,
        ModelId::Ti81,
        ModelId::Ti82,
        ModelId::Ti83,
        ModelId::Ti83Plus,
        ModelId::Ti83PlusSe,
        ModelId::Ti84Plus,
        ModelId::Ti84PlusSe,
        ModelId::Ti85,
        ModelId::Ti86,
    ];

    pub fn spec(self) -> &'static ModelSpec {
        match self {
            ModelId::Ti73 => &TI73,
            ModelId::Ti81 => &TI81,
            ModelId::Ti82 => &TI82,
            ModelId::Ti83 => &TI83,
            ModelId::Ti83Plus => &TI83_PLUS,
            ModelId::Ti83PlusSe => &TI83_PLUS_SE,
            ModelId::Ti84Plus => &TI84_PLUS,
            ModelId::Ti84PlusSe => &TI84_PLUS_SE,
            ModelId::Ti85 => &TI85,
            ModelId::Ti86 => &TI86,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

/// Which panel type a model's LCD controller is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcdKind {
    Mono,
    Color,
}

impl LcdKind {
    pub fn new_device(self) -> Lcd {
        match self {
            LcdKind::Mono => Lcd::Mono(T6a04::new()),
            LcdKind::Color => Lcd::Color(ColorLcd::new()),
        }
    }
}

/// A contiguous run of 16KB flash pages that boots write-protected (e.g. the
/// certificate/boot-code sector on Flash-upgradeable models).
#[derive(Debug, Clone, Copy)]
pub struct ProtectedRange {
    pub first_page: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub id: ModelId,
    pub name: &'static str,
    pub flash_size: usize,
    pub ram_size: usize,
    pub num_hw_regs: usize,
    pub clock_hz: u64,
    pub lcd_kind: LcdKind,
    pub port_map: PortMap,
    pub program_busy_cycles: u32,
    pub sector_erase_busy_cycles: u32,
    pub chip_erase_busy_cycles: u32,
    pub protected: &'static [ProtectedRange],
    /// RAM execute-window mask/lower/upper (the NO_EXEC_RAM_MASK-style
    /// hardware registers). None of the classic-family models this registry
    /// covers implement eZ80-style RAM execution protection, so every model
    /// carries the disabled sentinel (`mask = 0`, `lower = 0`,
    /// `upper = 0xFFFF`), under which `addr & 0 == 0` always falls inside
    /// `[lower, upper]` and the window never restricts anything.
    pub ram_exec_mask: u16,
    pub ram_exec_lower: u16,
    pub ram_exec_upper: u16,
}

/// Disabled RAM execute-window sentinel shared by every model in this
/// registry; see [`ModelSpec::ram_exec_mask`].
const RAM_EXEC_DISABLED: (u16, u16, u16) = (0, 0, 0xFFFF);

const PAGE: usize = 0x4000;

macro_rules! port_map {
    ($name:ident, [$(($port:expr, $handler:expr)),* $(,)?]) => {
        static $name: &[(u8, PortHandler)] = &[$(($port, $handler)),*];
    };
}

port_map!(LEGACY_PORT_MAP, [
    (0x01, PortHandler::KeypadScanGroup),
    (0x00, PortHandler::KeypadData),
    (0x10, PortHandler::LcdCommand),
    (0x11, PortHandler::LcdData),
    (0x09, PortHandler::Link),
    (0x02, PortHandler::InterruptMask),
    (0x03, PortHandler::InterruptAck),
]);

port_map!(PLUS_PORT_MAP, [
    (0x01, PortHandler::KeypadScanGroup),
    (0x00, PortHandler::KeypadData),
    (0x10, PortHandler::LcdCommand),
    (0x11, PortHandler::LcdData),
    (0x09, PortHandler::Link),
    (0x02, PortHandler::InterruptMask),
    (0x03, PortHandler::InterruptAck),
    (0x06, PortHandler::Paging(1)),
    (0x07, PortHandler::Paging(2)),
    (0x14, PortHandler::FlashLock),
    (0x22, PortHandler::FlashExecLower),
    (0x23, PortHandler::FlashExecUpper),
    (0x24, PortHandler::FlashExecExtra),
]);

port_map!(SE_PORT_MAP, [
    (0x01, PortHandler::KeypadScanGroup),
    (0x00, PortHandler::KeypadData),
    (0x10, PortHandler::LcdCommand),
    (0x11, PortHandler::LcdData),
    (0x09, PortHandler::Link),
    (0x02, PortHandler::InterruptMask),
    (0x03, PortHandler::InterruptAck),
    (0x06, PortHandler::Paging(1)),
    (0x07, PortHandler::Paging(2)),
    (0x05, PortHandler::Paging(3)),
    (0x14, PortHandler::FlashLock),
    (0x22, PortHandler::FlashExecLower),
    (0x23, PortHandler::FlashExecUpper),
    (0x24, PortHandler::FlashExecExtra),
]);

static NO_PROTECTED: &[ProtectedRange] = &[];
static PLUS_PROTECTED: &[ProtectedRange] = &[ProtectedRange { first_page: 0, count: 2 }];

static TI73: ModelSpec = ModelSpec {
    id: ModelId::Ti73,
    name: "TI-73",
    flash_size: PAGE * 16,
    ram_size: PAGE * 2,
    num_hw_regs: 8,
    clock_hz: 2_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: LEGACY_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: NO_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI81: ModelSpec = ModelSpec {
    id: ModelId::Ti81,
    name: "TI-81",
    flash_size: PAGE * 2,
    ram_size: PAGE,
    num_hw_regs: 4,
    clock_hz: 2_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: LEGACY_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: NO_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI82: ModelSpec = ModelSpec {
    id: ModelId::Ti82,
    name: "TI-82",
    flash_size: PAGE * 2,
    ram_size: PAGE * 2,
    num_hw_regs: 4,
    clock_hz: 2_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: LEGACY_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: NO_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI83: ModelSpec = ModelSpec {
    id: ModelId::Ti83,
    name: "TI-83",
    flash_size: PAGE * 2,
    ram_size: PAGE * 2,
    num_hw_regs: 8,
    clock_hz: 6_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: LEGACY_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: NO_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI83_PLUS: ModelSpec = ModelSpec {
    id: ModelId::Ti83Plus,
    name: "TI-83 Plus",
    flash_size: PAGE * 128,
    ram_size: PAGE * 2,
    num_hw_regs: 16,
    clock_hz: 6_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: PLUS_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: PLUS_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI83_PLUS_SE: ModelSpec = ModelSpec {
    id: ModelId::Ti83PlusSe,
    name: "TI-83 Plus Silver Edition",
    flash_size: PAGE * 256,
    ram_size: PAGE * 8,
    num_hw_regs: 16,
    clock_hz: 15_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: SE_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: PLUS_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI84_PLUS: ModelSpec = ModelSpec {
    id: ModelId::Ti84Plus,
    name: "TI-84 Plus",
    flash_size: PAGE * 128,
    ram_size: PAGE * 2,
    num_hw_regs: 16,
    clock_hz: 15_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: PLUS_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: PLUS_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI84_PLUS_SE: ModelSpec = ModelSpec {
    id: ModelId::Ti84PlusSe,
    name: "TI-84 Plus Silver Edition",
    flash_size: PAGE * 256,
    ram_size: PAGE * 8,
    num_hw_regs: 16,
    clock_hz: 15_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: SE_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: PLUS_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI85: ModelSpec = ModelSpec {
    id: ModelId::Ti85,
    name: "TI-85",
    flash_size: PAGE * 2,
    ram_size: PAGE * 2,
    num_hw_regs: 8,
    clock_hz: 6_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: LEGACY_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: NO_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

static TI86: ModelSpec = ModelSpec {
    id: ModelId::Ti86,
    name: "TI-86",
    flash_size: PAGE * 8,
    ram_size: PAGE * 8,
    num_hw_regs: 8,
    clock_hz: 6_000_000,
    lcd_kind: LcdKind::Mono,
    port_map: LEGACY_PORT_MAP,
    program_busy_cycles: 20,
    sector_erase_busy_cycles: 4_000,
    chip_erase_busy_cycles: 40_000,
    protected: NO_PROTECTED,
    ram_exec_mask: RAM_EXEC_DISABLED.0,
    ram_exec_lower: RAM_EXEC_DISABLED.1,
    ram_exec_upper: RAM_EXEC_DISABLED.2,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_model_id_resolves_a_spec_with_matching_id() {
        for id in ModelId::ALL {
            assert_eq!(id.spec().id, id);
        }
    }

    #[test]
    fn flash_sizes_are_page_aligned() {
        for id in ModelId::ALL {
            assert_eq!(id.spec().flash_size % PAGE, 0);
        }
    }

    #[test]
    fn colour_models_have_no_entry_yet_use_mono_kind() {
        // None of the classic-family models in this registry are color;
        // CSE/CE-class hardware is out of scope.
        for id in ModelId::ALL {
            assert_eq!(id.spec().lcd_kind, LcdKind::Mono);
        }
    }
}
