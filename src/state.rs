//! Save-state codec.
//!
//! Format: magic `TILEM`, a format version, the model id, then a sequence of
//! length-prefixed sections (cpu, clock, hwregs, ram, flash, lcd, keypad,
//! link, timers). Unknown trailing sections are skipped with a warning so
//! newer save files stay loadable by older builds, matching the teacher's
//! forward-compatible section layout in its own state writer.
//!
//! Loading always decodes into a scratch `Calc` and only swaps it into the
//! caller's on full success, so a truncated or corrupt file never leaves the
//! caller's `Calc` partially mutated.

use crate::calc::Calc;
use crate::cpu::Cpu;
use crate::error::StateError;
use crate::model::ModelId;
use crate::peripherals::LcdSnapshot;

const MAGIC: &[u8; 5] = b"TILEM";
const FORMAT_VERSION: u16 = 1;

fn write_section(out: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, section: &'static str) -> Result<&'a [u8], StateError> {
        if self.data.len() < self.pos + n {
            return Err(StateError::Truncated {
                section,
                need: n,
                have: self.data.len() - self.pos,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read one `(tag, length-prefixed body)` section, if any remain.
    fn next_section(&mut self) -> Result<Option<([u8; 4], &'a [u8])>, StateError> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        let tag_bytes = self.take(4, "section-tag")?;
        let tag = [tag_bytes[0], tag_bytes[1], tag_bytes[2], tag_bytes[3]];
        let len_bytes = self.take(4, "section-length")?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        let body = self.take(len, "section-body")?;
        Ok(Some((tag, body)))
    }
}

/// Serialize `calc`'s full state into a save-state byte buffer.
pub fn save(calc: &Calc) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(calc.model().id as u8);

    write_section(&mut out, b"CPU0", &calc.cpu.to_bytes());
    write_section(&mut out, b"CLK0", &calc.bus.total_cycles().to_le_bytes());
    write_section(&mut out, b"HWR0", calc.bus.ports.control.regs());
    write_section(&mut out, b"RAM0", calc.bus.ram.data());
    write_section(&mut out, b"FLH0", calc.bus.flash.data());
    write_section(&mut out, b"LCD0", &calc.bus.ports.lcd.snapshot());
    write_section(&mut out, b"KEY0", &calc.bus.ports.keypad.matrix_bits());
    write_section(&mut out, b"LNK0", &calc.bus.ports.link.snapshot());
    write_section(&mut out, b"TMR0", &calc.timers.to_bytes());

    out
}

/// Restore `calc`'s state from a buffer produced by [`save`].
///
/// Decoding happens into a scratch [`Calc`] for the same model; `calc` is
/// only overwritten once every required section has parsed successfully.
pub fn load(calc: &mut Calc, data: &[u8]) -> Result<(), StateError> {
    if data.len() < MAGIC.len() + 2 + 1 || &data[..MAGIC.len()] != MAGIC {
        return Err(StateError::BadMagic);
    }
    let mut pos = MAGIC.len();
    let version = u16::from_le_bytes([data[pos], data[pos + 1]]);
    pos += 2;
    if version > FORMAT_VERSION {
        return Err(StateError::UnsupportedVersion {
            found: version,
            max_supported: FORMAT_VERSION,
        });
    }
    let model_byte = data[pos];
    pos += 1;
    let found_model = ModelId::ALL
        .into_iter()
        .find(|m| *m as u8 == model_byte)
        .ok_or(StateError::BadMagic)?;
    if found_model != calc.model().id {
        return Err(StateError::ModelMismatch {
            expected: calc.model().id,
            found: found_model,
        });
    }

    let mut scratch = Calc::new(found_model);
    let mut reader = Reader::new(&data[pos..]);

    while let Some((tag, body)) = reader.next_section()? {
        match &tag {
            b"CPU0" => {
                let mut cpu = Cpu::new();
                cpu.from_bytes(body)?;
                scratch.cpu = cpu;
            }
            b"CLK0" => {
                if body.len() < 8 {
                    return Err(StateError::Truncated { section: "clock", need: 8, have: body.len() });
                }
                let clock = u64::from_le_bytes(body[..8].try_into().unwrap());
                scratch.bus.add_cycles(clock);
            }
            b"HWR0" => scratch.bus.ports.control.load_regs(body),
            b"RAM0" => scratch.bus.ram.load_data(body),
            b"FLH0" => scratch.bus.flash.load_data(body),
            b"LCD0" => scratch.bus.ports.lcd.load_snapshot(body),
            b"KEY0" => scratch.bus.ports.keypad.load_matrix_bits(body),
            b"LNK0" => scratch.bus.ports.link.load_snapshot(body),
            b"TMR0" => scratch.timers.from_bytes(body)?,
            other => {
                log::warn!(
                    "save state: skipping unknown section `{}`",
                    String::from_utf8_lossy(other)
                );
            }
        }
    }

    *calc = scratch;
    Ok(())
}
