//! Link port and graylink byte protocol.
//!
//! Grounded on TilEm's `TilemCalcEmulator` link-emulation fields
//! (`ilp_active`/`ilp_error`/`ilp_abort`/`ilp_timeout`, the write/read
//! queues, and `linkport.lines`/`linkport.extlines`) and the
//! `TILEM_STOP_LINK_*` stop-mask bits. Two open-collector lines (tip/ring)
//! are modeled as two-bit "asserted" words per party; the effective line
//! state seen by either side is the OR of both parties' words, matching a
//! real pull-down bus.
//!
//! The graylink protocol sends a 0 bit by pulsing tip low and a 1 bit by
//! pulsing ring low; reception mirrors this by watching for the peer's
//! pulses. This module keeps the state machine but leaves raw 8-cycle bit
//! timing to the caller via `tick`, which the calc's run loop drives once
//! per instruction.

use std::collections::VecDeque;

/// Tip (bit 0) and ring (bit 1) line bits.
pub const LINE_TIP: u8 = 1 << 0;
pub const LINE_RING: u8 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraylinkState {
    Idle,
    SendBit { bit_index: u8, value: u8 },
    RecvBit { bit_index: u8, value: u8 },
    Error,
}

/// Cycles a single bit's pulse is held before the link advances (graylink
/// keeps this fixed regardless of model, unlike the Z80 core's timing).
const BIT_HOLD_CYCLES: u32 = 512;

#[derive(Debug, Clone)]
pub struct LinkPort {
    /// This side's asserted line state (open-collector, so 0 = not driving).
    lines: u8,
    /// The peer's asserted line state, as last observed.
    extlines: u8,
    state: GraylinkState,
    hold: u32,
    ilp_timeout: u32,
    ilp_timeout_max: u32,
    write_queue: VecDeque<u8>,
    read_queue: VecDeque<u8>,
    error: bool,
    /// Set whenever line state changes, so the run loop can wake waiters.
    pub state_changed: bool,
}

impl LinkPort {
    pub fn new() -> Self {
        Self {
            lines: 0,
            extlines: 0,
            state: GraylinkState::Idle,
            hold: 0,
            ilp_timeout: 0,
            ilp_timeout_max: 0,
            write_queue: VecDeque::new(),
            read_queue: VecDeque::new(),
            error: false,
            state_changed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Effective line level observed by either party (OR of both drivers).
    pub fn effective_lines(&self) -> u8 {
        self.lines | self.extlines
    }

    pub fn set_extlines(&mut self, value: u8) {
        if value != self.extlines {
            self.extlines = value;
            self.state_changed = true;
        }
    }

    pub fn lines(&self) -> u8 {
        self.lines
    }

    /// Directly drive the lines, as a Z80 `OUT` to the link port would
    /// (independent of the graylink byte-framing state machine, which only
    /// drives lines while actively sending).
    pub fn set_lines(&mut self, value: u8) {
        self.drive_lines(value & (LINE_TIP | LINE_RING));
    }

    fn drive_lines(&mut self, value: u8) {
        if value != self.lines {
            self.lines = value;
            self.state_changed = true;
        }
    }

    /// Host-side: queue bytes to transmit to the calc, with a deadline in
    /// cycles after which an in-progress send reports `link_error`.
    pub fn send(&mut self, bytes: &[u8], timeout_cycles: u32) {
        self.write_queue.extend(bytes.iter().copied());
        self.ilp_timeout = timeout_cycles;
        self.ilp_timeout_max = timeout_cycles;
        self.error = false;
    }

    /// Host-side: drain bytes the calc has sent.
    pub fn recv(&mut self, max: usize) -> Vec<u8> {
        let n = self.read_queue.len().min(max);
        self.read_queue.drain(..n).collect()
    }

    /// Save-state support: the electrical line state and error latch. The
    /// in-flight byte-framing state and host queues are not preserved across
    /// a save/load cycle (a reload always observes the link as idle).
    pub fn snapshot(&self) -> [u8; 3] {
        [self.lines, self.extlines, self.error as u8]
    }

    pub fn load_snapshot(&mut self, data: &[u8]) {
        if data.len() < 3 {
            return;
        }
        self.lines = data[0];
        self.extlines = data[1];
        self.error = data[2] != 0;
        self.state = if self.error { GraylinkState::Error } else { GraylinkState::Idle };
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn has_pending_write(&self) -> bool {
        !self.write_queue.is_empty() || matches!(self.state, GraylinkState::SendBit { .. })
    }

    /// Advance the protocol state machine by `cycles`. Called once per
    /// instruction boundary by the run loop.
    pub fn tick(&mut self, cycles: u32) {
        if self.error {
            return;
        }

        if self.ilp_timeout_max != 0 {
            if self.ilp_timeout <= cycles {
                self.error = true;
                self.state = GraylinkState::Error;
                self.drive_lines(0);
                self.state_changed = true;
                return;
            }
            self.ilp_timeout -= cycles;
        }

        match self.state {
            GraylinkState::Idle => {
                if let Some(byte) = self.write_queue.pop_front() {
                    self.state = GraylinkState::SendBit { bit_index: 0, value: byte };
                    self.hold = BIT_HOLD_CYCLES;
                    self.pulse_current_bit();
                }
            }
            GraylinkState::SendBit { bit_index, value } => {
                if self.hold <= cycles {
                    self.drive_lines(0);
                    if bit_index == 7 {
                        self.state = GraylinkState::Idle;
                        self.ilp_timeout_max = 0;
                    } else {
                        self.state = GraylinkState::SendBit {
                            bit_index: bit_index + 1,
                            value,
                        };
                        self.hold = BIT_HOLD_CYCLES;
                        self.pulse_current_bit();
                    }
                } else {
                    self.hold -= cycles;
                }
            }
            GraylinkState::RecvBit { .. } => {
                // Reception is driven by `observe_extline_pulse`, not ticks.
            }
            GraylinkState::Error => {}
        }
    }

    fn pulse_current_bit(&mut self) {
        if let GraylinkState::SendBit { bit_index, value } = self.state {
            let bit = (value >> bit_index) & 1;
            let line = if bit == 0 { LINE_TIP } else { LINE_RING };
            self.drive_lines(line);
        }
    }

    /// Observe a pulse on the peer's lines and, if a full byte has been
    /// accumulated, push it onto the host-facing read queue.
    pub fn observe_extline_pulse(&mut self, extlines: u8) {
        self.set_extlines(extlines);
        if extlines == 0 {
            return;
        }
        let bit = if extlines & LINE_TIP != 0 { 0u8 } else { 1u8 };
        match self.state {
            GraylinkState::RecvBit { bit_index, value } => {
                let value = value | (bit << bit_index);
                if bit_index == 7 {
                    self.read_queue.push_back(value);
                    self.state = GraylinkState::Idle;
                } else {
                    self.state = GraylinkState::RecvBit {
                        bit_index: bit_index + 1,
                        value,
                    };
                }
            }
            GraylinkState::Idle => {
                self.state = GraylinkState::RecvBit { bit_index: 1, value: bit };
            }
            _ => {}
        }
    }
}

impl Default for LinkPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_drives_tip_for_zero_bit() {
        let mut link = LinkPort::new();
        link.send(&[0x00], 10_000);
        link.tick(0);
        assert_eq!(link.lines() & LINE_TIP, LINE_TIP);
    }

    #[test]
    fn send_completes_after_eight_bits() {
        let mut link = LinkPort::new();
        link.send(&[0xFF], 100_000);
        for _ in 0..32 {
            link.tick(BIT_HOLD_CYCLES);
        }
        assert!(!link.has_pending_write());
    }

    #[test]
    fn timeout_raises_error_and_releases_lines() {
        let mut link = LinkPort::new();
        link.send(&[0x00], 100);
        link.tick(200);
        assert!(link.is_error());
        assert_eq!(link.lines(), 0);
    }

    #[test]
    fn receiving_a_byte_queues_it_for_host_recv() {
        let mut link = LinkPort::new();
        // Receive 0x01: bits LSB-first, bit0=1 (ring), bits1-7=0 (tip)
        link.observe_extline_pulse(LINE_RING);
        for _ in 0..7 {
            link.observe_extline_pulse(LINE_TIP);
        }
        let received = link.recv(1);
        assert_eq!(received, vec![0x01]);
    }

    #[test]
    fn effective_lines_ors_both_parties() {
        let mut link = LinkPort::new();
        link.drive_lines(LINE_TIP);
        link.set_extlines(LINE_RING);
        assert_eq!(link.effective_lines(), LINE_TIP | LINE_RING);
    }
}
