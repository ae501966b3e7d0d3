//! 8x8 keypad matrix.
//!
//! Writing the scan-group port selects which rows are active (a bitmask, one
//! bit per row); reading the data port returns the OR of the pressed-key
//! bits across the active rows. Hardware is active-low; the matrix itself is
//! kept active-high internally and inverted only at the port boundary, the
//! same split the teacher's keypad controller used for its row data.
//!
//! A small press queue supports macro playback: [`Keypad::schedule`] queues a
//! `(row, col, delay, pressed)` entry; [`Keypad::tick`] counts the delay down
//! and applies the matrix change when it reaches zero.

pub const KEYPAD_ROWS: usize = 8;
pub const KEYPAD_COLS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct QueuedEvent {
    row: usize,
    col: usize,
    delay: u32,
    pressed: bool,
}

#[derive(Debug, Clone)]
pub struct Keypad {
    matrix: [[bool; KEYPAD_COLS]; KEYPAD_ROWS],
    scan_group: u8,
    queue: Vec<QueuedEvent>,
}

impl Keypad {
    pub fn new() -> Self {
        Self {
            matrix: [[false; KEYPAD_COLS]; KEYPAD_ROWS],
            scan_group: 0,
            queue: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.matrix = [[false; KEYPAD_COLS]; KEYPAD_ROWS];
        self.scan_group = 0;
        self.queue.clear();
    }

    pub fn set_key(&mut self, row: usize, col: usize, pressed: bool) {
        if row < KEYPAD_ROWS && col < KEYPAD_COLS {
            self.matrix[row][col] = pressed;
        }
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        row < KEYPAD_ROWS && col < KEYPAD_COLS && self.matrix[row][col]
    }

    /// Queue a key transition to occur after `delay` cycles (macro playback).
    pub fn schedule(&mut self, row: usize, col: usize, delay: u32, pressed: bool) {
        self.queue.push(QueuedEvent { row, col, delay, pressed });
    }

    /// Advance queued events by `cycles`; applies any whose delay has elapsed.
    pub fn tick(&mut self, cycles: u32) {
        let mut i = 0;
        while i < self.queue.len() {
            if self.queue[i].delay <= cycles {
                let ev = self.queue.remove(i);
                self.set_key(ev.row, ev.col, ev.pressed);
            } else {
                self.queue[i].delay -= cycles;
                i += 1;
            }
        }
    }

    /// Pack the matrix into one byte per row (bit = column), for save-state
    /// persistence. Queued macro events are not persisted.
    pub fn matrix_bits(&self) -> [u8; KEYPAD_ROWS] {
        let mut out = [0u8; KEYPAD_ROWS];
        for row in 0..KEYPAD_ROWS {
            let mut bits = 0u8;
            for col in 0..KEYPAD_COLS {
                if self.matrix[row][col] {
                    bits |= 1 << col;
                }
            }
            out[row] = bits;
        }
        out
    }

    pub fn load_matrix_bits(&mut self, bits: &[u8]) {
        for (row, byte) in bits.iter().take(KEYPAD_ROWS).enumerate() {
            for col in 0..KEYPAD_COLS {
                self.matrix[row][col] = byte & (1 << col) != 0;
            }
        }
    }

    pub fn write_scan_group(&mut self, value: u8) {
        self.scan_group = value;
    }

    pub fn scan_group(&self) -> u8 {
        self.scan_group
    }

    /// Active-low OR of pressed keys across the rows selected by the scan
    /// group, one bit per column.
    pub fn read_data(&self) -> u8 {
        let mut pressed_cols = 0u8;
        for row in 0..KEYPAD_ROWS {
            if self.scan_group & (1 << row) != 0 {
                for col in 0..KEYPAD_COLS {
                    if self.matrix[row][col] {
                        pressed_cols |= 1 << col;
                    }
                }
            }
        }
        !pressed_cols
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}
