//! Z80 calculator emulator core.
//!
//! A cycle-accurate interpreter for the Zilog Z80 CPU and peripheral set
//! shared by the TI-73, TI-81/82/83/85/86, and the 83 Plus/84 Plus (and
//! Silver Edition) family, plus the state container, hardware-timer
//! scheduler, and save-state codec needed to run one forward in time.
//!
//! # Architecture
//!
//! - `cpu`: Z80 registers, flags, and instruction decode/execute
//! - `memory`: flash (AMD/Spansion command state machine) and flat RAM
//! - `bus`: 16-bit address decoding, bank switching, port dispatch
//! - `peripherals`: LCD, keypad, link port, interrupt controller, bank regs
//! - `timers`: binary-heap hardware timer scheduler
//! - `model`: per-calculator constants (flash/RAM size, clock, port map)
//! - `calc`: `Calc`, the run loop, and the stop-mask/exception model
//! - `state`: save-state section codec
//! - `ffi`: `extern "C"` bindings for host embedding
//!
//! # Concurrency
//!
//! `Calc` is `Send` but not `Sync`: it assumes single-threaded access except
//! for [`calc::Calc::request_stop`], which is safe to call from any thread
//! (it only sets an atomic flag). A host embedding multiple threads against
//! one `Calc` is expected to wrap it in its own `Mutex`/`Condvar` pair, the
//! way a GUI frontend would; that orchestration is intentionally outside
//! this crate's scope.

pub mod bus;
pub mod calc;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod model;
pub mod peripherals;
pub mod state;
pub mod timers;

mod ffi;

pub use calc::{Calc, RunOutcome, StopReason};
pub use model::ModelId;
