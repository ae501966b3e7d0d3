//! C ABI surface for embedding hosts.
//!
//! Mirrors the teacher's `lib.rs` null-check-then-dereference style
//! (`emu_create`/`emu_destroy`/...), renamed to the `calc_*`/`z80_*`/
//! `timer_*`/`key_*`/`link_*` families this crate's host API actually uses.
//! Structured error types (`RomError`, `StateError`) are converted here into
//! the small negative-integer codes the C boundary expects; core logic never
//! sees raw integers.

use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;
use std::slice;

use crate::calc::{Calc, StopReason};
use crate::error::{RomError, StateError};
use crate::model::ModelId;
use crate::peripherals::LcdDevice;
use crate::state;
use crate::timers::TimerId;

type TimerCallback = extern "C" fn(user: *mut c_void, timer_id: u32);

/// Host-visible handle: a `Calc` plus the timer-callback table the FFI layer
/// maintains on its behalf (the core `Calc`/`TimerWheel` only track
/// opaque ids; dispatching those ids to a host function pointer is this
/// boundary's job, not the core's).
pub struct CalcHandle {
    calc: Calc,
    timer_callbacks: HashMap<TimerId, (TimerCallback, *mut c_void)>,
}

fn model_from_id(model_id: u8) -> Option<ModelId> {
    ModelId::ALL.into_iter().find(|m| *m as u8 == model_id)
}

fn stop_reason_code(reason: StopReason) -> i32 {
    match reason {
        StopReason::RanToCompletion => 0,
        StopReason::Timeout => 1,
        StopReason::InstructionException => 2,
        StopReason::FlashExecViolation => 3,
        StopReason::RamExecViolation => 4,
        StopReason::Breakpoint => 5,
        StopReason::LinkStateChange => 6,
        StopReason::LinkByteIo => 7,
        StopReason::LinkError => 8,
        StopReason::UndocumentedInstruction => 9,
        StopReason::UserRequest => 10,
    }
}

fn rom_error_code(err: RomError) -> i32 {
    match err {
        RomError::TooLarge { .. } => -1,
        RomError::Empty => -2,
    }
}

fn state_error_code(err: StateError) -> i32 {
    match err {
        StateError::BadMagic => -1,
        StateError::ModelMismatch { .. } => -2,
        StateError::UnsupportedVersion { .. } => -3,
        StateError::Truncated { .. } => -4,
        StateError::BufferTooSmall { .. } => -5,
    }
}

/// Create a new calculator instance for the given model id. Returns null if
/// `model_id` names no known model.
#[no_mangle]
pub extern "C" fn calc_new(model_id: u8) -> *mut CalcHandle {
    match model_from_id(model_id) {
        Some(id) => Box::into_raw(Box::new(CalcHandle {
            calc: Calc::new(id),
            timer_callbacks: HashMap::new(),
        })),
        None => ptr::null_mut(),
    }
}

/// Destroy a calculator instance. Safe to call with a null pointer.
#[no_mangle]
pub extern "C" fn calc_free(handle: *mut CalcHandle) {
    if !handle.is_null() {
        unsafe { drop(Box::from_raw(handle)) };
    }
}

#[no_mangle]
pub extern "C" fn calc_reset(handle: *mut CalcHandle) {
    if handle.is_null() {
        return;
    }
    unsafe { &mut *handle }.calc.reset();
}

/// Load a ROM image. Returns 0 on success, a negative `RomError` code on
/// failure.
#[no_mangle]
pub extern "C" fn calc_load_rom(handle: *mut CalcHandle, data: *const u8, len: usize) -> i32 {
    if handle.is_null() || data.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *handle };
    let rom = unsafe { slice::from_raw_parts(data, len) };
    match handle.calc.load_rom(rom) {
        Ok(()) => 0,
        Err(e) => rom_error_code(e),
    }
}

/// Save state into `out` (capacity `cap`). Returns bytes written, or a
/// negative `StateError` code (`BufferTooSmall`) if `cap` is insufficient.
#[no_mangle]
pub extern "C" fn calc_save_state(handle: *const CalcHandle, out: *mut u8, cap: usize) -> i32 {
    if handle.is_null() || out.is_null() {
        return -1;
    }
    let handle = unsafe { &*handle };
    let bytes = state::save(&handle.calc);
    if bytes.len() > cap {
        return state_error_code(StateError::BufferTooSmall {
            need: bytes.len(),
            have: cap,
        });
    }
    let buffer = unsafe { slice::from_raw_parts_mut(out, cap) };
    buffer[..bytes.len()].copy_from_slice(&bytes);
    bytes.len() as i32
}

/// Load state from `data`. Returns 0 on success, a negative `StateError`
/// code on failure; the target `Calc` is left untouched on failure.
#[no_mangle]
pub extern "C" fn calc_load_state(handle: *mut CalcHandle, data: *const u8, len: usize) -> i32 {
    if handle.is_null() || data.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *handle };
    let bytes = unsafe { slice::from_raw_parts(data, len) };
    match state::load(&mut handle.calc, bytes) {
        Ok(()) => 0,
        Err(e) => state_error_code(e),
    }
}

/// Run for up to `cycles` cycles. Writes the stop-reason code to
/// `reason_out` (if non-null) and returns the number of cycles consumed.
#[no_mangle]
pub extern "C" fn z80_run_cycles(handle: *mut CalcHandle, cycles: u64, reason_out: *mut i32) -> u64 {
    if handle.is_null() {
        return 0;
    }
    let handle = unsafe { &mut *handle };
    let outcome = handle.calc.run_cycles(cycles);
    dispatch_fired_timers(handle, &outcome.fired_timers);
    if !reason_out.is_null() {
        unsafe { *reason_out = stop_reason_code(outcome.reason) };
    }
    outcome.cycles_consumed
}

/// Run for up to `microseconds`, converted via the model's clock rate.
#[no_mangle]
pub extern "C" fn z80_run_time(handle: *mut CalcHandle, microseconds: u64, reason_out: *mut i32) -> u64 {
    if handle.is_null() {
        return 0;
    }
    let handle = unsafe { &mut *handle };
    let outcome = handle.calc.run_time(microseconds);
    dispatch_fired_timers(handle, &outcome.fired_timers);
    if !reason_out.is_null() {
        unsafe { *reason_out = stop_reason_code(outcome.reason) };
    }
    outcome.cycles_consumed
}

fn dispatch_fired_timers(handle: &CalcHandle, fired: &[TimerId]) {
    for id in fired {
        if let Some((cb, user)) = handle.timer_callbacks.get(id) {
            cb(*user, *id);
        }
    }
}

/// Request the run loop stop at the next instruction boundary. Callable
/// without any external synchronization (it only touches an atomic flag).
#[no_mangle]
pub extern "C" fn z80_stop(handle: *const CalcHandle) {
    if handle.is_null() {
        return;
    }
    unsafe { &*handle }.calc.request_stop();
}

/// Register a timer. `period_cycles == 0` means one-shot. The callback
/// fires synchronously from within the next `z80_run_cycles`/`z80_run_time`
/// call whose run window crosses the deadline.
#[no_mangle]
pub extern "C" fn timer_add(
    handle: *mut CalcHandle,
    initial_cycles: u64,
    period_cycles: u64,
    cb: TimerCallback,
    user: *mut c_void,
) -> u32 {
    if handle.is_null() {
        return u32::MAX;
    }
    let handle = unsafe { &mut *handle };
    let id = handle.calc.add_timer(initial_cycles, period_cycles);
    handle.timer_callbacks.insert(id, (cb, user));
    id
}

#[no_mangle]
pub extern "C" fn timer_remove(handle: *mut CalcHandle, id: u32) {
    if handle.is_null() {
        return;
    }
    let handle = unsafe { &mut *handle };
    handle.calc.remove_timer(id);
    handle.timer_callbacks.remove(&id);
}

#[no_mangle]
pub extern "C" fn key_press(handle: *mut CalcHandle, group: u8, column: u8) {
    if handle.is_null() {
        return;
    }
    unsafe { &mut *handle }.calc.key_press(group, column);
}

#[no_mangle]
pub extern "C" fn key_release(handle: *mut CalcHandle, group: u8, column: u8) {
    if handle.is_null() {
        return;
    }
    unsafe { &mut *handle }.calc.key_release(group, column);
}

#[no_mangle]
pub extern "C" fn link_send(
    handle: *mut CalcHandle,
    data: *const u8,
    len: usize,
    timeout_cycles: u32,
) -> i32 {
    if handle.is_null() || data.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *handle };
    let bytes = unsafe { slice::from_raw_parts(data, len) };
    handle.calc.link_send(bytes, timeout_cycles);
    0
}

/// Drain up to `cap` received bytes into `out`. Returns the number of bytes
/// written.
#[no_mangle]
pub extern "C" fn link_recv(handle: *mut CalcHandle, out: *mut u8, cap: usize) -> i32 {
    if handle.is_null() || out.is_null() {
        return -1;
    }
    let handle = unsafe { &mut *handle };
    let bytes = handle.calc.link_recv(cap);
    let buffer = unsafe { slice::from_raw_parts_mut(out, cap) };
    buffer[..bytes.len()].copy_from_slice(&bytes);
    bytes.len() as i32
}

/// Copy the current LCD frame into `buf`. Returns the number of bytes
/// written, or a negative code if `cap` is too small.
#[no_mangle]
pub extern "C" fn lcd_get(handle: *const CalcHandle, buf: *mut u8, cap: usize) -> i32 {
    if handle.is_null() || buf.is_null() {
        return -1;
    }
    let handle = unsafe { &*handle };
    let needed = handle.calc.lcd_frame_size();
    if needed > cap {
        return -2;
    }
    let buffer = unsafe { slice::from_raw_parts_mut(buf, cap) };
    LcdDevice::get_frame(&handle.calc.bus.ports.lcd, buffer) as i32
}
