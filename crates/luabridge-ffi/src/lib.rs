//! C FFI bindings for luabridge
//!
//! This module provides a C-compatible API for embedding Lua through luabridge.
//! The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - Error handling via out-parameters
//! - Opaque pointers for states and call frames
//! - Manual memory management
//!
//! A state is not thread-safe; use each `LbState` from one thread. The
//! only call allowed from another thread is `lb_state_abort`.

use std::ffi::{c_void, CStr, CString};
use std::fmt::Display;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use luabridge_engine::{
    AbortHandle, Bridge, BridgeError, HostFrame, HostValue, LuaState, PanicObserver, StateOptions,
    StepObserver,
};

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to a Lua state
#[repr(C)]
pub struct LbState {
    _private: [u8; 0],
}

/// Opaque handle to the frame of one host function call
#[repr(C)]
pub struct LbFrame {
    _private: [u8; 0],
}

/// Error information
#[repr(C)]
pub struct LbError {
    message: *mut c_char,
}

/// Step callback: `(instance handle, step count, user data)`
pub type LbStepCallback = extern "C" fn(u64, u64, *mut c_void);

/// Panic callback: `(instance handle, message, user data)`; the message is
/// only valid during the call
pub type LbPanicCallback = extern "C" fn(u64, *const c_char, *mut c_void);

/// Host function: `(instance handle, callable id, frame, user data)`.
///
/// Returns the number of pushed values to return to the script, or a
/// negative value to raise the error set with `lb_frame_set_error`.
pub type LbFuncCallback = extern "C" fn(u64, u32, *mut LbFrame, *mut c_void) -> c_int;

// Internal representation of a state (not exposed to C)
struct StateHandle {
    state: LuaState,
    abort: AbortHandle,
}

// Internal representation of a frame (not exposed to C)
struct FrameHandle<'a> {
    frame: &'a mut dyn HostFrame,
    error: Option<String>,
}

/// C user data pointer carried into host-side closures
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// The host that registered the pointer is responsible for its thread-safety
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn get(self) -> *mut c_void {
        self.0
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn bridge() -> &'static Bridge {
    static BRIDGE: OnceLock<Bridge> = OnceLock::new();
    BRIDGE.get_or_init(Bridge::new)
}

/// Convert Rust string to C string (caller must free); interior NULs become spaces
fn rust_to_c_string(s: &str) -> *mut c_char {
    match CString::new(s.replace('\0', " ")) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Set error out-parameter
unsafe fn set_error(error_out: *mut *mut LbError, error: impl Display) {
    if !error_out.is_null() {
        let message = rust_to_c_string(&error.to_string());
        *error_out = Box::into_raw(Box::new(LbError { message }));
    }
}

unsafe fn state_ref<'a>(state: *mut LbState) -> Option<&'a StateHandle> {
    (state as *const StateHandle).as_ref()
}

unsafe fn frame_mut<'a>(frame: *mut LbFrame) -> Option<&'a mut FrameHandle<'a>> {
    (frame as *mut FrameHandle<'a>).as_mut()
}

unsafe fn source_str<'a>(source: *const u8, length: usize) -> Result<&'a str, &'static str> {
    if source.is_null() {
        return Err("Invalid arguments (null pointer)");
    }
    std::str::from_utf8(std::slice::from_raw_parts(source, length))
        .map_err(|_| "Invalid UTF-8 in source")
}

// ============================================================================
// State Lifecycle Functions
// ============================================================================

/// Create a new Lua state
///
/// # Arguments
/// * `step_limit` - Step budget, 0 = unlimited
/// * `timeout_ms` - Wall-clock budget from creation, 0 = none
/// * `open_libs` - Non-zero to open the safe standard libraries
/// * `error` - Optional pointer to receive error information
///
/// # Returns
/// * Non-null pointer to LbState on success
/// * NULL on failure (check error parameter)
///
/// # Safety
/// The returned state must be freed with `lb_state_destroy()`
///
/// # Example (C)
/// ```c
/// LbError* error = NULL;
/// LbState* state = lb_state_new(100000, 5000, 1, &error);
/// if (state == NULL) {
///     fprintf(stderr, "Failed to create state: %s\n", lb_error_message(error));
///     lb_error_free(error);
///     return 1;
/// }
/// lb_state_destroy(state);
/// ```
#[no_mangle]
pub unsafe extern "C" fn lb_state_new(
    step_limit: u64,
    timeout_ms: u64,
    open_libs: c_int,
    error: *mut *mut LbError,
) -> *mut LbState {
    let mut options = StateOptions::default()
        .with_step_limit(step_limit)
        .with_open_libs(open_libs != 0);
    if timeout_ms > 0 {
        options = options.with_timeout(Duration::from_millis(timeout_ms));
    }

    match bridge().new_state(&options) {
        Ok(state) => {
            let abort = state.abort_handle();
            Box::into_raw(Box::new(StateHandle { state, abort })) as *mut LbState
        }
        Err(e) => {
            set_error(error, e);
            ptr::null_mut()
        }
    }
}

/// Destroy a Lua state and unregister its handle
///
/// # Safety
/// - State pointer must be NULL or created by `lb_state_new()`
/// - State must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn lb_state_destroy(state: *mut LbState) {
    if state.is_null() {
        return;
    }

    let handle = Box::from_raw(state as *mut StateHandle);
    drop(handle);
}

/// Get the instance handle passed to callbacks of this state (0 if NULL)
///
/// # Safety
/// State pointer must be NULL or valid
#[no_mangle]
pub unsafe extern "C" fn lb_state_handle(state: *mut LbState) -> u64 {
    state_ref(state).map_or(0, |h| h.state.id().as_u64())
}

// ============================================================================
// Execution Functions
// ============================================================================

/// Load and run a chunk
///
/// # Arguments
/// * `state` - Pointer to LbState (must not be NULL)
/// * `source` - UTF-8 chunk source
/// * `length` - Length of `source` in bytes
/// * `error` - Optional pointer to receive error information
///
/// # Returns
/// * 0 on success
/// * -1 on failure (check error parameter)
///
/// # Safety
/// - State pointer must be valid
/// - Source pointer must be valid for `length` bytes
#[no_mangle]
pub unsafe extern "C" fn lb_state_exec(
    state: *mut LbState,
    source: *const u8,
    length: usize,
    error: *mut *mut LbError,
) -> c_int {
    let Some(handle) = state_ref(state) else {
        set_error(error, "Invalid arguments (null pointer)");
        return -1;
    };
    let source = match source_str(source, length) {
        Ok(s) => s,
        Err(msg) => {
            set_error(error, msg);
            return -1;
        }
    };

    match handle.state.exec(source) {
        Ok(()) => 0,
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

/// Compile a chunk without running it
///
/// # Returns
/// * 0 if the chunk compiles
/// * -1 on failure (check error parameter)
///
/// # Safety
/// - State pointer must be valid
/// - Source pointer must be valid for `length` bytes
#[no_mangle]
pub unsafe extern "C" fn lb_state_check(
    state: *mut LbState,
    source: *const u8,
    length: usize,
    error: *mut *mut LbError,
) -> c_int {
    let Some(handle) = state_ref(state) else {
        set_error(error, "Invalid arguments (null pointer)");
        return -1;
    };
    let source = match source_str(source, length) {
        Ok(s) => s,
        Err(msg) => {
            set_error(error, msg);
            return -1;
        }
    };

    match handle.state.check(source) {
        Ok(()) => 0,
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

/// Set the step limit (0 = unlimited) and reset the step counter
///
/// # Safety
/// State pointer must be NULL or valid
#[no_mangle]
pub unsafe extern "C" fn lb_state_set_limit(state: *mut LbState, limit: u64) {
    if let Some(handle) = state_ref(state) {
        handle.state.set_limit(limit);
    }
}

/// Get the step counter (0 if NULL)
///
/// # Safety
/// State pointer must be NULL or valid
#[no_mangle]
pub unsafe extern "C" fn lb_state_get_step(state: *mut LbState) -> u64 {
    state_ref(state).map_or(0, |h| h.state.step())
}

/// Cancel the state; a running chunk stops at its next hooked step
///
/// May be called from any thread while another thread runs the state.
///
/// # Safety
/// State pointer must be NULL or valid, and not destroyed concurrently
#[no_mangle]
pub unsafe extern "C" fn lb_state_abort(state: *mut LbState) {
    if let Some(handle) = state_ref(state) {
        handle.abort.abort();
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Install (or with NULL, remove) the step callback
///
/// # Safety
/// - State pointer must be valid
/// - `user_data` must stay valid while the callback is installed
#[no_mangle]
pub unsafe extern "C" fn lb_state_set_step_callback(
    state: *mut LbState,
    callback: Option<LbStepCallback>,
    user_data: *mut c_void,
) {
    let Some(handle) = state_ref(state) else {
        return;
    };
    let data = UserData(user_data);
    let observer = callback.map(|cb| {
        Arc::new(move |id: luabridge_engine::InstanceId, step: u64| cb(id.as_u64(), step, data.get()))
            as StepObserver
    });
    handle.state.context().set_step_observer(observer);
}

/// Install (or with NULL, remove) the panic callback
///
/// # Safety
/// - State pointer must be valid
/// - `user_data` must stay valid while the callback is installed
#[no_mangle]
pub unsafe extern "C" fn lb_state_set_panic_callback(
    state: *mut LbState,
    callback: Option<LbPanicCallback>,
    user_data: *mut c_void,
) {
    let Some(handle) = state_ref(state) else {
        return;
    };
    let data = UserData(user_data);
    let observer = callback.map(|cb| {
        Arc::new(move |id: luabridge_engine::InstanceId, message: &str| {
            let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
            cb(id.as_u64(), message.as_ptr(), data.get());
        }) as PanicObserver
    });
    handle.state.context().set_panic_observer(observer);
}

/// Bind a host function to global `name`
///
/// # Returns
/// * The callable id (>= 1) passed back to `callback`
/// * -1 on failure (check error parameter)
///
/// # Safety
/// - State pointer must be valid
/// - Name must be a valid null-terminated string
/// - `user_data` must stay valid for the state's lifetime
#[no_mangle]
pub unsafe extern "C" fn lb_state_set_func(
    state: *mut LbState,
    name: *const c_char,
    callback: LbFuncCallback,
    user_data: *mut c_void,
    error: *mut *mut LbError,
) -> i64 {
    let Some(handle) = state_ref(state) else {
        set_error(error, "Invalid arguments (null pointer)");
        return -1;
    };
    if name.is_null() {
        set_error(error, "Invalid arguments (null pointer)");
        return -1;
    }
    let name = match CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => {
            set_error(error, "Invalid UTF-8 in function name");
            return -1;
        }
    };

    let data = UserData(user_data);
    let result = handle.state.set_func(name, move |frame: &mut dyn HostFrame| {
        let instance = frame.instance().as_u64();
        let callable = frame.callable();
        let mut call = FrameHandle { frame, error: None };
        let ret = callback(
            instance,
            callable.as_u32(),
            &mut call as *mut FrameHandle as *mut LbFrame,
            data.get(),
        );
        if ret < 0 {
            let message = call
                .error
                .take()
                .unwrap_or_else(|| format!("host function {} failed", callable));
            return Err(BridgeError::Message(message));
        }
        Ok(ret as usize)
    });

    match result {
        Ok(id) => i64::from(id.as_u32()),
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

// ============================================================================
// Frame Functions
// ============================================================================

/// Number of arguments of the current call (0 if NULL)
///
/// # Safety
/// Frame pointer must be NULL or the frame passed to the running callback
#[no_mangle]
pub unsafe extern "C" fn lb_frame_arg_count(frame: *mut LbFrame) -> usize {
    frame_mut(frame).map_or(0, |f| f.frame.arg_count())
}

/// Read argument `index` (0-based) as an integer
///
/// # Returns
/// * 0 on success (value written to `out`)
/// * -1 if the argument is not an integer (the frame error is set)
///
/// # Safety
/// Frame must be the running callback's frame; `out` must be valid
#[no_mangle]
pub unsafe extern "C" fn lb_frame_arg_int(frame: *mut LbFrame, index: usize, out: *mut i64) -> c_int {
    let Some(f) = frame_mut(frame) else {
        return -1;
    };
    match f.frame.int_arg(index) {
        Ok(v) if !out.is_null() => {
            *out = v;
            0
        }
        Ok(_) => -1,
        Err(e) => {
            f.error = Some(e.to_string());
            -1
        }
    }
}

/// Read argument `index` (0-based) as a float
///
/// # Safety
/// Frame must be the running callback's frame; `out` must be valid
#[no_mangle]
pub unsafe extern "C" fn lb_frame_arg_float(
    frame: *mut LbFrame,
    index: usize,
    out: *mut f64,
) -> c_int {
    let Some(f) = frame_mut(frame) else {
        return -1;
    };
    match f.frame.float_arg(index) {
        Ok(v) if !out.is_null() => {
            *out = v;
            0
        }
        Ok(_) => -1,
        Err(e) => {
            f.error = Some(e.to_string());
            -1
        }
    }
}

/// Read argument `index` (0-based) as a string
///
/// # Returns
/// * Newly allocated string, free with `lb_string_free()`
/// * NULL if the argument is not a string (the frame error is set)
///
/// # Safety
/// Frame must be the running callback's frame
#[no_mangle]
pub unsafe extern "C" fn lb_frame_arg_str(frame: *mut LbFrame, index: usize) -> *mut c_char {
    let Some(f) = frame_mut(frame) else {
        return ptr::null_mut();
    };
    match f.frame.str_arg(index) {
        Ok(s) => rust_to_c_string(&s),
        Err(e) => {
            f.error = Some(e.to_string());
            ptr::null_mut()
        }
    }
}

unsafe fn push(frame: *mut LbFrame, value: HostValue) -> c_int {
    match frame_mut(frame) {
        Some(f) => {
            f.frame.push(value);
            0
        }
        None => -1,
    }
}

/// Push `nil`
///
/// # Safety
/// Frame must be NULL or the running callback's frame
#[no_mangle]
pub unsafe extern "C" fn lb_frame_push_nil(frame: *mut LbFrame) -> c_int {
    push(frame, HostValue::Nil)
}

/// Push a boolean (0 = false, non-zero = true)
///
/// # Safety
/// Frame must be NULL or the running callback's frame
#[no_mangle]
pub unsafe extern "C" fn lb_frame_push_bool(frame: *mut LbFrame, value: c_int) -> c_int {
    push(frame, HostValue::Bool(value != 0))
}

/// Push an integer
///
/// # Safety
/// Frame must be NULL or the running callback's frame
#[no_mangle]
pub unsafe extern "C" fn lb_frame_push_int(frame: *mut LbFrame, value: i64) -> c_int {
    push(frame, HostValue::Int(value))
}

/// Push a float
///
/// # Safety
/// Frame must be NULL or the running callback's frame
#[no_mangle]
pub unsafe extern "C" fn lb_frame_push_float(frame: *mut LbFrame, value: f64) -> c_int {
    push(frame, HostValue::Float(value))
}

/// Push a copy of a null-terminated string
///
/// # Safety
/// Frame must be NULL or the running callback's frame; `value` must be a
/// valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn lb_frame_push_str(frame: *mut LbFrame, value: *const c_char) -> c_int {
    if value.is_null() {
        return -1;
    }
    let value = CStr::from_ptr(value).to_string_lossy().into_owned();
    push(frame, HostValue::Str(value))
}

/// Set the error message raised when the callback returns a negative value
///
/// # Safety
/// Frame must be NULL or the running callback's frame; `message` must be a
/// valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn lb_frame_set_error(frame: *mut LbFrame, message: *const c_char) {
    let Some(f) = frame_mut(frame) else {
        return;
    };
    if !message.is_null() {
        f.error = Some(CStr::from_ptr(message).to_string_lossy().into_owned());
    }
}

// ============================================================================
// Memory and Error Handling Functions
// ============================================================================

/// Free a string returned by this library
///
/// # Safety
/// String must be NULL or returned by `lb_frame_arg_str()`
#[no_mangle]
pub unsafe extern "C" fn lb_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Get the error message
///
/// # Returns
/// * Null-terminated error message string
/// * NULL if error is NULL
///
/// # Safety
/// - Error pointer must be valid
/// - Returned string is valid until `lb_error_free()` is called
/// - Do not free the returned string directly
#[no_mangle]
pub unsafe extern "C" fn lb_error_message(error: *const LbError) -> *const c_char {
    if error.is_null() {
        return ptr::null();
    }

    (*error).message
}

/// Free an error
///
/// # Safety
/// - Error pointer must be NULL or created by this library
/// - Error must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn lb_error_free(error: *mut LbError) {
    if error.is_null() {
        return;
    }

    if !(*error).message.is_null() {
        drop(CString::from_raw((*error).message));
    }

    drop(Box::from_raw(error));
}

/// Get the library version string
///
/// # Safety
/// The returned string is static and must not be freed
#[no_mangle]
pub unsafe extern "C" fn lb_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
