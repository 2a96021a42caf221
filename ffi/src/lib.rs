//! C-ABI wrapper around `sso-core`.
//!
//! # Overview
//! Lets the web front end (or anything with a C FFI) exchange an SSO ticket
//! for the service's response body through one persistent connection held
//! inside an opaque client handle.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - `sso_fetch_by_ticket` returns a single `FfiFetchResult` envelope for
//!   both success and failure.
//! - The C caller owns all returned pointers and must release them with the
//!   matching `sso_*_free` function.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::catch_unwind;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sso_core::{ClientConfig, Endpoint, SsoClient};

use types::*;

/// Borrow a C string as `&str`. `Err(true)` for null, `Err(false)` for
/// invalid UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn arg_str<'a>(ptr: *const c_char) -> Result<&'a str, bool> {
    if ptr.is_null() {
        return Err(true);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|_| false)
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client for the SSO service at `host:port`.
///
/// `host_header` and `path` may be null to use `host` and the default fetch
/// path. `deadline_ms` bounds each whole lookup; 0 means no deadline.
/// Returns null if `host` is null, if any string argument is not UTF-8, or
/// if a panic occurs.
/// The caller must free the returned pointer with `sso_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn sso_client_new(
    host: *const c_char,
    port: u16,
    host_header: *const c_char,
    path: *const c_char,
    deadline_ms: u64,
) -> *mut FfiSsoClient {
    catch_unwind(|| {
        let Ok(host) = (unsafe { arg_str(host) }) else {
            return std::ptr::null_mut();
        };
        let mut endpoint = Endpoint::new(host, port);
        match unsafe { arg_str(host_header) } {
            Ok(host_header) => endpoint = endpoint.with_host_header(host_header),
            Err(true) => {}
            Err(false) => return std::ptr::null_mut(),
        }
        match unsafe { arg_str(path) } {
            Ok(path) => endpoint = endpoint.with_request_path(path),
            Err(true) => {}
            Err(false) => return std::ptr::null_mut(),
        }
        let mut config = ClientConfig::new(endpoint);
        if deadline_ms > 0 {
            config = config.with_deadline(Duration::from_millis(deadline_ms));
        }
        into_handle(config)
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Create a client from the `SSO_*` environment variables.
///
/// Returns null if the environment holds an invalid value.
#[unsafe(no_mangle)]
pub extern "C" fn sso_client_from_env() -> *mut FfiSsoClient {
    catch_unwind(|| match ClientConfig::from_env() {
        Ok(config) => into_handle(config),
        Err(_) => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

fn into_handle(config: ClientConfig) -> *mut FfiSsoClient {
    Box::into_raw(Box::new(FfiSsoClient {
        inner: Mutex::new(SsoClient::new(config)),
    }))
}

/// Free a client created by `sso_client_new`. Closes its connection.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn sso_client_free(client: *mut FfiSsoClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Exchange `ticket` for the SSO service's response body.
///
/// Never returns null. The caller must free the result with
/// `sso_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn sso_fetch_by_ticket(
    client: *const FfiSsoClient,
    ticket: *const c_char,
    renew: bool,
    client_ip: *const c_char,
    user_agent: *const c_char,
) -> *mut FfiFetchResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiFetchResult::null_arg("client");
        }
        let ticket = match unsafe { arg_str(ticket) } {
            Ok(s) => s,
            Err(is_null) => return bad_arg("ticket", is_null),
        };
        let client_ip = match unsafe { arg_str(client_ip) } {
            Ok(s) => s,
            Err(is_null) => return bad_arg("client_ip", is_null),
        };
        let user_agent = match unsafe { arg_str(user_agent) } {
            Ok(s) => s,
            Err(is_null) => return bad_arg("user_agent", is_null),
        };

        let client = unsafe { &*client };
        let mut inner = client.inner.lock().unwrap_or_else(|poisoned| {
            // A panic mid-exchange leaves the socket at an unknown offset.
            let mut inner = PoisonError::into_inner(poisoned);
            inner.disconnect();
            inner
        });
        match inner.fetch_by_ticket(ticket, renew, client_ip, user_agent) {
            Ok(fetched) => FfiFetchResult::ok(fetched),
            Err(e) => FfiFetchResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiFetchResult::panic("panic in sso_fetch_by_ticket"))
}

fn bad_arg(name: &str, is_null: bool) -> *mut FfiFetchResult {
    if is_null {
        FfiFetchResult::null_arg(name)
    } else {
        FfiFetchResult::invalid_arg(name)
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiFetchResult` returned by `sso_fetch_by_ticket`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn sso_free_result(result: *mut FfiFetchResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { std::ffi::CString::from_raw(result.error_message) });
        }
        if !result.sso_err.is_null() {
            drop(unsafe { std::ffi::CString::from_raw(result.sso_err) });
        }
        if !result.body.is_null() {
            let slice = std::ptr::slice_from_raw_parts_mut(result.body, result.body_len);
            drop(unsafe { Box::from_raw(slice) });
        }
    });
}
