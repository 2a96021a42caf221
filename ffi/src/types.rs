//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! The body crosses as a byte pointer plus length rather than a C string:
//! SSO responses may legally contain NUL bytes. Everything else textual is a
//! NUL-terminated string allocated here and released by `sso_free_result`.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Mutex;

use sso_core::{FetchError, Fetched, SsoClient};

/// Opaque handle to an `SsoClient`. The mutex serializes lookups from
/// callers that share one handle across threads.
pub struct FfiSsoClient {
    pub(crate) inner: Mutex<SsoClient>,
}

/// Error codes returned in `FfiFetchResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    Connect = 1,
    Transport = 2,
    Read = 3,
    Protocol = 4,
    Timeout = 5,
    Deserialization = 6,
    Panic = 7,
    NullArg = 8,
    InvalidArg = 9,
}

impl From<&FetchError> for FfiErrorCode {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Connect { .. } => FfiErrorCode::Connect,
            FetchError::Transport(_) => FfiErrorCode::Transport,
            FetchError::Read(_) => FfiErrorCode::Read,
            FetchError::Protocol(_) => FfiErrorCode::Protocol,
            FetchError::Timeout => FfiErrorCode::Timeout,
            FetchError::Deserialization(_) => FfiErrorCode::Deserialization,
        }
    }
}

/// Outcome of `sso_fetch_by_ticket`.
///
/// On success `error_code` is `Ok`, `error_message` is null and `body` /
/// `body_len` hold the response body (`body` is null when the body is
/// empty). `sso_err` is the envelope's `err` field when the body parses as
/// one, otherwise null. On failure only `error_code` and `error_message`
/// are meaningful.
#[repr(C)]
pub struct FfiFetchResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub body: *mut u8,
    pub body_len: usize,
    pub sso_err: *mut c_char,
    pub elapsed_ms: f64,
    pub reconnected: bool,
}

impl FfiFetchResult {
    pub(crate) fn ok(fetched: Fetched) -> *mut Self {
        let sso_err = fetched
            .ticket_response()
            .map(|resp| c_string(&resp.err))
            .unwrap_or(std::ptr::null_mut());
        let elapsed_ms = fetched.elapsed.as_secs_f64() * 1000.0;
        let (body, body_len) = if fetched.body.is_empty() {
            (std::ptr::null_mut(), 0)
        } else {
            let boxed = fetched.body.into_boxed_slice();
            let len = boxed.len();
            (Box::into_raw(boxed) as *mut u8, len)
        };

        Box::into_raw(Box::new(FfiFetchResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            http_status: fetched.status,
            body,
            body_len,
            sso_err,
            elapsed_ms,
            reconnected: fetched.reconnected,
        }))
    }

    pub(crate) fn from_error(err: FetchError) -> *mut Self {
        Self::failure(FfiErrorCode::from(&err), &err.to_string())
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::failure(FfiErrorCode::NullArg, &format!("{name} is null"))
    }

    pub(crate) fn invalid_arg(name: &str) -> *mut Self {
        Self::failure(FfiErrorCode::InvalidArg, &format!("{name} is not valid UTF-8"))
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::failure(FfiErrorCode::Panic, msg)
    }

    fn failure(error_code: FfiErrorCode, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiFetchResult {
            error_code,
            error_message: c_string(msg),
            http_status: 0,
            body: std::ptr::null_mut(),
            body_len: 0,
            sso_err: std::ptr::null_mut(),
            elapsed_ms: 0.0,
            reconnected: false,
        }))
    }
}

/// Allocate a C string, dropping any interior NUL bytes.
pub(crate) fn c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}
