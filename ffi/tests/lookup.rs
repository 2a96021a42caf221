//! Drive the C surface the way a C caller would: raw pointers in, result
//! envelopes out, every allocation released through the matching free.

use std::ffi::{CStr, CString};
use std::net::SocketAddr;
use std::ptr;

use sso_ffi::types::{FfiErrorCode, FfiFetchResult, FfiSsoClient};
use sso_ffi::{sso_client_free, sso_client_new, sso_fetch_by_ticket, sso_free_result};

const CLIENT_IP: &str = "10.0.0.7";
const USER_AGENT: &str = "php-fpm/8.2";

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn issue_ticket(addr: SocketAddr) -> String {
    let body = serde_json::json!({
        "client_ip": CLIENT_IP,
        "user_agent": USER_AGENT,
        "user": {"sso_name": "Pan", "sso_contact_type": 0}
    });
    let mut resp = ureq::post(&format!("http://{addr}{}", mock_server::ISSUE_PATH))
        .content_type("application/json")
        .send(body.to_string().as_bytes())
        .unwrap();
    let issued: mock_server::Issued =
        serde_json::from_str(&resp.body_mut().read_to_string().unwrap()).unwrap();
    issued.ticket
}

fn body_of(result: &FfiFetchResult) -> &[u8] {
    if result.body.is_null() {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(result.body, result.body_len) }
}

fn fetch(client: *const FfiSsoClient, ticket: &str) -> *mut FfiFetchResult {
    let ticket = CString::new(ticket).unwrap();
    let ip = CString::new(CLIENT_IP).unwrap();
    let ua = CString::new(USER_AGENT).unwrap();
    sso_fetch_by_ticket(client, ticket.as_ptr(), false, ip.as_ptr(), ua.as_ptr())
}

#[test]
fn lookup_through_c_abi() {
    let addr = start_server();
    let ticket = issue_ticket(addr);

    let host = CString::new("127.0.0.1").unwrap();
    let client = sso_client_new(host.as_ptr(), addr.port(), ptr::null(), ptr::null(), 2000);
    assert!(!client.is_null());

    for _ in 0..2 {
        let result = fetch(client, &ticket);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert!(r.error_message.is_null());
        assert_eq!(r.http_status, 200);
        assert_eq!(unsafe { CStr::from_ptr(r.sso_err) }.to_str().unwrap(), "0");

        let json: serde_json::Value = serde_json::from_slice(body_of(r)).unwrap();
        assert_eq!(json["detail"]["sso_name"], "Pan");
        assert!(r.elapsed_ms >= 0.0);
        sso_free_result(result);
    }

    sso_client_free(client);
}

#[test]
fn unknown_ticket_reports_service_error_code() {
    let addr = start_server();
    let host = CString::new("127.0.0.1").unwrap();
    let client = sso_client_new(host.as_ptr(), addr.port(), ptr::null(), ptr::null(), 0);

    let result = fetch(client, "missing");
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::Ok);
    assert_eq!(unsafe { CStr::from_ptr(r.sso_err) }.to_str().unwrap(), "err:22");
    sso_free_result(result);
    sso_client_free(client);
}

#[test]
fn refused_connection_is_connect_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let host = CString::new("127.0.0.1").unwrap();
    let client = sso_client_new(host.as_ptr(), port, ptr::null(), ptr::null(), 0);

    let result = fetch(client, "t");
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::Connect);
    assert!(!r.error_message.is_null());
    assert!(r.body.is_null());
    sso_free_result(result);
    sso_client_free(client);
}

#[test]
fn null_arguments_are_reported_not_dereferenced() {
    let result = sso_fetch_by_ticket(ptr::null(), ptr::null(), false, ptr::null(), ptr::null());
    assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
    sso_free_result(result);

    let host = CString::new("127.0.0.1").unwrap();
    let client = sso_client_new(host.as_ptr(), 9, ptr::null(), ptr::null(), 0);
    let ip = CString::new(CLIENT_IP).unwrap();
    let result = sso_fetch_by_ticket(client, ptr::null(), false, ip.as_ptr(), ip.as_ptr());
    let r = unsafe { &*result };
    assert_eq!(r.error_code, FfiErrorCode::NullArg);
    let msg = unsafe { CStr::from_ptr(r.error_message) }.to_str().unwrap();
    assert!(msg.contains("ticket"), "{msg}");
    sso_free_result(result);
    sso_client_free(client);

    assert!(sso_client_new(ptr::null(), 80, ptr::null(), ptr::null(), 0).is_null());
}

#[test]
fn invalid_utf8_argument_is_rejected() {
    let host = CString::new("127.0.0.1").unwrap();
    let client = sso_client_new(host.as_ptr(), 9, ptr::null(), ptr::null(), 0);
    let bad = CString::new(vec![0xffu8, 0xfe]).unwrap();
    let ok = CString::new("x").unwrap();
    let result = sso_fetch_by_ticket(client, ok.as_ptr(), false, ok.as_ptr(), bad.as_ptr());
    assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::InvalidArg);
    sso_free_result(result);
    sso_client_free(client);
}

#[test]
fn non_utf8_host_header_or_path_yields_no_client() {
    let host = CString::new("127.0.0.1").unwrap();
    let bad = CString::new(vec![0xc3u8, 0x28]).unwrap();
    assert!(sso_client_new(host.as_ptr(), 80, bad.as_ptr(), ptr::null(), 0).is_null());
    assert!(sso_client_new(host.as_ptr(), 80, ptr::null(), bad.as_ptr(), 0).is_null());

    let header = CString::new("sso.test").unwrap();
    let path = CString::new("/bms-sso/fetch-by-ticket").unwrap();
    let client = sso_client_new(host.as_ptr(), 80, header.as_ptr(), path.as_ptr(), 0);
    assert!(!client.is_null());
    sso_client_free(client);
}

#[test]
fn free_functions_accept_null() {
    sso_free_result(ptr::null_mut());
    sso_client_free(ptr::null_mut());
}
