//! Request form and response envelope for the ticket lookup.
//!
//! # Design
//! `OutboundRequest` serializes straight to the URL-encoded body the SSO
//! service expects. The response types mirror the service's JSON but are
//! defined independently of the mock-server crate; the integration tests
//! catch any drift between the two.

use serde::{Deserialize, Serialize, Serializer};

/// One ticket lookup. Built per call and consumed by the exchange.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundRequest {
    #[serde(rename = "sso_ticket")]
    pub ticket: String,
    pub client_ip: String,
    pub user_agent: String,
    /// Ask the service to push the ticket's expiry forward.
    #[serde(serialize_with = "renew_flag")]
    pub renew: bool,
}

impl OutboundRequest {
    pub fn new(ticket: &str, renew: bool, client_ip: &str, user_agent: &str) -> Self {
        Self {
            ticket: ticket.to_string(),
            client_ip: client_ip.to_string(),
            user_agent: user_agent.to_string(),
            renew,
        }
    }
}

fn renew_flag<S: Serializer>(renew: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *renew { "1" } else { "0" })
}

/// Status code the service uses for a successful lookup.
pub const ERR_OK: &str = "0";

/// Top-level JSON envelope returned by the SSO service.
///
/// On success `err` is `"0"` and `detail` holds the user record; on failure
/// `err` is a code such as `"err:22"` and `detail` a message string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketResponse {
    pub err: String,
    #[serde(default)]
    pub detail: Option<TicketDetail>,
}

impl TicketResponse {
    pub fn is_success(&self) -> bool {
        self.err == ERR_OK
    }

    /// The user record, if the lookup succeeded.
    pub fn user(&self) -> Option<&SsoUserInfo> {
        match (&self.detail, self.is_success()) {
            (Some(TicketDetail::User(user)), true) => Some(user),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TicketDetail {
    User(Box<SsoUserInfo>),
    Message(String),
}

/// 0 for an employee, 1 for an external contact.
pub const CONTACT_INTERNAL: u8 = 0;
pub const CONTACT_EXTERNAL: u8 = 1;

/// Identity attributes attached to a ticket.
///
/// Fields the service omits deserialize to their defaults; the company,
/// email, follower, address and remark fields are only filled for external
/// contacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SsoUserInfo {
    pub sso_name: String,
    pub sso_contact_type: u8,
    pub sso_mobile: String,
    pub sso_user_dept_info: Vec<SsoUserDept>,
    pub sso_avatar: String,
    pub sso_job_title: String,
    pub sso_state_code: String,
    pub sso_company_name: String,
    pub sso_email: String,
    pub sso_follower_user_id: String,
    pub sso_follower_user: Option<Box<SsoUserInfo>>,
    pub sso_address: String,
    pub sso_remark: String,
    pub sso_dingding_union_id: String,
    pub sso_dingding_user_id: String,
    pub sso_dingding_open_id: String,
    pub sso_dingding_nick_name: String,
    pub sso_ticket: String,
}

impl SsoUserInfo {
    pub fn is_internal(&self) -> bool {
        self.sso_contact_type == CONTACT_INTERNAL
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SsoUserDept {
    pub sso_dept_id: String,
    pub sso_dept_name: String,
    pub sso_is_dept_owner: String,
}
