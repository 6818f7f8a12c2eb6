//! Caller credentials forwarded to the tool server.

use serde::{Deserialize, Serialize};

/// A caller-supplied proof of identity, passed through to the tool
/// server verbatim — muninn never mints or validates these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// Session identifier, synthesized into a `Cookie: TTID=<id>` header.
    Session(String),
    /// Raw cookie string, forwarded as-is in the `Cookie` header.
    Cookie(String),
}

impl Credential {
    /// Choose one credential from whatever the caller supplied.
    ///
    /// Priority: bearer token, then session identifier, then raw cookie.
    pub fn select(
        bearer: Option<String>,
        session: Option<String>,
        cookie: Option<String>,
    ) -> Option<Self> {
        bearer
            .map(Credential::Bearer)
            .or(session.map(Credential::Session))
            .or(cookie.map(Credential::Cookie))
    }

    /// Header name/value pair for outbound tool-server requests.
    pub fn header(&self) -> (&'static str, String) {
        match self {
            Credential::Bearer(token) => ("Authorization", format!("Bearer {token}")),
            Credential::Session(id) => ("Cookie", format!("TTID={id}")),
            Credential::Cookie(raw) => ("Cookie", raw.clone()),
        }
    }
}
