// Gateway wire vocabulary. The remote reports states in its own terms; the
// lifecycle manager owns the translation into local `SessionStatus`.

use serde::Deserialize;

/// Remote session states as reported by the gateway. Parsing is
/// case-insensitive and total: anything unrecognized becomes `Unknown`, which
/// the lifecycle mapping treats as "no local change".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Starting,
    ScanQrCode,
    Working,
    Failed,
    Stopped,
    Unknown,
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "STARTING" => RemoteStatus::Starting,
            "SCAN_QR_CODE" | "QRCODE" => RemoteStatus::ScanQrCode,
            "WORKING" => RemoteStatus::Working,
            "FAILED" => RemoteStatus::Failed,
            "STOPPED" => RemoteStatus::Stopped,
            _ => RemoteStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Starting => "STARTING",
            RemoteStatus::ScanQrCode => "SCAN_QR_CODE",
            RemoteStatus::Working => "WORKING",
            RemoteStatus::Failed => "FAILED",
            RemoteStatus::Stopped => "STOPPED",
            RemoteStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paired identity attached to a WORKING session.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMe {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
}

impl RemoteMe {
    /// Profile name preference: `name` when present and non-empty, else
    /// `pushname`.
    pub fn display_name(&self) -> Option<String> {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.pushname.clone().filter(|n| !n.is_empty()))
    }
}

/// One status read from the remote.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    pub status: RemoteStatus,
    pub me: Option<RemoteMe>,
}

impl RemoteSession {
    /// Build from the raw session object the gateway returns. A missing
    /// status field parses as `Unknown` rather than erroring.
    pub fn from_value(v: &serde_json::Value) -> Self {
        let status = RemoteStatus::parse(v["status"].as_str().unwrap_or("UNKNOWN"));
        let me = v
            .get("me")
            .filter(|m| !m.is_null())
            .and_then(|m| serde_json::from_value(m.clone()).ok());
        RemoteSession { status, me }
    }
}

/// Acknowledgement of a send call.
#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    #[serde(default = "default_sent")]
    pub sent: bool,
    #[serde(default)]
    pub id: Option<String>,
}

fn default_sent() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_status_parse_case_insensitive() {
        assert_eq!(RemoteStatus::parse("working"), RemoteStatus::Working);
        assert_eq!(RemoteStatus::parse("Working"), RemoteStatus::Working);
        assert_eq!(RemoteStatus::parse("SCAN_QR_CODE"), RemoteStatus::ScanQrCode);
        assert_eq!(RemoteStatus::parse("qrcode"), RemoteStatus::ScanQrCode);
        assert_eq!(RemoteStatus::parse("  stopped "), RemoteStatus::Stopped);
        assert_eq!(RemoteStatus::parse("banana"), RemoteStatus::Unknown);
        assert_eq!(RemoteStatus::parse(""), RemoteStatus::Unknown);
    }

    #[test]
    fn test_remote_session_from_value() {
        let v = json!({
            "name": "default",
            "status": "WORKING",
            "me": { "id": "5511999999999@c.us", "pushname": "Shop" }
        });
        let session = RemoteSession::from_value(&v);
        assert_eq!(session.status, RemoteStatus::Working);
        let me = session.me.unwrap();
        assert_eq!(me.id, "5511999999999@c.us");
        assert_eq!(me.display_name().as_deref(), Some("Shop"));
    }

    #[test]
    fn test_remote_session_missing_status_is_unknown() {
        let session = RemoteSession::from_value(&json!({ "name": "default" }));
        assert_eq!(session.status, RemoteStatus::Unknown);
        assert!(session.me.is_none());
    }

    #[test]
    fn test_display_name_prefers_name_over_pushname() {
        let me = RemoteMe {
            id: "x".into(),
            name: Some("Registered".into()),
            pushname: Some("Push".into()),
        };
        assert_eq!(me.display_name().as_deref(), Some("Registered"));

        let me = RemoteMe { id: "x".into(), name: Some(String::new()), pushname: Some("Push".into()) };
        assert_eq!(me.display_name().as_deref(), Some("Push"));
    }
}
