/// Device fingerprint model
///
/// A weak, non-authoritative descriptor of a client device. Used for
/// convenience status lookups and audit snapshots only, never as an
/// authentication decision on its own.
use serde::{Deserialize, Serialize};

/// Fingerprint reported by the scanning client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFingerprint {
    pub user_agent: String,
    pub platform: String,
    pub browser: String,
    pub language: String,
    pub screen: String,
    pub timezone: String,
    /// Source IP as seen by the client; stripped before canonicalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl DeviceFingerprint {
    /// Canonical JSON form used as a lookup key.
    ///
    /// Keys are emitted in a fixed order and the client-reported IP is
    /// dropped, so the same device produces the same key across requests.
    pub fn canonical_json(&self) -> String {
        // serde_json::Map is a BTreeMap by default (`preserve_order` is the
        // opt-in), so keys serialize sorted regardless of insertion order.
        let mut map = serde_json::Map::new();
        map.insert("browser".to_string(), self.browser.clone().into());
        map.insert("language".to_string(), self.language.clone().into());
        map.insert("platform".to_string(), self.platform.clone().into());
        map.insert("screen".to_string(), self.screen.clone().into());
        map.insert("timezone".to_string(), self.timezone.clone().into());
        map.insert("userAgent".to_string(), self.user_agent.clone().into());
        serde_json::Value::Object(map).to_string()
    }

    /// Parse a raw fingerprint query value (JSON string) into its canonical form
    pub fn canonicalize_raw(raw: &str) -> Result<String, serde_json::Error> {
        let fingerprint: DeviceFingerprint = serde_json::from_str(raw)?;
        Ok(fingerprint.canonical_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceFingerprint {
        DeviceFingerprint {
            user_agent: "Mozilla/5.0".to_string(),
            platform: "iPhone".to_string(),
            browser: "Safari".to_string(),
            language: "zh-TW".to_string(),
            screen: "390x844".to_string(),
            timezone: "Asia/Taipei".to_string(),
            ip: Some("203.0.113.9".to_string()),
        }
    }

    #[test]
    fn test_canonical_json_drops_ip() {
        let json = sample().canonical_json();
        assert!(!json.contains("203.0.113.9"));
        assert!(!json.contains("\"ip\""));
    }

    #[test]
    fn test_canonical_json_is_stable_across_ip_changes() {
        let a = sample();
        let mut b = sample();
        b.ip = None;
        assert_eq!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn test_canonicalize_raw_round_trip() {
        let raw = serde_json::to_string(&sample()).unwrap();
        let canonical = DeviceFingerprint::canonicalize_raw(&raw).unwrap();
        assert_eq!(canonical, sample().canonical_json());
    }

    #[test]
    fn test_canonicalize_raw_rejects_garbage() {
        assert!(DeviceFingerprint::canonicalize_raw("not json").is_err());
    }
}
