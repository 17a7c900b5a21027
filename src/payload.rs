// SPDX-License-Identifier: MPL-2.0

//! Classification of decoded code payloads
//!
//! Classification is a pure function of the decoded text. The checks run in
//! a fixed order and the first match wins, so a payload always lands in
//! exactly one [`PayloadKind`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content carried by a decoded code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadKind {
    /// Web link
    Url,
    /// `WIFI:` network configuration
    WifiConfig,
    /// MECARD or VCARD contact
    ContactCard,
    /// Anything else
    PlainText,
}

impl PayloadKind {
    /// Get display name for the payload kind
    pub fn display_name(&self) -> &'static str {
        match self {
            PayloadKind::Url => "Website Link",
            PayloadKind::WifiConfig => "WiFi Network",
            PayloadKind::ContactCard => "Contact",
            PayloadKind::PlainText => "Text Content",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Decoded text together with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPayload {
    /// Raw decoded text
    pub text: String,
    /// Classified kind
    pub kind: PayloadKind,
}

impl ClassifiedPayload {
    /// Classify `text` and keep it alongside the result
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = classify(&text);
        Self { text, kind }
    }

    /// Parsed WiFi credentials, for `WifiConfig` payloads only
    pub fn wifi(&self) -> Option<WifiCredentials> {
        match self.kind {
            PayloadKind::WifiConfig => Some(WifiCredentials::parse(&self.text)),
            _ => None,
        }
    }
}

/// Classify decoded text
///
/// Evaluated in order: URL scheme, WiFi config, contact card, plain text.
pub fn classify(text: &str) -> PayloadKind {
    if text.starts_with("http") {
        PayloadKind::Url
    } else if text.starts_with("WIFI:") {
        PayloadKind::WifiConfig
    } else if text.starts_with("MECARD:") || text.starts_with("VCARD:") {
        PayloadKind::ContactCard
    } else {
        PayloadKind::PlainText
    }
}

/// WiFi security type parsed from a `WIFI:` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiSecurity {
    /// No security (open network)
    None,
    /// WEP security (legacy, insecure)
    Wep,
    /// WPA/WPA2 Personal
    Wpa,
    /// WPA2/WPA3 Enterprise
    Enterprise,
    /// WPA3
    Wpa3,
}

impl WifiSecurity {
    /// Parse the `T:` field
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "WEP" => Self::Wep,
            "WPA" | "WPA2" => Self::Wpa,
            "WPA2-EAP" | "WPA3-EAP" => Self::Enterprise,
            "WPA3" | "SAE" => Self::Wpa3,
            "NOPASS" | "" => Self::None,
            _ => Self::Wpa,
        }
    }

    /// Get display name for the security type
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "Open",
            Self::Wep => "WEP",
            Self::Wpa => "WPA/WPA2",
            Self::Enterprise => "Enterprise",
            Self::Wpa3 => "WPA3",
        }
    }
}

/// Network credentials carried by a `WIFI:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    /// Network name
    pub ssid: String,
    /// Password, absent for open networks
    pub password: Option<String>,
    /// Security type
    pub security: WifiSecurity,
    /// Hidden network flag
    pub hidden: bool,
}

impl WifiCredentials {
    /// Parse `WIFI:T:<type>;S:<ssid>;P:<password>;H:<hidden>;;`
    ///
    /// Fields may come in any order. Values honour the `\;`, `\:`, `\,` and
    /// `\\` escapes.
    pub fn parse(content: &str) -> Self {
        let mut credentials = WifiCredentials {
            ssid: String::new(),
            password: None,
            security: WifiSecurity::None,
            hidden: false,
        };

        let content = content.strip_prefix("WIFI:").unwrap_or(content);

        for field in split_unescaped(content) {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            let value = unescape(value);
            match key {
                "S" => credentials.ssid = value,
                "P" if !value.is_empty() => credentials.password = Some(value),
                "T" => credentials.security = WifiSecurity::parse(&value),
                "H" => credentials.hidden = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        credentials
    }
}

/// Split on `;` that is not preceded by a backslash escape
fn split_unescaped(content: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ';' => {
                if i > start {
                    fields.push(&content[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < content.len() {
        fields.push(&content[start..]);
    }

    fields
}

fn unescape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_kinds() {
        assert_eq!(classify("https://example.com"), PayloadKind::Url);
        assert_eq!(classify("http://example.com/path"), PayloadKind::Url);
        assert_eq!(
            classify("WIFI:T:WPA;S:Home;P:secret;"),
            PayloadKind::WifiConfig
        );
        assert_eq!(classify("MECARD:N:Doe;"), PayloadKind::ContactCard);
        assert_eq!(classify("VCARD:N:Doe;"), PayloadKind::ContactCard);
        assert_eq!(classify("hello"), PayloadKind::PlainText);
    }

    #[test]
    fn test_classify_is_case_and_prefix_sensitive() {
        // Prefix checks are on the raw text
        assert_eq!(classify(" https://example.com"), PayloadKind::PlainText);
        assert_eq!(classify("wifi:S:x;"), PayloadKind::PlainText);
        assert_eq!(classify("BEGIN:VCARD"), PayloadKind::PlainText);
        assert_eq!(classify(""), PayloadKind::PlainText);
    }

    #[test]
    fn test_classify_first_match_wins() {
        // "http" is checked before anything else
        assert_eq!(classify("httpWIFI:"), PayloadKind::Url);
    }

    #[test]
    fn test_parse_wifi() {
        let wifi = WifiCredentials::parse("WIFI:S:MyNetwork;T:WPA;P:mypassword;;");
        assert_eq!(wifi.ssid, "MyNetwork");
        assert_eq!(wifi.password, Some("mypassword".to_string()));
        assert_eq!(wifi.security, WifiSecurity::Wpa);
        assert!(!wifi.hidden);
    }

    #[test]
    fn test_parse_wifi_hidden_open() {
        let wifi = WifiCredentials::parse("WIFI:T:nopass;S:HiddenNet;H:true;;");
        assert_eq!(wifi.ssid, "HiddenNet");
        assert_eq!(wifi.password, None);
        assert_eq!(wifi.security, WifiSecurity::None);
        assert!(wifi.hidden);
    }

    #[test]
    fn test_parse_wifi_escapes() {
        let wifi = WifiCredentials::parse(r"WIFI:S:Cafe\;Bar;T:SAE;P:pa\:ss\\word;;");
        assert_eq!(wifi.ssid, "Cafe;Bar");
        assert_eq!(wifi.password, Some(r"pa:ss\word".to_string()));
        assert_eq!(wifi.security, WifiSecurity::Wpa3);
    }

    #[test]
    fn test_classified_payload_wifi_details() {
        let payload = ClassifiedPayload::new("WIFI:T:WPA;S:Home;P:secret;");
        assert_eq!(payload.kind, PayloadKind::WifiConfig);
        assert_eq!(payload.wifi().map(|w| w.ssid), Some("Home".to_string()));
        assert!(ClassifiedPayload::new("hello").wifi().is_none());
    }
}
