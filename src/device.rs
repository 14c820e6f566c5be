//! Device identification and participant IDs.
//!
//! The user agent of the device page is inspected once to derive two
//! optional metadata tags attached to every dataset: the mobile device
//! class and the browser.

use std::collections::BTreeMap;

/// Metadata tag key for the mobile device class.
pub const MOBILE_TAG: &str = "mobile";

/// Metadata tag key for the browser.
pub const BROWSER_TAG: &str = "browser";

/// Ordered device rules: first match wins.
const MOBILE_RULES: &[(&str, &[&str])] = &[
    ("iPhone", &["iPhone"]),
    ("iPad", &["iPad"]),
    ("iPod", &["iPod"]),
    ("Samsung", &["SAMSUNG", "SM-", "GT-"]),
    ("Pixel", &["Pixel"]),
    ("OnePlus", &["OnePlus"]),
    ("Xiaomi", &["Xiaomi", "Redmi", "MI "]),
    ("Huawei", &["HUAWEI", "Huawei"]),
    ("Motorola", &["moto ", "Motorola"]),
    ("Kindle", &["Kindle", "Silk/"]),
];

/// Ordered browser rules: more specific tokens come first since most
/// browsers also advertise `Chrome` or `Safari`.
const BROWSER_RULES: &[(&str, &[&str])] = &[
    ("Edge", &["Edg/", "EdgA/", "EdgiOS/", "Edge/"]),
    ("Opera", &["OPR/", "Opera"]),
    ("SamsungBrowser", &["SamsungBrowser/"]),
    ("Firefox", &["Firefox/", "FxiOS/"]),
    ("Chrome", &["Chrome/", "CriOS/"]),
    ("Safari", &["Safari/"]),
];

/// Device tags derived from a user agent string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTags {
    pub mobile: Option<String>,
    pub browser: Option<String>,
}

impl DeviceTags {
    pub fn from_user_agent(user_agent: &str) -> Self {
        Self {
            mobile: detect_mobile(user_agent),
            browser: first_match(BROWSER_RULES, user_agent),
        }
    }

    /// Tags that were detected, keyed for dataset metadata.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if let Some(mobile) = &self.mobile {
            tags.insert(MOBILE_TAG.to_string(), mobile.clone());
        }
        if let Some(browser) = &self.browser {
            tags.insert(BROWSER_TAG.to_string(), browser.clone());
        }
        tags
    }
}

fn first_match(rules: &[(&str, &[&str])], user_agent: &str) -> Option<String> {
    rules
        .iter()
        .find(|(_, tokens)| tokens.iter().any(|t| user_agent.contains(t)))
        .map(|(name, _)| name.to_string())
}

fn detect_mobile(user_agent: &str) -> Option<String> {
    if let Some(name) = first_match(MOBILE_RULES, user_agent) {
        return Some(name);
    }
    if user_agent.contains("Android") {
        // Android tablets omit the "Mobile" token
        let class = if user_agent.contains("Mobile") {
            "UnknownPhone"
        } else {
            "UnknownTablet"
        };
        return Some(class.to_string());
    }
    if user_agent.contains("Mobile") || user_agent.contains("Windows Phone") {
        return Some("UnknownMobile".to_string());
    }
    None
}

/// Random participant ID: five hex digits in `10000..=1ffff`.
pub fn generate_subject_id() -> String {
    // Bytes 0 and 1 of a v4 UUID are fully random. The version and
    // variant bits live in bytes 6 and 8.
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let random = u16::from_le_bytes([bytes[0], bytes[1]]);
    format!("{:x}", 0x10000_u32 + u32::from(random))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const PIXEL_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";
    const ANDROID_TABLET_FIREFOX: &str = "Mozilla/5.0 (Android 13; Tablet; rv:125.0) Gecko/125.0 Firefox/125.0";
    const DESKTOP_EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0";

    #[test]
    fn test_iphone_safari() {
        let tags = DeviceTags::from_user_agent(IPHONE_SAFARI);
        assert_eq!(tags.mobile.as_deref(), Some("iPhone"));
        assert_eq!(tags.browser.as_deref(), Some("Safari"));
    }

    #[test]
    fn test_pixel_chrome() {
        let tags = DeviceTags::from_user_agent(PIXEL_CHROME);
        assert_eq!(tags.mobile.as_deref(), Some("Pixel"));
        assert_eq!(tags.browser.as_deref(), Some("Chrome"));
    }

    #[test]
    fn test_android_tablet() {
        let tags = DeviceTags::from_user_agent(ANDROID_TABLET_FIREFOX);
        assert_eq!(tags.mobile.as_deref(), Some("UnknownTablet"));
        assert_eq!(tags.browser.as_deref(), Some("Firefox"));
    }

    #[test]
    fn test_desktop_has_no_mobile_tag() {
        let tags = DeviceTags::from_user_agent(DESKTOP_EDGE);
        assert_eq!(tags.mobile, None);
        assert_eq!(tags.browser.as_deref(), Some("Edge"));

        let metadata = tags.to_metadata();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[BROWSER_TAG], "Edge");
    }

    #[test]
    fn test_unknown_agent() {
        assert_eq!(DeviceTags::from_user_agent("curl/8.5.0"), DeviceTags::default());
        assert!(DeviceTags::default().to_metadata().is_empty());
    }

    #[test]
    fn test_subject_id_range() {
        for _ in 0..100 {
            let id = generate_subject_id();
            assert_eq!(id.len(), 5);
            let value = u32::from_str_radix(&id, 16).unwrap();
            assert!((0x10000..=0x1ffff).contains(&value));
        }
    }
}
