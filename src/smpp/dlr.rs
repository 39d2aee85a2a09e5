//! Delivery receipt text parsing.
//!
//! Parses the canonical SMSC receipt layout:
//!
//! ```text
//! id:IIIIIIIIII sub:SSS dlvrd:DDD submit date:YYMMDDhhmm done date:YYMMDDhhmm stat:DDDDDDD err:E text:........
//! ```
//!
//! Field order varies between SMSCs, so each field is located independently.

/// Delivery state carried in the `stat:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlrStatus {
    Enroute,
    Delivered,
    Expired,
    Deleted,
    Undeliverable,
    Accepted,
    Rejected,
    Unknown,
}

impl DlrStatus {
    pub fn from_stat(stat: &str) -> Self {
        match stat.trim().to_ascii_uppercase().as_str() {
            "ENROUTE" => Self::Enroute,
            "DELIVRD" => Self::Delivered,
            "EXPIRED" => Self::Expired,
            "DELETED" => Self::Deleted,
            "UNDELIV" => Self::Undeliverable,
            "ACCEPTD" => Self::Accepted,
            "REJECTD" => Self::Rejected,
            _ => Self::Unknown,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Expired | Self::Deleted | Self::Undeliverable | Self::Rejected
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::Deleted | Self::Undeliverable | Self::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enroute => "ENROUTE",
            Self::Delivered => "DELIVRD",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
            Self::Undeliverable => "UNDELIV",
            Self::Accepted => "ACCEPTD",
            Self::Rejected => "REJECTD",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A parsed delivery receipt.
#[derive(Debug, Clone)]
pub struct Dlr {
    /// SMSC-assigned message id
    pub message_id: String,
    /// Submitted part count
    pub sub: Option<String>,
    /// Delivered part count
    pub dlvrd: Option<String>,
    /// Submit timestamp (SMSC-local format)
    pub submit_date: Option<String>,
    /// Done timestamp
    pub done_date: Option<String>,
    /// Delivery state
    pub status: DlrStatus,
    /// Network error code
    pub error_code: Option<String>,
    /// Trailing text fragment
    pub text: Option<String>,
}

/// Field markers, longest first so `submit date:` wins over `date:`-less scans.
const FIELDS: [&str; 8] = [
    "submit date:",
    "done date:",
    "dlvrd:",
    "text:",
    "stat:",
    "err:",
    "sub:",
    "id:",
];

impl Dlr {
    /// Parse a receipt body. Returns `None` unless both `id:` and `stat:`
    /// are present.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();

        let message_id = find_field(text, &lower, "id:")?;
        let stat = find_field(text, &lower, "stat:")?;

        Some(Self {
            message_id,
            sub: find_field(text, &lower, "sub:"),
            dlvrd: find_field(text, &lower, "dlvrd:"),
            submit_date: find_field(text, &lower, "submit date:"),
            done_date: find_field(text, &lower, "done date:"),
            status: DlrStatus::from_stat(&stat),
            error_code: find_field(text, &lower, "err:"),
            text: find_field(text, &lower, "text:"),
        })
    }
}

/// Locate `key` and extract its value, which runs to the next known field
/// marker (or end of input for `text:`).
fn find_field(original: &str, lower: &str, key: &str) -> Option<String> {
    let start = match key {
        // `id:` must not match inside `message_id:`-style tokens or the
        // middle of `dlvrd:`; accept only at start or after whitespace.
        "id:" => {
            let mut found = None;
            let mut offset = 0;
            while let Some(pos) = lower[offset..].find("id:") {
                let abs = offset + pos;
                let at_boundary = abs == 0
                    || lower.as_bytes()[abs - 1] == b' '
                    || lower.as_bytes()[abs - 1] == b'\t';
                if at_boundary {
                    found = Some(abs);
                    break;
                }
                offset = abs + 3;
            }
            found?
        }
        // `sub:` must not match inside `submit date:`.
        "sub:" => {
            let mut found = None;
            let mut offset = 0;
            while let Some(pos) = lower[offset..].find("sub:") {
                let abs = offset + pos;
                if !lower[abs..].starts_with("submit date:") {
                    found = Some(abs);
                    break;
                }
                offset = abs + 4;
            }
            found?
        }
        _ => lower.find(key)?,
    };

    let value_start = start + key.len();

    if key == "text:" {
        let value = original[value_start..].trim();
        return if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
    }

    // Value runs until the next recognized field marker.
    let rest_lower = &lower[value_start..];
    let mut value_end = original.len() - value_start;
    for field in FIELDS {
        if let Some(pos) = rest_lower.find(field) {
            value_end = value_end.min(pos);
        }
    }

    let value = original[value_start..value_start + value_end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "id:ABC-123 sub:001 dlvrd:001 submit date:2406151230 \
         done date:2406151231 stat:DELIVRD err:000 text:hello there";

    #[test]
    fn test_parse_canonical_receipt() {
        let dlr = Dlr::parse(CANONICAL).unwrap();

        assert_eq!(dlr.message_id, "ABC-123");
        assert_eq!(dlr.sub.as_deref(), Some("001"));
        assert_eq!(dlr.dlvrd.as_deref(), Some("001"));
        assert_eq!(dlr.submit_date.as_deref(), Some("2406151230"));
        assert_eq!(dlr.done_date.as_deref(), Some("2406151231"));
        assert_eq!(dlr.status, DlrStatus::Delivered);
        assert_eq!(dlr.error_code.as_deref(), Some("000"));
        assert_eq!(dlr.text.as_deref(), Some("hello there"));
    }

    #[test]
    fn test_parse_failure_statuses() {
        for (stat, expected) in [
            ("EXPIRED", DlrStatus::Expired),
            ("DELETED", DlrStatus::Deleted),
            ("UNDELIV", DlrStatus::Undeliverable),
            ("REJECTD", DlrStatus::Rejected),
            ("ACCEPTD", DlrStatus::Accepted),
            ("SOMENEW", DlrStatus::Unknown),
        ] {
            let text = format!("id:m1 stat:{stat} err:042");
            let dlr = Dlr::parse(&text).unwrap();
            assert_eq!(dlr.status, expected, "stat {stat}");
            assert_eq!(dlr.error_code.as_deref(), Some("042"));
        }
    }

    #[test]
    fn test_parse_requires_id_and_stat() {
        assert!(Dlr::parse("stat:DELIVRD err:000").is_none());
        assert!(Dlr::parse("id:m1 err:000").is_none());
        assert!(Dlr::parse("a plain mobile-originated message").is_none());
    }

    #[test]
    fn test_parse_case_insensitive_keys() {
        let dlr = Dlr::parse("ID:m9 STAT:undeliv ERR:001").unwrap();
        assert_eq!(dlr.message_id, "m9");
        assert_eq!(dlr.status, DlrStatus::Undeliverable);
    }

    #[test]
    fn test_parse_reordered_fields() {
        let dlr = Dlr::parse("stat:EXPIRED id:zz-9 err:005").unwrap();
        assert_eq!(dlr.message_id, "zz-9");
        assert_eq!(dlr.status, DlrStatus::Expired);
        assert_eq!(dlr.error_code.as_deref(), Some("005"));
    }

    #[test]
    fn test_sub_not_confused_with_submit_date() {
        let dlr = Dlr::parse("id:m1 submit date:2406151230 sub:002 stat:DELIVRD").unwrap();
        assert_eq!(dlr.sub.as_deref(), Some("002"));
        assert_eq!(dlr.submit_date.as_deref(), Some("2406151230"));
    }

    #[test]
    fn test_final_and_success_flags() {
        assert!(DlrStatus::Delivered.is_final());
        assert!(DlrStatus::Delivered.is_success());
        assert!(DlrStatus::Expired.is_final());
        assert!(DlrStatus::Expired.is_failure());
        assert!(!DlrStatus::Accepted.is_final());
        assert!(!DlrStatus::Enroute.is_final());
        assert!(!DlrStatus::Unknown.is_final());
    }
}
