//! Lightweight field extraction from raw XML text.
//!
//! The wire payload is XML-shaped but not guaranteed well-formed, so no
//! full XML parse is attempted. Fields are pulled out with non-greedy,
//! first-occurrence regex matches and every failure mode collapses to an
//! empty string: a missing tag, a tag with no value, or a tag name that
//! does not compile into a valid pattern.
//!
//! # Example
//!
//! ```
//! use gtmwire::protocol::{attr_value, tag_value};
//!
//! let text = r#"<message type="CIF_REQST"><origMsgID>m-1</origMsgID></message>"#;
//! assert_eq!(tag_value("origMsgID", text), "m-1");
//! assert_eq!(attr_value("message type", text), "CIF_REQST");
//! assert_eq!(tag_value("missing", text), "");
//! ```

use regex::Regex;

/// Extract the value between a tag's opening delimiter and the next
/// closing delimiter: `<tag ...>VALUE<...>`.
///
/// First occurrence only, non-greedy, case-sensitive on the tag name.
/// Returns the empty string on any miss or pattern-compile failure.
pub fn tag_value(tag: &str, text: &str) -> String {
    capture(&format!("<{tag}.*?>(.*?)<.*?>"), text)
}

/// Extract a quoted attribute-style value inside a self-describing
/// element: `<tag="VALUE"`.
///
/// Same matching and error discipline as [`tag_value`].
pub fn attr_value(tag: &str, text: &str) -> String {
    capture(&format!("<{tag}=\"(.*?)\""), text)
}

fn capture(pattern: &str, text: &str) -> String {
    let Ok(re) = Regex::new(pattern) else {
        return String::new();
    };
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_value_basic() {
        let text = "<origSysID>SYS-A</origSysID>";
        assert_eq!(tag_value("origSysID", text), "SYS-A");
    }

    #[test]
    fn test_tag_value_with_attributes_in_opening_tag() {
        let text = r#"<timeStamp format="iso">2021-05-01</timeStamp>"#;
        assert_eq!(tag_value("timeStamp", text), "2021-05-01");
    }

    #[test]
    fn test_tag_value_qualified_tag_name() {
        let text = r#"<field name="mrpcID">RPC-42</field>"#;
        assert_eq!(tag_value(r#"field name="mrpcID""#, text), "RPC-42");
    }

    #[test]
    fn test_tag_value_first_occurrence_only() {
        let text = "<retCode>0</retCode><retCode>1</retCode>";
        assert_eq!(tag_value("retCode", text), "0");
    }

    #[test]
    fn test_tag_value_missing_tag() {
        assert_eq!(tag_value("retCode", "<other>x</other>"), "");
    }

    #[test]
    fn test_tag_value_case_sensitive() {
        assert_eq!(tag_value("retcode", "<retCode>0</retCode>"), "");
    }

    #[test]
    fn test_tag_value_empty_value() {
        assert_eq!(tag_value("retCode", "<retCode></retCode>"), "");
    }

    #[test]
    fn test_attr_value_basic() {
        let text = r#"blah<message type="OPS_REQST" v="2">"#;
        assert_eq!(attr_value("message type", text), "OPS_REQST");
    }

    #[test]
    fn test_attr_value_first_occurrence_only() {
        let text = r#"<command name="getAccount"/><command name="other"/>"#;
        assert_eq!(attr_value("command name", text), "getAccount");
    }

    #[test]
    fn test_attr_value_missing() {
        assert_eq!(attr_value("command name", "<message>x</message>"), "");
    }

    #[test]
    fn test_invalid_pattern_swallowed() {
        // An unbalanced paren in the tag name makes the pattern fail to
        // compile; the miss must not propagate.
        assert_eq!(tag_value("bad(tag", "<bad(tag>x</bad(tag>"), "");
        assert_eq!(attr_value("bad(tag", r#"<bad(tag="x""#), "");
    }

    #[test]
    fn test_non_greedy_stops_at_first_close() {
        let text = "<origMsgID>a</origMsgID><origSysID>b</origSysID>";
        assert_eq!(tag_value("origMsgID", text), "a");
        assert_eq!(tag_value("origSysID", text), "b");
    }
}
