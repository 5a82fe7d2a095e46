// logsift - core/extract.rs
//
// Field extraction: applies the selected field profiles to a line and
// returns the named groups of the first structural match.

use crate::core::model::FieldProfile;
use std::collections::BTreeMap;

/// Fields captured from one line, with the profile that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<'a> {
    pub profile_id: &'a str,
    pub fields: BTreeMap<String, String>,
}

/// Try `profiles` in order, and each profile's patterns in order. The first
/// pattern that matches decides; later profiles are not consulted.
///
/// Only named groups that participated in the match are returned, so an
/// optional group that did not match is absent rather than empty.
pub fn extract_fields<'a>(text: &str, profiles: &'a [FieldProfile]) -> Option<Extraction<'a>> {
    for profile in profiles {
        for pattern in &profile.patterns {
            let Some(caps) = pattern.captures(text) else {
                continue;
            };

            let fields = pattern
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect();

            return Some(Extraction {
                profile_id: &profile.id,
                fields,
            });
        }
    }
    None
}

/// Union of the field names of `profiles`, in profile order, first
/// occurrence wins. This is the fixed column set of tabular exports.
pub fn field_union(profiles: &[FieldProfile]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for profile in profiles {
        for name in profile.field_names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::load_builtin_profiles;
    use regex::Regex;

    fn profile(id: &str, patterns: &[&str]) -> FieldProfile {
        FieldProfile {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            is_builtin: false,
        }
    }

    fn builtin(id: &str) -> Vec<FieldProfile> {
        load_builtin_profiles()
            .into_iter()
            .filter(|p| p.id == id)
            .collect()
    }

    #[test]
    fn test_first_profile_wins() {
        let profiles = vec![
            profile("first", &[r"(?P<word>\w+)"]),
            profile("second", &[r"(?P<digits>\d+)"]),
        ];
        let ex = extract_fields("42 apples", &profiles).unwrap();
        assert_eq!(ex.profile_id, "first");
        assert_eq!(ex.fields.get("word").map(String::as_str), Some("42"));
        assert!(!ex.fields.contains_key("digits"));
    }

    #[test]
    fn test_falls_through_to_later_pattern() {
        let profiles = vec![profile("p", &[r"^GET (?P<path>\S+)", r"^(?P<verb>[A-Z]+) "])];
        let ex = extract_fields("POST /x", &profiles).unwrap();
        assert_eq!(ex.fields.len(), 1);
        assert_eq!(ex.fields["verb"], "POST");
    }

    #[test]
    fn test_optional_group_absent_when_not_participating() {
        let profiles = vec![profile("p", &[r"^(?P<a>\d+)(?: (?P<b>[a-z]+))?"])];
        let ex = extract_fields("123", &profiles).unwrap();
        assert_eq!(ex.fields.len(), 1);
        assert!(!ex.fields.contains_key("b"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let profiles = vec![profile("p", &[r"^(?P<n>\d+)$"])];
        assert!(extract_fields("not a number", &profiles).is_none());
        assert!(extract_fields("anything", &[]).is_none());
    }

    #[test]
    fn test_haproxy_simple_extracts_three_fields() {
        let profiles = builtin("haproxy-simple");
        let line = r#"Aug 10 10:00:05 lb1 haproxy[812]: 10.0.0.5:51234 [10/Aug/2025:10:00:05.123] web-in app/srv1 0/0/1/12/13 503 212 - - ---- 3/3/0/0/0 0/0 "GET /api/health HTTP/1.1""#;
        let ex = extract_fields(line, &profiles).unwrap();
        assert_eq!(ex.profile_id, "haproxy-simple");
        let keys: Vec<&str> = ex.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["client_ip", "request_path", "status_code"]);
        assert_eq!(ex.fields["client_ip"], "10.0.0.5");
        assert_eq!(ex.fields["status_code"], "503");
        assert_eq!(ex.fields["request_path"], "/api/health");
    }

    #[test]
    fn test_haproxy_http_detailed() {
        let profiles = builtin("haproxy-http");
        let line = r#"10.0.1.2:33317 [06/Feb/2009:12:14:14.655] http-in static/srv1 10/0/30/69/109 200 2750 - - ---- 1/1/1/1/0 0/0 {1wt.eu} {} "GET /index.html HTTP/1.1""#;
        let ex = extract_fields(line, &profiles).unwrap();
        assert_eq!(ex.fields["backend"], "static");
        assert_eq!(ex.fields["server"], "srv1");
        assert_eq!(ex.fields["tt"], "109");
        assert_eq!(ex.fields["status_code"], "200");
        assert_eq!(ex.fields["http_version"], "HTTP/1.1");
        assert_eq!(ex.fields["request_path"], "/index.html");
    }

    #[test]
    fn test_haproxy_tcp_log() {
        let profiles = builtin("haproxy-http");
        let line = "10.0.1.2:33313 [06/Feb/2009:12:12:51.443] fnt bck/srv1 0/0/5007 212 -- 0/0/0/0/3 0/0";
        let ex = extract_fields(line, &profiles).unwrap();
        assert_eq!(ex.fields["bytes_read"], "212");
        assert_eq!(ex.fields["termination_state"], "--");
        assert!(!ex.fields.contains_key("status_code"));
    }

    #[test]
    fn test_apache_combined_before_common() {
        let profiles: Vec<FieldProfile> = load_builtin_profiles()
            .into_iter()
            .filter(|p| p.id.starts_with("apache"))
            .collect();
        let combined = r#"192.168.1.20 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326 "http://example.com/start.html" "Mozilla/4.08""#;
        let ex = extract_fields(combined, &profiles).unwrap();
        assert_eq!(ex.profile_id, "apache-combined");
        assert_eq!(ex.fields["remote_user"], "frank");
        assert_eq!(ex.fields["user_agent"], "Mozilla/4.08");

        let common = r#"192.168.1.20 - - [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 404 -"#;
        let ex = extract_fields(common, &profiles).unwrap();
        assert_eq!(ex.profile_id, "apache-common");
        assert_eq!(ex.fields["status_code"], "404");
        assert_eq!(ex.fields["bytes_sent"], "-");
    }

    #[test]
    fn test_nginx_error_context() {
        let profiles = builtin("nginx-error");
        let line = r#"2025/08/10 10:00:00 [error] 1234#0: *56 open() "/srv/www/favicon.ico" failed (2: No such file or directory), client: 10.1.2.3, server: example.com, request: "GET /favicon.ico HTTP/1.1", host: "example.com""#;
        let ex = extract_fields(line, &profiles).unwrap();
        assert_eq!(ex.fields["level"], "error");
        assert_eq!(ex.fields["connection"], "56");
        assert_eq!(ex.fields["client_ip"], "10.1.2.3");
        assert_eq!(ex.fields["server"], "example.com");
        assert_eq!(ex.fields["request"], "GET /favicon.ico HTTP/1.1");
        assert!(ex.fields["message"].starts_with("open()"));
    }

    #[test]
    fn test_iis_both_field_sets() {
        let profiles = builtin("iis-w3c");
        let with_referrer = "2025-08-10 10:00:00 10.0.0.1 GET /default.htm - 80 - 10.0.0.9 Mozilla/5.0 - 200 0 0 15";
        let ex = extract_fields(with_referrer, &profiles).unwrap();
        assert_eq!(ex.fields["referrer"], "-");
        assert_eq!(ex.fields["time_taken"], "15");

        let without = "2025-08-10 10:00:00 10.0.0.1 GET /default.htm - 80 - 10.0.0.9 Mozilla/5.0 500 0 64 31";
        let ex = extract_fields(without, &profiles).unwrap();
        assert!(!ex.fields.contains_key("referrer"));
        assert_eq!(ex.fields["status_code"], "500");
    }

    #[test]
    fn test_field_union_keeps_first_occurrence_order() {
        let profiles = vec![
            profile("a", &[r"(?P<x>.)(?P<y>.)"]),
            profile("b", &[r"(?P<y>.)(?P<z>.)"]),
        ];
        assert_eq!(field_union(&profiles), vec!["x", "y", "z"]);
    }
}
