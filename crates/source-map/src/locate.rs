//! Finding the source map a script points at.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;

static MAPPING_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?://[#@]|/\*[#@])[ \t]*sourceMappingURL=([^\s*]+)")
        .expect("valid sourceMappingURL pattern")
});

/// Where a script says its map lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapReference {
    /// Map embedded as a `data:` URL, already decoded
    Inline(Vec<u8>),
    /// Map referenced by (possibly relative) URL
    Url(String),
}

/// The last `sourceMappingURL` annotation in `code`, if any
pub fn map_reference(code: &str) -> Option<MapReference> {
    let raw = MAPPING_URL
        .captures_iter(code)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())?;

    if raw.starts_with("data:") {
        return decode_data_url(raw).map(MapReference::Inline);
    }
    Some(MapReference::Url(raw.to_string()))
}

/// Decode a `data:application/json;base64,...` (or percent-free plain) URL
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        match STANDARD.decode(payload.trim()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::debug!("Ignoring undecodable inline source map: {e}");
                None
            }
        }
    } else {
        Some(payload.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_url_annotation() {
        let code = "console.log(1);\n//# sourceMappingURL=main.3f2a.js.map\n";
        assert_eq!(
            map_reference(code),
            Some(MapReference::Url("main.3f2a.js.map".to_string()))
        );
    }

    #[test]
    fn last_annotation_wins_and_legacy_marker_is_accepted() {
        let code = "//@ sourceMappingURL=old.map\nrun();\n/*# sourceMappingURL=new.map */";
        assert_eq!(map_reference(code), Some(MapReference::Url("new.map".to_string())));
    }

    #[test]
    fn decodes_inline_maps() {
        let json = br#"{"version":3}"#;
        let code = format!(
            "run();\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(json)
        );
        assert_eq!(map_reference(&code), Some(MapReference::Inline(json.to_vec())));
    }

    #[test]
    fn annotation_inside_string_on_same_line_is_ignored() {
        let code = "var s = '//# sourceMappingURL=fake.map';";
        assert_eq!(map_reference(code), None);
    }

    #[test]
    fn bad_inline_payload_is_none() {
        assert_eq!(decode_data_url("data:application/json;base64,@@@"), None);
        assert_eq!(decode_data_url("nope"), None);
    }
}
