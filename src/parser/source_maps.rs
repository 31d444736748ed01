//! # Source Map Comments
//!
//! Detection, stripping and decoding of `//# sourceMappingURL=` comments.
//! Only inline base64 data URLs are decoded; file URLs are surfaced as-is
//! for the caller to resolve.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::parser::{ParseError, ParseResult};

const COMMENT_MARKERS: [&str; 2] = ["//# sourceMappingURL=", "//@ sourceMappingURL="];
const DATA_URL_PREFIX: &str = "data:application/json;base64,";

/// A Source Map v3 document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    pub names: Vec<String>,
    pub mappings: String,
}

/// Splits a trailing source-map comment off `source`.
///
/// Returns the source with the comment removed and, when the URL was an
/// inline data URL, the decoded map. A non-inline URL strips the comment
/// but yields no map (resolving file URLs is the host's concern).
pub fn extract(source: &str) -> ParseResult<(String, Option<SourceMap>)> {
    let Some((start, url)) = find_comment(source) else {
        return Ok((source.to_string(), None));
    };

    let mut clean = source[..start].to_string();
    let after = &source[start..];
    if let Some(newline) = after.find('\n') {
        clean.push_str(&after[newline..]);
    }

    let map = match url.strip_prefix(DATA_URL_PREFIX) {
        Some(encoded) => Some(decode_inline(encoded)?),
        None => None,
    };
    Ok((clean, map))
}

/// Locates the last source-map comment, returning its byte offset and URL.
fn find_comment(source: &str) -> Option<(usize, String)> {
    let mut found = None;
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        for marker in COMMENT_MARKERS {
            if let Some(rest) = trimmed.strip_prefix(marker) {
                let url = rest.trim_end().to_string();
                if !url.is_empty() {
                    found = Some((offset + indent, url));
                }
            }
        }
        offset += line.len();
    }
    found
}

fn decode_inline(encoded: &str) -> ParseResult<SourceMap> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ParseError::InvalidSourceMap {
            message: format!("base64 decode failed: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| ParseError::InvalidSourceMap {
        message: format!("invalid JSON: {e}"),
    })
}

/// Renders `map` as an inline `//# sourceMappingURL=` comment line.
pub fn to_inline_comment(map: &SourceMap) -> String {
    let json = serde_json::to_vec(map).unwrap_or_default();
    let encoded = base64::engine::general_purpose::STANDARD.encode(json);
    format!("//# sourceMappingURL={DATA_URL_PREFIX}{encoded}")
}
