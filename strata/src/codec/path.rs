//! File-path utilities: zero-padded log version names and
//! Hive-style partition value parsing.

use std::collections::BTreeMap;

/// Width of a zero-padded commit version file name: `_delta_log/NNNNNNNNNNNNNNNNNNNN.json`
/// uses twenty digits, enough headroom that version numbers never sort
/// incorrectly as strings.
pub const VERSION_DIGITS: usize = 20;

/// Render a commit version as its twenty-digit zero-padded file stem, e.g.
/// `5` -> `"00000000000000000005"`.
pub fn format_version(version: u64) -> String {
    format!("{version:0width$}", width = VERSION_DIGITS)
}

/// Commit log JSON file name for a version.
pub fn commit_file_name(version: u64) -> String {
    format!("{}.json", format_version(version))
}

/// Parse a commit log file name (ignoring directory components) back into
/// its version number. Returns `None` for anything that isn't a
/// `<20 digits>.json` name, including checkpoint and CDC side-files.
pub fn parse_commit_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".json")?;
    if stem.len() != VERSION_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Multi-part checkpoint file name: `<version>.checkpoint.<part>.<total>.parquet`,
/// with `part` and `total` also twenty-digit zero-padded. A single-part
/// checkpoint still uses `part = total = 1`.
pub fn checkpoint_file_name(version: u64, part: u32, total: u32) -> String {
    format!(
        "{}.checkpoint.{:0width$}.{:0width$}.parquet",
        format_version(version),
        part,
        total,
        width = VERSION_DIGITS,
    )
}

/// Parse a Hive-style partition path segment such as `country=US` into its
/// key/value pair. `__HIVE_DEFAULT_PARTITION__` decodes to a `None` value,
/// matching the convention for a null partition column.
pub fn parse_partition_segment(segment: &str) -> Option<(String, Option<String>)> {
    let (key, value) = segment.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    let decoded = percent_decode(value);
    if decoded == "__HIVE_DEFAULT_PARTITION__" {
        Some((key.to_string(), None))
    } else {
        Some((key.to_string(), Some(decoded)))
    }
}

/// Parse every `key=value` segment in a relative data file path into an
/// ordered map of partition column values. Non-partition segments (the
/// trailing file name, or any segment without `=`) are ignored.
pub fn parse_partition_path(relative_path: &str) -> BTreeMap<String, Option<String>> {
    let mut out = BTreeMap::new();
    for segment in relative_path.split('/') {
        if let Some((k, v)) = parse_partition_segment(segment) {
            out.insert(k, v);
        }
    }
    out
}

/// Build the Hive-style directory prefix for a set of partition values, in
/// the order given (partition column order is significant and caller-owned).
pub fn partition_path(values: &[(String, Option<String>)]) -> String {
    values
        .iter()
        .map(|(k, v)| match v {
            Some(val) => format!("{k}={}", percent_encode(val)),
            None => format!("{k}=__HIVE_DEFAULT_PARTITION__"),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_twenty_digit_version() {
        assert_eq!(format_version(5), "00000000000000000005");
        assert_eq!(commit_file_name(5), "00000000000000000005.json");
    }

    #[test]
    fn parses_commit_file_name_round_trip() {
        assert_eq!(parse_commit_file_name("00000000000000000042.json"), Some(42));
        assert_eq!(parse_commit_file_name("not_a_version.json"), None);
        assert_eq!(parse_commit_file_name("00000000000000000042.checkpoint.parquet"), None);
    }

    #[test]
    fn checkpoint_file_name_pads_part_and_total() {
        assert_eq!(
            checkpoint_file_name(10, 1, 3),
            "00000000000000000010.checkpoint.00000000000000000001.00000000000000000003.parquet"
        );
    }

    #[test]
    fn parses_partition_path_with_default_and_encoded_values() {
        let parsed = parse_partition_path("country=US/city=New%20York/part-0.parquet");
        assert_eq!(parsed.get("country"), Some(&Some("US".to_string())));
        assert_eq!(parsed.get("city"), Some(&Some("New York".to_string())));

        let parsed_null = parse_partition_path("country=__HIVE_DEFAULT_PARTITION__/part-0.parquet");
        assert_eq!(parsed_null.get("country"), Some(&None));
    }

    #[test]
    fn partition_path_round_trips_through_parse() {
        let values = vec![
            ("country".to_string(), Some("New York".to_string())),
            ("region".to_string(), None),
        ];
        let path = partition_path(&values);
        let parsed = parse_partition_path(&format!("{path}/file.parquet"));
        assert_eq!(parsed.get("country"), Some(&Some("New York".to_string())));
        assert_eq!(parsed.get("region"), Some(&None));
    }
}
