//! Line-oriented manifest parsing and re-emission for the list-copy workflow.

use crate::error::EngineError;

/// One manifest record: `"REL-SRC","REL-DST"` or `"REL-SRC","REL-DST",CODE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub src_relative: String,
    pub dst_relative: String,
    pub code: Option<i64>,
}

impl Record {
    /// Re-emits this record in its canonical on-disk form (without a
    /// trailing newline).
    pub fn to_line(&self) -> String {
        match self.code {
            Some(code) => format!("\"{}\",\"{}\",{}", self.src_relative, self.dst_relative, code),
            None => format!("\"{}\",\"{}\"", self.src_relative, self.dst_relative),
        }
    }

    pub fn with_code(&self, code: i64) -> Record {
        Record {
            src_relative: self.src_relative.clone(),
            dst_relative: self.dst_relative.clone(),
            code: Some(code),
        }
    }
}

/// Parses one manifest line (without its trailing LF). Rejects CR in the
/// line, which signals a CRLF-terminated file this format does not accept.
pub fn parse_line(line: &str) -> Result<Record, EngineError> {
    if line.contains('\r') {
        return Err(EngineError::InvalidManifestLine(line.to_string()));
    }

    let fields = split_quoted_csv(line).ok_or_else(|| EngineError::InvalidManifestLine(line.to_string()))?;

    match fields.len() {
        2 => Ok(Record {
            src_relative: fields[0].clone(),
            dst_relative: fields[1].clone(),
            code: None,
        }),
        3 => {
            let code: i64 = fields[2]
                .parse()
                .map_err(|_| EngineError::InvalidManifestLine(line.to_string()))?;
            Ok(Record {
                src_relative: fields[0].clone(),
                dst_relative: fields[1].clone(),
                code: Some(code),
            })
        }
        _ => Err(EngineError::InvalidManifestLine(line.to_string())),
    }
}

/// Splits a line into 2 or 3 comma-separated fields, where the first two
/// fields must each be wrapped in exactly one pair of double quotes.
fn split_quoted_csv(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = line;

    for _ in 0..2 {
        let rest_trimmed = rest.strip_prefix('"')?;
        let end = rest_trimmed.find('"')?;
        let (value, remainder) = rest_trimmed.split_at(end);
        fields.push(value.to_string());
        rest = remainder.strip_prefix('"')?;
        if fields.len() < 2 {
            rest = rest.strip_prefix(',')?;
        }
    }

    if rest.is_empty() {
        return Some(fields);
    }

    let third = rest.strip_prefix(',')?;
    if third.is_empty() || third.contains(',') || third.contains('"') {
        return None;
    }
    fields.push(third.to_string());
    Some(fields)
}

/// Parses every line of `contents`; on the first malformed line, returns that
/// line's error immediately (list-copy's "first pass" whole-file validation).
pub fn parse_manifest(contents: &str) -> Result<Vec<Record>, EngineError> {
    contents.split('\n').filter(|l| !l.is_empty()).map(parse_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_field_record() {
        let record = parse_line("\"a/b.txt\",\"c/d.txt\"").unwrap();
        assert_eq!(record.src_relative, "a/b.txt");
        assert_eq!(record.dst_relative, "c/d.txt");
        assert_eq!(record.code, None);
    }

    #[test]
    fn parses_three_field_record() {
        let record = parse_line("\"a\",\"b\",1221").unwrap();
        assert_eq!(record.code, Some(1221));
    }

    #[test]
    fn rejects_cr() {
        assert!(parse_line("\"a\",\"b\"\r").is_err());
    }

    #[test]
    fn rejects_malformed_quotes() {
        assert!(parse_line("a,\"b\"").is_err());
        assert!(parse_line("\"a,\"b\"").is_err());
    }

    #[test]
    fn round_trip_re_emit() {
        let line = "\"a/b.txt\",\"c/d.txt\",1205";
        let record = parse_line(line).unwrap();
        assert_eq!(record.to_line(), line);
    }

    #[test]
    fn round_trip_without_code() {
        let line = "\"src\",\"dst\"";
        let record = parse_line(line).unwrap();
        assert_eq!(record.to_line(), line);
    }

    #[test]
    fn parse_manifest_splits_lines() {
        let contents = "\"a\",\"b\"\n\"c\",\"d\",7\n";
        let records = parse_manifest(contents).unwrap();
        assert_eq!(records.len(), 2);
    }
}
