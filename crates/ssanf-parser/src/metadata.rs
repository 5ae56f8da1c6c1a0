//! Metadata-channel reader.

use ssanf_anf::{TokenTag, META_MARKER, RET_MARKER, TAG_SEPARATOR};
use ssanf_cfg::Span;

use crate::{ParseError, Result};

/// Everything after the `#` of one line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineMeta {
    pub tags: Vec<TokenTag>,
    pub span: Option<Span>,
    pub ret: bool,
}

/// Split a line into its code and metadata halves at the last marker
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let at = line.rfind(META_MARKER)?;
    Some((&line[..at], &line[at + META_MARKER.len_utf8()..]))
}

/// Read the metadata half of line `line`, which starts at byte `base`
pub fn parse_meta(meta: &str, base: usize, line: usize) -> Result<LineMeta> {
    let mut out = LineMeta::default();
    let mut seen_tags = false;
    let mut cursor = 0;
    for part in meta.split_whitespace() {
        // Position of this part, for errors
        let start = meta[cursor..].find(part).map_or(cursor, |i| cursor + i);
        cursor = start + part.len();
        let span = Span::new(base + start, base + cursor);

        if part == RET_MARKER {
            out.ret = true;
        } else if let Some(range) = part.strip_prefix('@') {
            out.span = Some(parse_span(range).ok_or_else(|| ParseError::BadSpan {
                line,
                span,
                text: part.to_string(),
            })?);
        } else if !seen_tags {
            seen_tags = true;
            for tag in part.split(TAG_SEPARATOR) {
                let parsed = TokenTag::parse(tag).ok_or_else(|| ParseError::BadTag {
                    line,
                    span,
                    tag: tag.to_string(),
                })?;
                out.tags.push(parsed);
            }
        } else {
            return Err(ParseError::BadTag {
                line,
                span,
                tag: part.to_string(),
            });
        }
    }
    Ok(out)
}

fn parse_span(text: &str) -> Option<Span> {
    let (start, end) = text.split_once(':')?;
    let start = start.parse().ok()?;
    let end = end.parse().ok()?;
    (start <= end).then(|| Span::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ssanf_anf::{HeadTag, ValueTag};

    #[test]
    fn test_split_at_last_marker() {
        assert_eq!(split_line("print '#' # f:gv;c"), Some(("print '#' ", " f:gv;c")));
        assert_eq!(split_line("let x_0 = 1 in"), None);
    }

    #[test]
    fn test_full_metadata() {
        let meta = parse_meta(" f<sep>:gv;v;c @3:9 RET", 0, 1).unwrap();
        assert_eq!(
            meta.tags,
            vec![
                TokenTag::Head(HeadTag {
                    named: Some(vec!["sep".into()]),
                    tag: ValueTag::GlobalVar
                }),
                TokenTag::Value(ValueTag::Var),
                TokenTag::Value(ValueTag::Const),
            ]
        );
        assert_eq!(meta.span, Some(Span::new(3, 9)));
        assert!(meta.ret);
    }

    #[test]
    fn test_empty_metadata() {
        assert_eq!(parse_meta("", 0, 1).unwrap(), LineMeta::default());
        assert_eq!(parse_meta("   ", 0, 1).unwrap(), LineMeta::default());
    }

    #[test]
    fn test_bad_span_is_positioned() {
        let err = parse_meta(" v @x:2", 20, 4).unwrap_err();
        assert_eq!(
            err,
            ParseError::BadSpan {
                line: 4,
                span: Span::new(23, 27),
                text: "@x:2".into(),
            }
        );
    }

    #[test]
    fn test_unknown_tag() {
        let err = parse_meta(" v;zz", 0, 2).unwrap_err();
        assert!(matches!(err, ParseError::BadTag { line: 2, ref tag, .. } if tag == "zz"));
    }
}
