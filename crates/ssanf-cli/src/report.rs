//! Error rendering with ariadne.

use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};
use ssanf_cfg::Span;
use ssanf_parser::ParseError;

/// Stable code per parse error kind
pub fn error_code(error: &ParseError) -> &'static str {
    match error {
        ParseError::Lex { .. } => "E0101",
        ParseError::MissingMarker { .. } => "E0102",
        ParseError::TagCountMismatch { .. } => "E0103",
        ParseError::UnbalancedLet { .. } => "E0201",
        ParseError::UnexpectedToken { .. } => "E0202",
        ParseError::UnexpectedEnd { .. } => "E0203",
        ParseError::MissingHeadTag { .. } => "E0301",
        ParseError::BadTag { .. } => "E0302",
        ParseError::BadLiteral { .. } => "E0303",
        ParseError::BadSpan { .. } => "E0304",
    }
}

fn headline(error: &ParseError) -> &'static str {
    match error {
        ParseError::Lex { .. } => "unrecognized text",
        ParseError::MissingMarker { .. } => "missing metadata",
        ParseError::TagCountMismatch { .. } => "tag count mismatch",
        ParseError::UnbalancedLet { .. } => "unbalanced binding",
        ParseError::UnexpectedToken { .. } => "unexpected token",
        ParseError::UnexpectedEnd { .. } => "unexpected end of input",
        ParseError::MissingHeadTag { .. } => "untagged application",
        ParseError::BadTag { .. } => "invalid tag",
        ParseError::BadLiteral { .. } => "invalid literal",
        ParseError::BadSpan { .. } => "invalid span",
    }
}

/// Convert a byte span into the char range ariadne indexes by.
///
/// The result is clamped to the source and never empty unless the source is.
pub fn char_range(source: &str, span: Span) -> Range<usize> {
    let to_char = |byte: usize| {
        let mut byte = byte.min(source.len());
        while !source.is_char_boundary(byte) {
            byte -= 1;
        }
        source[..byte].chars().count()
    };
    let total = source.chars().count();
    let start = to_char(span.start).min(total.saturating_sub(1));
    let end = to_char(span.end).max(start + 1).min(total.max(start));
    start..end
}

/// Print a parse error against the text it came from
pub fn report_parse_error(filename: &str, source: &str, error: &ParseError) -> std::io::Result<()> {
    let range = char_range(source, error.span());
    Report::build(ReportKind::Error, filename, range.start)
        .with_code(error_code(error))
        .with_message(headline(error))
        .with_label(
            Label::new((filename, range))
                .with_message(error.to_string())
                .with_color(Color::Red),
        )
        .finish()
        .eprint((filename, Source::from(source)))
}
