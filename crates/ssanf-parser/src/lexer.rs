//! Code-channel lexer.
//!
//! Splits the code half of a line into keywords and words. Quoted string
//! literals are single tokens even when they contain spaces or keywords, and
//! backtick-escaped names never read as keywords.

use logos::Logos;
use smol_str::SmolStr;
use ssanf_anf::TokenTag;
use ssanf_cfg::Span;
use std::fmt;

/// Strip the backticks around an escaped name
fn unescape_name(lex: &mut logos::Lexer<TokenKind>) -> SmolStr {
    let slice = lex.slice();
    SmolStr::new(&slice[1..slice.len() - 1])
}

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r]+")]
pub enum TokenKind {
    // ========== Keywords ==========
    #[token("let")]
    Let,
    #[token("letrec")]
    LetRec,
    #[token("and")]
    And,
    #[token("in")]
    In,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("comment")]
    Comment,
    #[token("=")]
    Eq,
    #[token(".")]
    Dot,
    #[token("λ")]
    #[token("lambda")]
    Lambda,

    // ========== Words ==========
    /// String literal, quotes included
    #[regex(r"'(?:[^'\\]|\\.)*'", |lex| SmolStr::new(lex.slice()))]
    Quoted(SmolStr),

    /// Name wrapped in backticks, backticks removed
    #[regex(r"`[^`]*`", unescape_name)]
    Escaped(SmolStr),

    #[regex(r"[^ \t\r\n'`]+", priority = 1, callback = |lex| SmolStr::new(lex.slice()))]
    Word(SmolStr),
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        !matches!(
            self,
            TokenKind::Quoted(_) | TokenKind::Escaped(_) | TokenKind::Word(_)
        )
    }

    /// Text of a word token
    pub fn text(&self) -> Option<&str> {
        match self {
            TokenKind::Quoted(s) | TokenKind::Escaped(s) | TokenKind::Word(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Let => write!(f, "let"),
            TokenKind::LetRec => write!(f, "letrec"),
            TokenKind::And => write!(f, "and"),
            TokenKind::In => write!(f, "in"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Then => write!(f, "then"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Comment => write!(f, "comment"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Lambda => write!(f, "λ"),
            TokenKind::Quoted(s) | TokenKind::Word(s) => write!(f, "{}", s),
            TokenKind::Escaped(s) => write!(f, "`{}`", s),
        }
    }
}

/// A code token with its position and, for words, its metadata tag
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the whole text
    pub span: Span,
    /// 1-based line number
    pub line: usize,
    /// First token of its line; such a token may own the line's span and `RET`
    pub first_on_line: bool,
    pub tag: Option<TokenTag>,
}

/// Lex the code half of one line.
///
/// `base` is the byte offset of the line in the whole text. On failure the
/// offset of the offending text is returned.
pub fn lex_code(code: &str, base: usize, line: usize) -> Result<Vec<Token>, usize> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(code);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let kind = result.map_err(|_| base + range.start)?;
        tokens.push(Token {
            kind,
            span: Span::new(base + range.start, base + range.end),
            line,
            first_on_line: tokens.is_empty(),
            tag: None,
        });
    }
    Ok(tokens)
}
