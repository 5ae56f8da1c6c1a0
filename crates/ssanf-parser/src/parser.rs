//! Recursive-descent parser for provenance-annotated ANF.
//!
//! The whole text is lexed first into one token stream; every word token
//! carries the tag found at its position in the metadata channel. Parsing
//! then works on index ranges of that stream: a `let` owns everything up to
//! its balanced `in`, an `if` everything up to its matching `else`, and a run
//! of words is an application when its first token carries a head tag.

use ssanf_anf::{Expr, Hint, Provenance, TokenTag, Value, ValueTag};
use ssanf_cfg::{Literal, Span};

use crate::lexer::{lex_code, Token, TokenKind};
use crate::metadata::{parse_meta, split_line, LineMeta};
use crate::{ParseError, Result};

/// Parser state: all tokens of the text plus the metadata of every line
pub struct Parser {
    tokens: Vec<Token>,
    /// Indexed by line number - 1
    lines: Vec<LineMeta>,
    /// Byte length of the text, for errors at the end of input
    end: usize,
}

/// An enclosing `let` or `comment` waiting for its continuation
enum Frame {
    Let { var: Value, bound: Expr, prov: Provenance },
    Comment { text: smol_str::SmolStr, prov: Provenance },
}

impl Parser {
    /// Lex `text` and pair every word with its tag
    pub fn new(text: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut lines = Vec::new();
        let mut base = 0;
        for (index, raw) in text.split_inclusive('\n').enumerate() {
            let line = index + 1;
            let content = raw.trim_end_matches(['\n', '\r']);
            let line_base = base;
            base += raw.len();

            if content.trim().is_empty() {
                lines.push(LineMeta::default());
                continue;
            }
            let (code, meta) = split_line(content).ok_or_else(|| ParseError::MissingMarker {
                line,
                span: Span::new(line_base, line_base + content.len()),
            })?;
            let meta_base = line_base + code.len() + 1;
            let meta = parse_meta(meta, meta_base, line)?;
            let mut words = lex_code(code, line_base, line).map_err(|offset| ParseError::Lex {
                line,
                span: Span::new(offset, offset + 1),
            })?;

            let word_count = words.iter().filter(|t| !t.kind.is_keyword()).count();
            if word_count != meta.tags.len() {
                return Err(ParseError::TagCountMismatch {
                    line,
                    span: Span::new(meta_base, line_base + content.len()),
                    tokens: word_count,
                    tags: meta.tags.len(),
                });
            }
            let mut tags = meta.tags.iter();
            for token in words.iter_mut().filter(|t| !t.kind.is_keyword()) {
                token.tag = tags.next().cloned();
            }
            tokens.extend(words);
            lines.push(meta);
        }
        tracing::trace!(tokens = tokens.len(), lines = lines.len(), "lexed ANF text");
        Ok(Self {
            tokens,
            lines,
            end: text.len(),
        })
    }

    /// Parse the whole token stream as one expression
    pub fn parse(&self) -> Result<Expr> {
        self.expr(0, self.tokens.len())
    }

    /// Parse tokens `lo..hi` as one expression.
    ///
    /// `let` and `comment` chains are walked in a loop, so long blocks do not
    /// deepen the recursion.
    fn expr(&self, mut lo: usize, hi: usize) -> Result<Expr> {
        let mut frames = Vec::new();
        let tail = loop {
            let token = self.at(lo, hi, "an expression")?;
            match token.kind {
                TokenKind::Let => {
                    let var = self.value_at(lo + 1, hi)?;
                    self.expect(lo + 2, hi, TokenKind::Eq)?;
                    let close = self.matching_in(lo, lo + 3, hi)?.ok_or_else(|| {
                        ParseError::UnbalancedLet {
                            line: token.line,
                            span: token.span,
                            keyword: "let",
                        }
                    })?;
                    let bound = self.expr(lo + 3, close)?;
                    frames.push(Frame::Let {
                        var,
                        bound,
                        prov: self.line_prov(lo),
                    });
                    lo = close + 1;
                }
                TokenKind::Comment => {
                    let text = self.comment_text(lo + 1, hi)?;
                    frames.push(Frame::Comment {
                        text,
                        prov: self.line_prov(lo),
                    });
                    lo += 2;
                }
                _ => break self.term(lo, hi)?,
            }
        };

        Ok(frames.into_iter().rev().fold(tail, |body, frame| match frame {
            Frame::Let { var, bound, prov } => {
                let mut expr = Expr::let_(var, bound, body);
                expr.prov = prov;
                expr
            }
            Frame::Comment { text, prov } => {
                let mut expr = Expr::comment(text, body);
                expr.prov = prov;
                expr
            }
        }))
    }

    /// Any expression that is not a `let` or `comment`
    fn term(&self, lo: usize, hi: usize) -> Result<Expr> {
        let token = self.at(lo, hi, "an expression")?;
        let mut expr = match token.kind {
            TokenKind::LetRec => self.letrec(lo, hi)?,
            TokenKind::If => self.if_expr(lo, hi)?,
            TokenKind::Lambda => self.lambda(lo, hi)?,
            _ => self.run(lo, hi)?,
        };
        let prov = self.line_prov(lo);
        expr.prov.span = prov.span;
        expr.prov.hints.extend(prov.hints);
        Ok(expr)
    }

    /// `letrec name = e (and name = e)* [in body]`
    fn letrec(&self, lo: usize, hi: usize) -> Result<Expr> {
        let close = self.matching_in(lo, lo + 1, hi)?;
        let group_end = close.unwrap_or(hi);

        let mut bindings = Vec::new();
        let mut start = lo + 1;
        for sep in self.top_level_ands(lo + 1, group_end).into_iter().chain([group_end]) {
            let name = self.value_at(start, sep)?;
            self.expect(start + 1, sep, TokenKind::Eq)?;
            let bound = self.expr(start + 2, sep)?;
            bindings.push((name, bound));
            start = sep + 1;
        }

        let body = match close {
            Some(close) => Some(self.expr(close + 1, hi)?),
            None => None,
        };
        Ok(Expr::letrec(bindings, body))
    }

    /// `if test then e else e`
    fn if_expr(&self, lo: usize, hi: usize) -> Result<Expr> {
        let test = self.value_at(lo + 1, hi)?;
        self.expect(lo + 2, hi, TokenKind::Then)?;
        let mut depth = 1usize;
        let mut else_at = None;
        for i in lo + 3..hi {
            match self.tokens[i].kind {
                TokenKind::If => depth += 1,
                TokenKind::Else => {
                    depth -= 1;
                    if depth == 0 {
                        else_at = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let else_at = else_at.ok_or_else(|| self.end_error(hi, "`else`"))?;
        let then_ = self.expr(lo + 3, else_at)?;
        let else_ = self.expr(else_at + 1, hi)?;
        Ok(Expr::if_(test, then_, else_))
    }

    /// `λ . e` or `λ param . e`
    fn lambda(&self, lo: usize, hi: usize) -> Result<Expr> {
        let next = self.at(lo + 1, hi, "a parameter or `.`")?;
        if next.kind == TokenKind::Dot {
            return Ok(Expr::func(None, self.expr(lo + 2, hi)?));
        }
        let param = self.value_at(lo + 1, hi)?;
        self.expect(lo + 2, hi, TokenKind::Dot)?;
        Ok(Expr::func(Some(param), self.expr(lo + 3, hi)?))
    }

    /// A run of words: an application when its head is tagged as one
    fn run(&self, lo: usize, hi: usize) -> Result<Expr> {
        if let Some(keyword) = self.tokens[lo..hi].iter().find(|t| t.kind.is_keyword()) {
            return Err(ParseError::UnexpectedToken {
                line: keyword.line,
                span: keyword.span,
                expected: "a value".into(),
                found: keyword.kind.to_string(),
            });
        }
        let head = &self.tokens[lo];
        match &head.tag {
            Some(TokenTag::Head(tag)) => {
                let callee = self.decode(head, tag.tag)?;
                let args = (lo + 1..hi)
                    .map(|i| self.value_at(i, hi))
                    .collect::<Result<Vec<_>>>()?;
                let app = Expr::app(callee, args);
                Ok(match &tag.named {
                    Some(names) => app.with_hint(Hint::NamedArguments(names.clone())),
                    None => app,
                })
            }
            _ if hi - lo > 1 => Err(ParseError::MissingHeadTag {
                line: head.line,
                span: head.span,
                head: head.kind.to_string(),
            }),
            _ => Ok(Expr::value(self.value_at(lo, hi)?)),
        }
    }

    // ========== Tokens ==========

    fn at(&self, index: usize, hi: usize, expected: &str) -> Result<&Token> {
        if index < hi {
            Ok(&self.tokens[index])
        } else {
            Err(self.end_error(hi, expected))
        }
    }

    fn expect(&self, index: usize, hi: usize, kind: TokenKind) -> Result<()> {
        let expected = format!("`{}`", kind);
        let token = self.at(index, hi, &expected)?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                line: token.line,
                span: token.span,
                expected,
                found: token.kind.to_string(),
            })
        }
    }

    /// Error for a range that ends before `expected`; points at the token
    /// that closes the range, or at the end of the text
    fn end_error(&self, hi: usize, expected: &str) -> ParseError {
        let (line, span) = match self.tokens.get(hi).or_else(|| self.tokens.last()) {
            Some(token) => (token.line, token.span),
            None => (self.lines.len().max(1), Span::new(self.end, self.end)),
        };
        ParseError::UnexpectedEnd {
            line,
            span,
            expected: expected.to_string(),
        }
    }

    /// Index of the `in` closing the `let`/`letrec` at `opener`, scanning
    /// from `from`; `None` when the range ends first
    fn matching_in(&self, opener: usize, from: usize, hi: usize) -> Result<Option<usize>> {
        let mut depth = 1usize;
        for i in from..hi {
            match self.tokens[i].kind {
                TokenKind::Let | TokenKind::LetRec => depth += 1,
                TokenKind::In => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(i));
                    }
                }
                _ => {}
            }
        }
        match self.tokens.get(opener) {
            Some(token) if token.kind == TokenKind::LetRec && depth == 1 => Ok(None),
            Some(token) if token.kind == TokenKind::LetRec => Err(ParseError::UnbalancedLet {
                line: token.line,
                span: token.span,
                keyword: "letrec",
            }),
            _ => Ok(None),
        }
    }

    /// Positions of the `and`s that separate the bindings of one group
    fn top_level_ands(&self, lo: usize, hi: usize) -> Vec<usize> {
        let mut depth = 0usize;
        let mut out = Vec::new();
        for i in lo..hi {
            match self.tokens[i].kind {
                TokenKind::Let | TokenKind::LetRec => depth += 1,
                TokenKind::In => depth = depth.saturating_sub(1),
                TokenKind::And if depth == 0 => out.push(i),
                _ => {}
            }
        }
        out
    }

    fn comment_text(&self, index: usize, hi: usize) -> Result<smol_str::SmolStr> {
        let token = self.at(index, hi, "a quoted comment")?;
        match (&token.kind, Literal::parse(&token.kind.to_string())) {
            (TokenKind::Quoted(_), Some(Literal::Str(text))) => Ok(text),
            (TokenKind::Quoted(text), _) => Err(ParseError::BadLiteral {
                line: token.line,
                span: token.span,
                text: text.to_string(),
            }),
            _ => Err(ParseError::UnexpectedToken {
                line: token.line,
                span: token.span,
                expected: "a quoted comment".into(),
                found: token.kind.to_string(),
            }),
        }
    }

    // ========== Values ==========

    /// The single word at `index` as an atomic value
    fn value_at(&self, index: usize, hi: usize) -> Result<Value> {
        let token = self.at(index, hi, "a value")?;
        match &token.tag {
            Some(TokenTag::Value(tag)) => self.decode(token, *tag),
            Some(TokenTag::Head(head)) => Err(ParseError::BadTag {
                line: token.line,
                span: token.span,
                tag: head.to_string(),
            }),
            None => Err(ParseError::UnexpectedToken {
                line: token.line,
                span: token.span,
                expected: "a value".into(),
                found: token.kind.to_string(),
            }),
        }
    }

    fn decode(&self, token: &Token, tag: ValueTag) -> Result<Value> {
        let text = token.kind.text().unwrap_or_default();
        let bad_literal = || ParseError::BadLiteral {
            line: token.line,
            span: token.span,
            text: text.to_string(),
        };
        match tag {
            ValueTag::Const => Literal::parse(text).map(Value::constant).ok_or_else(bad_literal),
            ValueTag::LabelConst => Literal::parse(text)
                .map(|lit| Value::constant(lit).with_hint(Hint::BlockLabel))
                .ok_or_else(bad_literal),
            ValueTag::Unit if text == "unit" => Ok(Value::unit()),
            ValueTag::Unit => Err(bad_literal()),
            _ => tag.decode_var(text).ok_or_else(|| ParseError::BadTag {
                line: token.line,
                span: token.span,
                tag: tag.to_string(),
            }),
        }
    }

    /// Span and `RET` of the line, when the node at `index` starts it
    fn line_prov(&self, index: usize) -> Provenance {
        let mut prov = Provenance::new();
        let Some(token) = self.tokens.get(index) else {
            return prov;
        };
        if !token.first_on_line {
            return prov;
        }
        if let Some(meta) = self.lines.get(token.line - 1) {
            prov.span = meta.span;
            if meta.ret {
                prov.hints.insert(Hint::ReturnValue);
            }
        }
        prov
    }
}
