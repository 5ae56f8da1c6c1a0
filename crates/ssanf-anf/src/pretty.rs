//! Pretty printing for ANF.
//!
//! Two renderings share one layout:
//!
//! - plain: indented code only
//! - provenance: every code line padded to a shared column, followed by `#`
//!   and the metadata of that line (per-token tags, span, `RET`)
//!
//! Every expression node starts a new line, except an application or value
//! bound by a `let` that carries no span and no `RET`; it stays on the `let`
//! line. The span and `RET` of a line belong to the node that starts at the
//! line's first token.

use ssanf_cfg::{Literal, Span};
use ssanf_ssa::PrintStyle;

use crate::anf::*;
use crate::tag::{HeadTag, ValueTag};

/// Words that cannot be printed as bare identifiers
pub const KEYWORDS: &[&str] = &[
    "let", "letrec", "and", "in", "if", "then", "else", "comment", "=", ".", "λ", "lambda", "unit",
];

/// Separator between the code and metadata channels
pub const META_MARKER: char = '#';

/// Separator between tags in the metadata channel
pub const TAG_SEPARATOR: char = ';';

/// Marker of a return position in the metadata channel
pub const RET_MARKER: &str = "RET";

/// Render indented code without metadata
pub fn pretty_print(expr: &Expr, style: PrintStyle) -> String {
    let mut printer = AnfPrinter::new(style);
    printer.print(expr, 0);
    printer.finish_plain()
}

/// Render code and the provenance channel side by side
pub fn pretty_print_with_provenance(expr: &Expr, style: PrintStyle) -> String {
    let mut printer = AnfPrinter::new(style);
    printer.print(expr, 0);
    printer.finish_with_provenance()
}

/// Collapse runs of spaces outside quoted strings and trim line ends
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut in_quote = false;
        let mut escaped = false;
        let mut last_space = false;
        for c in line.chars() {
            if in_quote {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '\'' {
                    in_quote = false;
                }
                last_space = false;
                continue;
            }
            if c == ' ' {
                if !last_space {
                    out.push(c);
                }
                last_space = true;
                continue;
            }
            if c == '\'' {
                in_quote = true;
            }
            last_space = false;
            out.push(c);
        }
        while out.ends_with(' ') {
            out.pop();
        }
        out.push('\n');
    }
    out
}

/// Text of an identifier, wrapped in backticks when it reads as a keyword
pub fn escape_name(name: &str) -> String {
    if name.is_empty() || KEYWORDS.contains(&name) {
        format!("`{}`", name)
    } else {
        name.to_string()
    }
}

#[derive(Debug, Default)]
struct Line {
    indent: usize,
    tokens: Vec<String>,
    tags: Vec<String>,
    span: Option<Span>,
    ret: bool,
    /// A node already owns this line's span and `RET`
    claimed: bool,
}

impl Line {
    fn code(&self) -> String {
        let mut code = " ".repeat(self.indent * 2);
        code.push_str(&self.tokens.join(" "));
        code
    }

    fn meta(&self) -> String {
        let mut parts = Vec::new();
        if !self.tags.is_empty() {
            parts.push(self.tags.join(&TAG_SEPARATOR.to_string()));
        }
        if let Some(span) = self.span {
            parts.push(format!("@{}", span));
        }
        if self.ret {
            parts.push(RET_MARKER.to_string());
        }
        parts.join(" ")
    }
}

struct AnfPrinter {
    style: PrintStyle,
    lines: Vec<Line>,
}

impl AnfPrinter {
    fn new(style: PrintStyle) -> Self {
        Self {
            style,
            lines: Vec::new(),
        }
    }

    fn new_line(&mut self, indent: usize) {
        match self.lines.last_mut() {
            Some(line) if line.tokens.is_empty() => line.indent = indent,
            _ => self.lines.push(Line {
                indent,
                ..Line::default()
            }),
        }
    }

    fn current(&mut self) -> &mut Line {
        if self.lines.is_empty() {
            self.lines.push(Line::default());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    /// Give the line's metadata to `prov` if the node starts the line
    fn claim(&mut self, prov: &Provenance) {
        let line = self.current();
        if line.tokens.is_empty() && !line.claimed {
            line.claimed = true;
            line.span = prov.span;
            line.ret = prov.is_return();
        }
    }

    fn keyword(&mut self, word: &str) {
        self.current().tokens.push(word.to_string());
    }

    fn token(&mut self, text: String, tag: String) {
        let line = self.current();
        line.tokens.push(text);
        line.tags.push(tag);
    }

    fn value(&mut self, value: &Value) {
        let text = value_text(value);
        self.token(text, ValueTag::of(value).to_string());
    }

    fn print(&mut self, expr: &Expr, indent: usize) {
        let mut current = expr;
        loop {
            self.new_line(indent);
            self.claim(&current.prov);
            match &current.kind {
                ExprKind::Let { var, bound, body } => {
                    self.keyword("let");
                    self.value(var);
                    self.keyword("=");
                    if is_inline(bound) {
                        self.run(bound);
                        self.keyword("in");
                    } else {
                        self.print(bound, indent + 1);
                        self.new_line(indent);
                        self.keyword("in");
                    }
                    current = body;
                }
                ExprKind::Comment { text, body } => {
                    self.keyword("comment");
                    self.token(
                        Literal::Str(text.clone()).to_string(),
                        ValueTag::Const.to_string(),
                    );
                    current = body;
                }
                ExprKind::LetRec { bindings, body } => {
                    self.keyword("letrec");
                    for (i, (name, bound)) in bindings.iter().enumerate() {
                        if i > 0 {
                            self.new_line(indent);
                            self.keyword("and");
                        }
                        self.new_line(indent + 1);
                        self.value(name);
                        self.keyword("=");
                        self.print(bound, indent + 2);
                    }
                    match body {
                        Some(body) => {
                            self.new_line(indent);
                            self.keyword("in");
                            current = body;
                        }
                        None => return,
                    }
                }
                ExprKind::If { test, then_, else_ } => {
                    self.keyword("if");
                    self.value(test);
                    self.keyword("then");
                    self.print(then_, indent + 1);
                    self.new_line(indent);
                    self.keyword("else");
                    self.print(else_, indent + 1);
                    return;
                }
                ExprKind::Func { param, body } => {
                    self.keyword(self.style.lambda());
                    if let Some(param) = param {
                        self.value(param);
                    }
                    self.keyword(".");
                    self.print(body, indent + 1);
                    return;
                }
                ExprKind::App { .. } | ExprKind::Value(_) => {
                    self.run(current);
                    return;
                }
            }
        }
    }

    /// An application or value as one run of tokens
    fn run(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::App { args, callee } => {
                let head = HeadTag {
                    named: expr.prov.named_arguments().map(<[_]>::to_vec),
                    tag: ValueTag::of(callee),
                };
                self.token(value_text(callee), head.to_string());
                for arg in args {
                    self.value(arg);
                }
            }
            ExprKind::Value(value) => self.value(value),
            _ => {}
        }
    }

    fn finish_plain(self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.code());
            out.push('\n');
        }
        out
    }

    fn finish_with_provenance(self) -> String {
        let codes: Vec<String> = self.lines.iter().map(Line::code).collect();
        let width = codes.iter().map(|c| c.chars().count()).max().unwrap_or(0) + 1;
        let mut out = String::new();
        for (line, code) in self.lines.iter().zip(&codes) {
            let meta = line.meta();
            out.push_str(&format!("{:<width$}{}", code, META_MARKER, width = width));
            if !meta.is_empty() {
                out.push(' ');
                out.push_str(&meta);
            }
            out.push('\n');
        }
        out
    }
}

/// Bound expressions printed on the `let` line
fn is_inline(bound: &Expr) -> bool {
    matches!(bound.kind, ExprKind::App { .. } | ExprKind::Value(_))
        && bound.prov.span.is_none()
        && !bound.prov.is_return()
}

fn value_text(value: &Value) -> String {
    match &value.kind {
        ValueKind::Const(lit) => lit.to_string(),
        ValueKind::Var(var) => escape_name(&var.to_string()),
        ValueKind::Unit => "unit".to_string(),
    }
}
