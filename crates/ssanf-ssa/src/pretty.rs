//! Pretty printing for SSA programs.
//!
//! The output is meant for people: spans and diagnostics are not printed and
//! nothing parses it back.

use std::fmt::Write;

use crate::ssa::*;

/// Glyph set used for arrows, phis and lambdas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintStyle {
    /// `←`, `φ`, `λ`
    #[default]
    Symbolic,
    /// `<-`, `phi`, `lambda`
    Ascii,
}

impl PrintStyle {
    pub fn arrow(self) -> &'static str {
        match self {
            PrintStyle::Symbolic => "←",
            PrintStyle::Ascii => "<-",
        }
    }

    pub fn phi(self) -> &'static str {
        match self {
            PrintStyle::Symbolic => "φ",
            PrintStyle::Ascii => "phi",
        }
    }

    pub fn lambda(self) -> &'static str {
        match self {
            PrintStyle::Symbolic => "λ",
            PrintStyle::Ascii => "lambda",
        }
    }
}

/// Pretty print an entire SSA program
pub fn pretty_print(program: &SsaProgram, style: PrintStyle) -> String {
    let mut out = String::new();
    let mut printer = PrettyPrinter::new(&mut out, style);
    printer.print_program(program);
    out
}

/// Pretty print a single block
pub fn pretty_print_block(block: &Block, style: PrintStyle) -> String {
    let mut out = String::new();
    let mut printer = PrettyPrinter::new(&mut out, style);
    printer.print_block(block);
    out
}

struct PrettyPrinter<'a> {
    out: &'a mut String,
    style: PrintStyle,
    indent: usize,
}

impl<'a> PrettyPrinter<'a> {
    fn new(out: &'a mut String, style: PrintStyle) -> Self {
        Self {
            out,
            style,
            indent: 0,
        }
    }

    fn indent(&mut self) {
        self.indent += 2;
    }

    fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(2);
    }

    fn writeln(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push(' ');
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn print_program(&mut self, program: &SsaProgram) {
        for proc in &program.procedures {
            self.print_procedure(proc);
            self.out.push('\n');
        }
        for block in &program.blocks {
            self.print_block(block);
        }
    }

    fn print_procedure(&mut self, proc: &Procedure) {
        let params: Vec<String> = proc.params.iter().map(ToString::to_string).collect();
        self.writeln(&format!("proc {}({}) {{", proc.name, params.join(", ")));
        self.indent();
        for block in &proc.blocks {
            self.print_block(block);
        }
        self.dedent();
        self.writeln("}");
    }

    fn print_block(&mut self, block: &Block) {
        self.writeln(&format!("{}:", block.label));
        self.indent();
        for stmt in &block.stmts {
            let line = self.format_stmt(stmt);
            self.writeln(&line);
        }
        self.dedent();
    }

    fn format_stmt(&self, stmt: &Stmt) -> String {
        let mut s = String::new();
        match &stmt.kind {
            StmtKind::Assign { var, value } => {
                let _ = write!(s, "{} {} {}", var, self.style.arrow(), value);
            }
            StmtKind::Phi { var, incoming } => {
                let incoming: Vec<String> = incoming.iter().map(ToString::to_string).collect();
                let _ = write!(
                    s,
                    "{} {} {}({})",
                    var,
                    self.style.arrow(),
                    self.style.phi(),
                    incoming.join(", ")
                );
            }
            StmtKind::Goto(label) => {
                let _ = write!(s, "goto {}", label);
            }
            StmtKind::If {
                test,
                then_branch,
                else_branch,
            } => {
                let _ = write!(
                    s,
                    "if {} then {} else {}",
                    test,
                    self.format_stmt(then_branch),
                    self.format_stmt(else_branch)
                );
            }
            StmtKind::Return(Some(value)) => {
                let _ = write!(s, "ret {}", value);
            }
            StmtKind::Return(None) => s.push_str("ret"),
            StmtKind::Call(call) => {
                let _ = write!(s, "{}", call);
            }
            StmtKind::Comment(text) => {
                let _ = write!(s, "# {}", text);
            }
        }
        s
    }
}
