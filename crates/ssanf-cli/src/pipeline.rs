//! One run of the transformation, from CFG to output texts.

use std::fs;
use std::path::PathBuf;

use ssanf_anf::{lower, pretty_print, pretty_print_with_provenance, reconstruct, AnfError};
use ssanf_cfg::Cfg;
use ssanf_parser::ParseError;
use ssanf_ssa::{build_ssa, Diagnostic, SsaError, SsaProgram};
use thiserror::Error;

use crate::config::Config;

/// Failure of one pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("SSA construction failed: {0}")]
    Ssa(#[from] SsaError),

    #[error("lowering failed: {0}")]
    Anf(#[from] AnfError),

    /// The provenance text did not read back; `text` is what was parsed
    #[error("reading back the ANF text failed: {error}")]
    Parse { error: ParseError, text: String },
}

/// Texts produced by [`transform`]
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs {
    pub ssa: String,
    pub anf: String,
    pub anf_with_prov: Option<String>,
    pub ssa_back: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the forward pipeline and, if configured, the reverse one
pub fn transform(cfg: &Cfg, config: &Config) -> Result<Outputs, PipelineError> {
    let style = config.style();
    let program = build_ssa(cfg)?;
    for diagnostic in program.diagnostics.iter().filter(|d| d.is_defect()) {
        tracing::warn!(span = ?diagnostic.span, "{}", diagnostic);
    }

    let anf = lower(&program, config.lower_options())?;
    let with_prov = pretty_print_with_provenance(&anf, style);

    let ssa_back = if config.parse_back {
        let back = read_back(&with_prov)?;
        Some(ssanf_ssa::pretty_print(&back, style))
    } else {
        None
    };

    Ok(Outputs {
        ssa: ssanf_ssa::pretty_print(&program, style),
        anf: pretty_print(&anf, style),
        anf_with_prov: config.prov_info.then_some(with_prov),
        ssa_back,
        diagnostics: program.diagnostics,
    })
}

/// Parse provenance text and rebuild the SSA program it encodes
pub fn read_back(text: &str) -> Result<SsaProgram, PipelineError> {
    let expr = ssanf_parser::parse(text).map_err(|error| PipelineError::Parse {
        error,
        text: text.to_string(),
    })?;
    Ok(reconstruct(&expr)?)
}

/// Write every produced text under the configured directory
pub fn write_outputs(outputs: &Outputs, config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(&config.out_dir)?;

    let mut files = vec![
        (config.ssa_path(), Some(&outputs.ssa)),
        (config.anf_path(), Some(&outputs.anf)),
        (config.anf_with_prov_path(), outputs.anf_with_prov.as_ref()),
        (config.ssa_back_path(), outputs.ssa_back.as_ref()),
    ];
    files.retain(|(_, text)| text.is_some());

    let mut written = Vec::with_capacity(files.len());
    for (path, text) in files {
        if let Some(text) = text {
            fs::write(&path, text)?;
            tracing::debug!(path = %path.display(), bytes = text.len(), "wrote output");
            written.push(path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ssanf_cfg::{CfgBuilder, Expr, Stmt};

    /// `x = 1; print(x)`
    fn straight_line() -> Cfg {
        let mut b = CfgBuilder::new("main");
        let entry = b.block();
        b.push(entry, Stmt::assign("x", Expr::int(1)));
        b.push(entry, Stmt::expr(Expr::call("print", vec![Expr::name("x")])));
        b.build().unwrap()
    }

    #[test]
    fn test_default_run_skips_optional_outputs() {
        let outputs = transform(&straight_line(), &Config::new()).unwrap();
        assert!(outputs.ssa.contains("x_0 ← 1"), "{}", outputs.ssa);
        assert!(outputs.anf.contains("let x_0 = 1 in"), "{}", outputs.anf);
        assert_eq!(outputs.anf_with_prov, None);
        assert_eq!(outputs.ssa_back, None);
    }

    #[test]
    fn test_parse_back_reproduces_ssa() {
        let config = Config {
            ascii: true,
            prov_info: true,
            parse_back: true,
            ..Default::default()
        };
        let outputs = transform(&straight_line(), &config).unwrap();
        assert!(outputs.anf_with_prov.is_some());
        assert_eq!(outputs.ssa_back.as_deref(), Some(outputs.ssa.as_str()));
    }

    #[test]
    fn test_read_back_keeps_the_text_on_error() {
        match read_back("let #\n") {
            Err(PipelineError::Parse { text, .. }) => assert_eq!(text, "let #\n"),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_outputs() {
        let dir = std::env::temp_dir().join(format!("ssanf-pipeline-{}", std::process::id()));
        let config = Config {
            out_dir: dir.clone(),
            prov_info: true,
            ..Default::default()
        };
        let outputs = transform(&straight_line(), &config).unwrap();
        let written = write_outputs(&outputs, &config).unwrap();
        assert_eq!(
            written,
            vec![config.ssa_path(), config.anf_path(), config.anf_with_prov_path()]
        );
        assert_eq!(fs::read_to_string(config.ssa_path()).unwrap(), outputs.ssa);
        fs::remove_dir_all(dir).unwrap();
    }
}
