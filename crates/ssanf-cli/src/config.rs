//! Driver configuration.
//!
//! Values come from the defaults below, then an optional TOML file, then
//! command-line flags.

use serde::{Deserialize, Serialize};
use ssanf_anf::{LowerOptions, PrintStyle};
use std::fs;
use std::path::{Path, PathBuf};

/// Output locations and pipeline switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory all output files are written to
    pub out_dir: PathBuf,

    /// SSA text
    pub ssa_out_name: String,

    /// Plain ANF text
    pub anf_out_name: String,

    /// ANF text with the provenance channel
    pub anf_with_prov_out_name: String,

    /// SSA rebuilt from the provenance text
    pub ssa_back_out_name: String,

    /// Print `<-`, `phi` and `lambda` instead of `←`, `φ` and `λ`
    pub ascii: bool,

    /// Write the provenance file
    pub prov_info: bool,

    /// Parse the provenance text back and rebuild SSA from it
    pub parse_back: bool,

    /// Nest block groups along the dominator tree
    pub nest_blocks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("output"),
            ssa_out_name: "ssa_parsed.txt".to_string(),
            anf_out_name: "anf_parsed.txt".to_string(),
            anf_with_prov_out_name: "anf_parsed_with_prov_info.txt".to_string(),
            ssa_back_out_name: "ssa_parsed_back.txt".to_string(),
            ascii: false,
            prov_info: false,
            parse_back: false,
            nest_blocks: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn style(&self) -> PrintStyle {
        if self.ascii {
            PrintStyle::Ascii
        } else {
            PrintStyle::Symbolic
        }
    }

    pub fn lower_options(&self) -> LowerOptions {
        LowerOptions {
            nest_blocks: self.nest_blocks,
        }
    }

    pub fn ssa_path(&self) -> PathBuf {
        self.out_dir.join(&self.ssa_out_name)
    }

    pub fn anf_path(&self) -> PathBuf {
        self.out_dir.join(&self.anf_out_name)
    }

    pub fn anf_with_prov_path(&self) -> PathBuf {
        self.out_dir.join(&self.anf_with_prov_out_name)
    }

    pub fn ssa_back_path(&self) -> PathBuf {
        self.out_dir.join(&self.ssa_back_out_name)
    }
}
