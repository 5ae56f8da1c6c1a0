//! Per-token tags of the provenance channel.
//!
//! Each non-keyword token of a printed line gets one tag. Applications tag
//! their head token as `f:<tag>`, or `f<k1,k2>:<tag>` when the trailing
//! arguments are keyword arguments.

use smol_str::SmolStr;
use ssanf_ssa::SsaVar;
use std::fmt;

use crate::anf::{Hint, Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    Const,
    Var,
    GlobalVar,
    BufferVar,
    LabelVar,
    LabelConst,
    Unit,
}

impl ValueTag {
    pub fn of(value: &Value) -> ValueTag {
        let label = value.prov.has(&Hint::BlockLabel);
        match &value.kind {
            ValueKind::Const(_) if label => ValueTag::LabelConst,
            ValueKind::Const(_) => ValueTag::Const,
            ValueKind::Var(_) if label => ValueTag::LabelVar,
            ValueKind::Var(_) if value.prov.has(&Hint::BufferVariable) => ValueTag::BufferVar,
            ValueKind::Var(var) if var.is_versioned() => ValueTag::Var,
            ValueKind::Var(_) => ValueTag::GlobalVar,
            ValueKind::Unit => ValueTag::Unit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueTag::Const => "c",
            ValueTag::Var => "v",
            ValueTag::GlobalVar => "gv",
            ValueTag::BufferVar => "bv",
            ValueTag::LabelVar => "lv",
            ValueTag::LabelConst => "lc",
            ValueTag::Unit => "u",
        }
    }

    pub fn parse(text: &str) -> Option<ValueTag> {
        Some(match text {
            "c" => ValueTag::Const,
            "v" => ValueTag::Var,
            "gv" => ValueTag::GlobalVar,
            "bv" => ValueTag::BufferVar,
            "lv" => ValueTag::LabelVar,
            "lc" => ValueTag::LabelConst,
            "u" => ValueTag::Unit,
            _ => return None,
        })
    }

    /// Rebuild a variable-like value from its printed name.
    ///
    /// Constants and `unit` are decoded by the parser, which owns literal
    /// syntax; this returns `None` for them.
    pub fn decode_var(self, name: &str) -> Option<Value> {
        let value = match self {
            ValueTag::Var => Value::var(SsaVar::parse_versioned(name)?),
            ValueTag::GlobalVar => Value::var(SsaVar::free(name)),
            ValueTag::BufferVar => Value::var(SsaVar::free(name)).with_hint(Hint::BufferVariable),
            ValueTag::LabelVar => Value::var(SsaVar::free(name)).with_hint(Hint::BlockLabel),
            ValueTag::Const | ValueTag::LabelConst | ValueTag::Unit => return None,
        };
        Some(value)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag of an application head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadTag {
    pub named: Option<Vec<SmolStr>>,
    pub tag: ValueTag,
}

impl HeadTag {
    pub fn parse(text: &str) -> Option<HeadTag> {
        let rest = text.strip_prefix('f')?;
        let (named, tag) = rest.split_once(':')?;
        let named = if named.is_empty() {
            None
        } else {
            let list = named.strip_prefix('<')?.strip_suffix('>')?;
            Some(list.split(',').map(SmolStr::new).collect())
        };
        Some(HeadTag {
            named,
            tag: ValueTag::parse(tag)?,
        })
    }
}

impl fmt::Display for HeadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("f")?;
        if let Some(names) = &self.named {
            write!(f, "<{}>", names.join(","))?;
        }
        write!(f, ":{}", self.tag)
    }
}

/// A token tag: plain value tag or application head
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTag {
    Value(ValueTag),
    Head(HeadTag),
}

impl TokenTag {
    pub fn parse(text: &str) -> Option<TokenTag> {
        match ValueTag::parse(text) {
            Some(tag) => Some(TokenTag::Value(tag)),
            None => HeadTag::parse(text).map(TokenTag::Head),
        }
    }

    pub fn value_tag(&self) -> ValueTag {
        match self {
            TokenTag::Value(tag) => *tag,
            TokenTag::Head(head) => head.tag,
        }
    }
}
