//! Per-run transformation state.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use crate::ssa::Diagnostic;

/// State shared by every scope of one transformation run.
///
/// Create one per program; two runs never share a context, so independent
/// programs can be transformed concurrently.
#[derive(Debug, Default)]
pub struct TransformContext {
    /// Bare names already defined by a scope processed earlier in this run
    used_names: FxHashSet<SmolStr>,
    diagnostics: Vec<Diagnostic>,
}

impl TransformContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name`, or the first of `name_2`, `name_3`, ... not yet in use
    pub fn unique_name(&self, name: &SmolStr) -> SmolStr {
        self.unique_name_avoiding(name, &FxHashSet::default())
    }

    /// Like [`unique_name`](Self::unique_name), also skipping `taken`
    pub fn unique_name_avoiding(&self, name: &SmolStr, taken: &FxHashSet<SmolStr>) -> SmolStr {
        let free = |n: &SmolStr| !self.used_names.contains(n) && !taken.contains(n);
        if free(name) {
            return name.clone();
        }
        let mut suffix = 2u32;
        loop {
            let candidate = SmolStr::from(format!("{}_{}", name, suffix));
            if free(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Mark names as taken by the scope that was just renamed
    pub fn reserve<I>(&mut self, names: I)
    where
        I: IntoIterator<Item = SmolStr>,
    {
        self.used_names.extend(names);
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used_names.contains(name)
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unique_name_appends_suffix() {
        let mut ctx = TransformContext::new();
        let a = SmolStr::new("a");
        assert_eq!(ctx.unique_name(&a), "a");
        ctx.reserve([a.clone()]);
        assert_eq!(ctx.unique_name(&a), "a_2");
        ctx.reserve([SmolStr::new("a_2")]);
        assert_eq!(ctx.unique_name(&a), "a_3");
    }

    #[test]
    fn test_unique_name_skips_names_taken_locally() {
        let mut ctx = TransformContext::new();
        ctx.reserve([SmolStr::new("a")]);
        let taken: FxHashSet<SmolStr> = [SmolStr::new("a_2")].into_iter().collect();
        assert_eq!(ctx.unique_name_avoiding(&SmolStr::new("a"), &taken), "a_3");
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut first = TransformContext::new();
        first.reserve([SmolStr::new("x")]);
        let second = TransformContext::new();
        assert!(first.is_used("x"));
        assert!(!second.is_used("x"));
    }
}
