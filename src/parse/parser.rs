use crate::{FactShape, Rule};

/// Name of the group that holds items written before any `package` line.
pub const DEFAULT_PACKAGE: &str = "default";

/// The result of parsing rule text: declarations and rules grouped by package.
#[derive(Debug)]
pub struct ParsedProgram {
    pub packages: Vec<ParsedPackage>,
}

#[derive(Debug)]
pub struct ParsedPackage {
    pub name: String,
    pub shapes: Vec<FactShape>,
    pub rules: Vec<Rule>,
}

impl ParsedPackage {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shapes: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.rules.is_empty()
    }
}

impl ParsedProgram {
    /// Every rule across all packages, in source order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.packages.iter().flat_map(|p| p.rules.iter())
    }

    /// Every declared shape across all packages, in source order.
    pub fn shapes(&self) -> impl Iterator<Item = &FactShape> {
        self.packages.iter().flat_map(|p| p.shapes.iter())
    }
}
