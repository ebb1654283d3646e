//! Signature Database
//!
//! An immutable, ranked set of [`Rule`]s loaded from a text database file.
//! Rules are sorted once at load time by [`Rule::strength`], strongest first;
//! rules of equal strength keep their file order, so ranking is deterministic.

mod parse;
mod rule;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;

pub use crate::database::rule::{Comparison, Endian, Rule, Test, Width};

#[derive(Clone, Debug)]
pub struct Database {
    path: Option<PathBuf>,
    rules: Vec<Rule>,
}
impl Database {
    /// Read and parse a database file.
    ///
    /// # Errors
    ///
    /// [`Load`](ErrorKind::Load) if the file cannot be read, is not UTF-8
    /// text, contains a syntax error, or contains no rules at all.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display(), rules))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => exn::bail!(ErrorKind::Load(format!("could not open `{}' ({e})", path.display()))),
        };
        let source = std::str::from_utf8(&bytes).or_raise(|| {
            ErrorKind::Load(format!("`{}' is not a signature database (not UTF-8 text)", path.display()))
        })?;
        let rules = match parse::parse(source) {
            Ok(rules) => rules,
            Err(e) => exn::bail!(ErrorKind::Load(format!("{e} in `{}'", path.display()))),
        };
        let database = Self::from_rules(Some(path.to_path_buf()), rules)?;
        tracing::Span::current().record("rules", database.len());
        Ok(database)
    }

    fn from_rules(path: Option<PathBuf>, mut rules: Vec<Rule>) -> Result<Self> {
        if rules.is_empty() {
            let location = path.as_ref().map(|p| format!(" in `{}'", p.display())).unwrap_or_default();
            exn::bail!(ErrorKind::Load(format!("no signatures found{location}")));
        }
        // Stable: equal strengths keep declaration order.
        rules.sort_by_key(|rule| Reverse(rule.strength()));
        Ok(Self { path, rules })
    }

    /// Path the database was loaded from, if it came from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Top-level rules, strongest first.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Consistency warnings: rules that can never produce output in some
    /// mode. Reported by [`Magic::load`](crate::Magic::load) under
    /// [`MagicFlags::CHECK`](crate::MagicFlags::CHECK).
    pub fn check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for rule in &self.rules {
            if rule.description().is_empty() && rule.mime().is_none() && rule.extensions().is_none() {
                warnings.push(format!("line {}: rule has no description, MIME type or extension", rule.line()));
            }
            if let Some(extensions) = rule.extensions()
                && extensions.split('/').any(str::is_empty)
            {
                warnings.push(format!("line {}: empty entry in extension list `{}'", rule.line(), extensions));
            }
        }
        warnings
    }
}

impl FromStr for Database {
    type Err = crate::error::Error;
    fn from_str(source: &str) -> std::result::Result<Self, Self::Err> {
        match parse::parse(source) {
            Ok(rules) => Self::from_rules(None, rules),
            Err(e) => exn::bail!(ErrorKind::Load(e.to_string())),
        }
    }
}
