//! Classification name paths such as `Tumor: Positive`.

use std::fmt;
use std::str::FromStr;

use crate::error::PathMirrorError;

/// Separator between the components of a derived class name.
pub const SEPARATOR: &str = ": ";

/// The full name path of a classification, outermost name first.
///
/// Components are trimmed and never empty or contain `:`, so
/// `ClassPath::parse(&path.to_string())` always returns `path`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassPath(Vec<String>);

fn validate(raw: &str, full: &str) -> Result<String, PathMirrorError> {
    let name = raw.trim();
    let reason = if name.is_empty() {
        "empty name component"
    } else if name.contains(':') {
        "names may not contain ':'"
    } else {
        return Ok(name.to_string());
    };
    Err(PathMirrorError::InvalidClassName {
        name: full.to_string(),
        reason: reason.to_string(),
    })
}

impl ClassPath {
    /// Builds a path from individual names.
    pub fn new<I>(names: I) -> Result<Self, PathMirrorError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let raw: Vec<I::Item> = names.into_iter().collect();
        let full = raw
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        if raw.is_empty() {
            return Err(PathMirrorError::InvalidClassName {
                name: full,
                reason: "empty path".to_string(),
            });
        }
        raw.iter()
            .map(|n| validate(n.as_ref(), &full))
            .collect::<Result<Vec<_>, _>>()
            .map(ClassPath)
    }

    /// Parses `"A: B"` into `["A", "B"]`. Whitespace around `:` is optional.
    pub fn parse(s: &str) -> Result<Self, PathMirrorError> {
        if s.trim().is_empty() {
            return Err(PathMirrorError::InvalidClassName {
                name: s.to_string(),
                reason: "empty path".to_string(),
            });
        }
        s.split(':')
            .map(|n| validate(n, s))
            .collect::<Result<Vec<_>, _>>()
            .map(ClassPath)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// The innermost name.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn parent(&self) -> Option<ClassPath> {
        (self.0.len() > 1).then(|| ClassPath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Extends the path by one derived name.
    pub fn child(&self, name: &str) -> Result<ClassPath, PathMirrorError> {
        let mut names = self.0.clone();
        names.push(validate(name, &format!("{}{}{}", self, SEPARATOR, name))?);
        Ok(ClassPath(names))
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &ClassPath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(SEPARATOR))
    }
}

impl fmt::Debug for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassPath({:?})", self.to_string())
    }
}

impl FromStr for ClassPath {
    type Err = PathMirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassPath::parse(s)
    }
}
