//! Handler signatures and dispatch keys
//!
//! A handler declares an ordered parameter list. Each parameter is either
//! required or optional; in the compact form optional names carry a leading
//! `$` (`["a", "b", "$c"]`). The declared order is the order arguments are
//! handed to the handler body.
//!
//! A payload matches a handler when its set of field names equals the required
//! names plus any subset of the optional names. Each such set is canonicalized
//! as a [`dispatch_key`]: the names sorted and joined with a single space.
//!
//! ```
//! use cadence_router::Signature;
//!
//! let sig = Signature::parse(["a", "b", "$c"]).unwrap();
//! assert_eq!(sig.dispatch_keys().unwrap(), vec!["a b", "a b c"]);
//! ```

use crate::error::{Result, RouterError};

/// Marks an optional parameter in [`Signature::parse`]
pub const OPTIONAL_MARKER: char = '$';

/// Keys grow as 2^n in the optional count
pub const MAX_OPTIONAL: usize = 10;

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub optional: bool,
}

/// The declared shape of a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Signature with no parameters (the zero-argument handler)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required parameter
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            optional: false,
        });
        self
    }

    /// Append an optional parameter
    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            optional: true,
        });
        self
    }

    /// Parse the compact form, where optional names start with `$`
    pub fn parse<I, S>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut signature = Self::new();
        for raw in params {
            let raw = raw.as_ref();
            signature = match raw.strip_prefix(OPTIONAL_MARKER) {
                Some(name) => signature.optional(name),
                None => signature.required(raw),
            };
        }
        signature.validate()?;
        Ok(signature)
    }

    /// Parameters in declared order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Canonical key of the required names alone
    pub fn required_key(&self) -> String {
        dispatch_key(self.params.iter().filter(|p| !p.optional).map(|p| p.name.as_str()))
    }

    /// Every subset of the optional names, each sorted, starting with the empty set
    pub fn optional_power_set(&self) -> Vec<Vec<&str>> {
        let optional: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.optional)
            .map(|p| p.name.as_str())
            .collect();

        (0..(1usize << optional.len()))
            .map(|mask| {
                let mut subset: Vec<&str> = optional
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << *i) != 0)
                    .map(|(_, name)| *name)
                    .collect();
                subset.sort_unstable();
                subset
            })
            .collect()
    }

    /// All payload shapes this signature answers to.
    ///
    /// Empty for a parameterless signature; such a handler occupies the
    /// zero-argument slot instead. The empty shape is never a key: a
    /// signature of only optional parameters does not match `{}`.
    pub fn dispatch_keys(&self) -> Result<Vec<String>> {
        self.validate()?;

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| !p.optional)
            .map(|p| p.name.as_str())
            .collect();

        let keys = self
            .optional_power_set()
            .into_iter()
            .filter(|subset| !(required.is_empty() && subset.is_empty()))
            .map(|subset| dispatch_key(required.iter().copied().chain(subset)))
            .collect();

        Ok(keys)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for param in &self.params {
            if param.name.is_empty() {
                return Err(RouterError::InvalidSignature("empty parameter name".into()));
            }
            if param.name.chars().any(char::is_whitespace) {
                return Err(RouterError::InvalidSignature(format!(
                    "parameter `{}` contains whitespace",
                    param.name
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(RouterError::InvalidSignature(format!(
                    "parameter `{}` declared twice",
                    param.name
                )));
            }
        }

        let optional = self.params.iter().filter(|p| p.optional).count();
        if optional > MAX_OPTIONAL {
            return Err(RouterError::InvalidSignature(format!(
                "{} optional parameters (max {})",
                optional, MAX_OPTIONAL
            )));
        }

        Ok(())
    }
}

/// Canonical key for a set of field names: sorted, space-joined
pub fn dispatch_key<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_unstable();
    names.join(" ")
}
