//! Evaluation contexts.
//!
//! A [`Context`] is the subject of flag evaluation (formerly a "user"). It is
//! either a single context of one kind, or a multi-context combining several
//! kinds (e.g. a user plus its organization). Attribute values are arbitrary
//! JSON values; evaluation never coerces them implicitly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContextError;

/// Kind of a context (e.g. `"user"`, `"organization"`).
///
/// Conveniently converts from `String` and `&str`:
/// ```
/// # use flagcore::Kind;
/// let kind: Kind = "organization".into();
/// assert_eq!(kind.as_str(), "organization");
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    /// The default kind, `"user"`, assumed wherever flag data does not name a
    /// kind explicitly.
    pub fn user() -> Kind {
        Kind("user".to_owned())
    }

    /// Return `true` if this is the default `"user"` kind.
    pub fn is_user(&self) -> bool {
        self.0 == "user"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `"multi"` and `"kind"` are reserved; other kinds are restricted to
    /// `[a-zA-Z0-9._-]`.
    fn validate(&self) -> Result<(), ContextError> {
        let valid = !self.0.is_empty()
            && self.0 != "multi"
            && self.0 != "kind"
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-');
        if valid {
            Ok(())
        } else {
            Err(ContextError::InvalidKind(self.0.clone()))
        }
    }
}

impl Default for Kind {
    fn default() -> Kind {
        Kind::user()
    }
}

impl From<&str> for Kind {
    fn from(value: &str) -> Kind {
        Kind(value.to_owned())
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An individual context of a single kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleContext {
    kind: Kind,
    key: String,
    name: Option<String>,
    anonymous: bool,
    secondary: Option<String>,
    attributes: HashMap<String, Value>,
}

impl SingleContext {
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Legacy secondary key, used only to perturb bucketing for pre-context
    /// data. Not addressable as an attribute.
    pub fn secondary(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    /// Resolve an attribute by name or by slash-delimited reference path.
    ///
    /// Plain names address the built-ins `key`, `kind`, `name` and
    /// `anonymous`, then the custom attribute map. A leading `/` starts a
    /// reference path (`/address/city`) that descends into object attributes;
    /// `~0` and `~1` escape `~` and `/` in path components.
    pub fn attribute(&self, reference: &str) -> Option<Value> {
        if reference.is_empty() {
            return None;
        }
        let Some(path) = reference.strip_prefix('/') else {
            return self.top_level_attribute(reference);
        };
        let mut components = path.split('/').map(unescape_path_component);
        let mut value = self.top_level_attribute(&components.next()?)?;
        for component in components {
            value = value.as_object()?.get(&component)?.clone();
        }
        Some(value)
    }

    fn top_level_attribute(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(Value::String(self.key.clone())),
            "kind" => Some(Value::String(self.kind.as_str().to_owned())),
            "name" => self.name.clone().map(Value::String),
            "anonymous" => Some(Value::Bool(self.anonymous)),
            _ => self.attributes.get(name).cloned(),
        }
    }
}

fn unescape_path_component(component: &str) -> String {
    component.replace("~1", "/").replace("~0", "~")
}

/// The subject of a flag evaluation: a single context or a multi-context.
///
/// Construct with [`ContextBuilder`] or [`MultiContextBuilder`]. Contexts are
/// immutable once built and can be shared freely across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    /// A context of one kind.
    Single(SingleContext),
    /// A combination of individual contexts of distinct kinds.
    Multi(Vec<SingleContext>),
}

impl Context {
    /// Get the individual context of the given kind, `None` meaning the
    /// default `"user"` kind.
    pub fn individual(&self, kind: Option<&Kind>) -> Option<&SingleContext> {
        match self {
            Context::Single(single) => {
                let matches = match kind {
                    Some(kind) => *kind == single.kind,
                    None => single.kind.is_user(),
                };
                matches.then_some(single)
            }
            Context::Multi(parts) => {
                let wanted = kind.map(Kind::as_str).unwrap_or("user");
                parts.iter().find(|part| part.kind.as_str() == wanted)
            }
        }
    }

    /// Key of the individual context of the given kind, if present.
    pub fn key(&self, kind: Option<&Kind>) -> Option<&str> {
        self.individual(kind).map(SingleContext::key)
    }

    /// Key of every individual context, used for logging.
    pub fn canonical_key(&self) -> String {
        match self {
            Context::Single(single) => single.key.clone(),
            Context::Multi(parts) => {
                let mut keys: Vec<&str> = parts.iter().map(|p| p.key.as_str()).collect();
                keys.sort_unstable();
                keys.join(":")
            }
        }
    }
}

/// Builder for a single-kind [`Context`].
///
/// ```
/// # use flagcore::ContextBuilder;
/// let context = ContextBuilder::new("user-key")
///     .kind("user")
///     .set_attribute("country", "de".into())
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    kind: Kind,
    key: String,
    name: Option<String>,
    anonymous: bool,
    secondary: Option<String>,
    attributes: HashMap<String, Value>,
}

impl ContextBuilder {
    pub fn new(key: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            kind: Kind::user(),
            key: key.into(),
            name: None,
            anonymous: false,
            secondary: None,
            attributes: HashMap::new(),
        }
    }

    pub fn kind(mut self, kind: impl Into<Kind>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }

    pub fn secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn set_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn build(self) -> Result<Context, ContextError> {
        Ok(Context::Single(self.build_single()?))
    }

    fn build_single(self) -> Result<SingleContext, ContextError> {
        self.kind.validate()?;
        if self.key.is_empty() {
            return Err(ContextError::EmptyKey);
        }
        Ok(SingleContext {
            kind: self.kind,
            key: self.key,
            name: self.name,
            anonymous: self.anonymous,
            secondary: self.secondary,
            attributes: self.attributes,
        })
    }
}

/// Builder for a multi-kind [`Context`].
#[derive(Debug, Clone, Default)]
pub struct MultiContextBuilder {
    parts: Vec<ContextBuilder>,
}

impl MultiContextBuilder {
    pub fn new() -> MultiContextBuilder {
        MultiContextBuilder::default()
    }

    pub fn add(mut self, context: ContextBuilder) -> Self {
        self.parts.push(context);
        self
    }

    /// Build the multi-context. Kinds must be unique; a multi-context of one
    /// part collapses to a single context.
    pub fn build(self) -> Result<Context, ContextError> {
        if self.parts.is_empty() {
            return Err(ContextError::EmptyMultiContext);
        }
        let mut parts = Vec::with_capacity(self.parts.len());
        for builder in self.parts {
            let single = builder.build_single()?;
            if parts.iter().any(|p: &SingleContext| p.kind == single.kind) {
                return Err(ContextError::DuplicateKind(single.kind.as_str().to_owned()));
            }
            parts.push(single);
        }
        if parts.len() == 1 {
            return Ok(Context::Single(parts.pop().unwrap()));
        }
        parts.sort_by(|a, b| a.kind.cmp(&b.kind));
        Ok(Context::Multi(parts))
    }
}
