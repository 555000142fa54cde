//! Atom types: the named, typed units of code a game is assembled from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;

/// Maximum size of an atom's code body, in bytes.
pub const MAX_ATOM_CODE_BYTES: usize = 2048;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid atom name pattern"))
}

/// Error returned when an atom name fails validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid atom name \"{0}\": must match [a-z][a-z0-9_]*")]
pub struct InvalidAtomName(pub String);

/// Validated atom name.
///
/// Unique within a game, immutable identity key. Implements `Ord` so
/// collections of atoms iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomName(String);

impl AtomName {
    /// Parse and validate an atom name.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidAtomName> {
        let s = s.into();
        if name_pattern().is_match(&s) {
            Ok(Self(s))
        } else {
            Err(InvalidAtomName(s))
        }
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct without validation (test graphs with known-good names).
    #[cfg(test)]
    pub fn raw(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AtomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AtomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of atom: drives entry-point selection during bundling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomType {
    /// Orchestrating logic; the bundle boot section is chosen among these.
    Core,
    /// Gameplay feature.
    Feature,
    /// Shared helper.
    Util,
}

impl AtomType {
    /// Parse atom type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "core" => Some(Self::Core),
            "feature" => Some(Self::Feature),
            "util" => Some(Self::Util),
            _ => None,
        }
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Feature => write!(f, "feature"),
            Self::Util => write!(f, "util"),
        }
    }
}

/// A named input or output of an atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Port name.
    pub name: String,
    /// Primitive type (e.g. "number", "string", "object").
    #[serde(rename = "type")]
    pub ty: String,
    /// Whether the port is optional.
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Port {
    /// Create a required port with no description.
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            optional: false,
            description: None,
        }
    }

    /// Render as `name: type` with a `?` suffix when optional.
    pub fn render(&self) -> String {
        if self.optional {
            format!("{}: {}?", self.name, self.ty)
        } else {
            format!("{}: {}", self.name, self.ty)
        }
    }
}

/// Render a call signature string from input and output ports.
///
/// Zero outputs render as `void`; a single output renders as its bare type;
/// multiple outputs render as a braced record.
pub fn format_signature(inputs: &[Port], outputs: &[Port]) -> String {
    let in_sig: Vec<String> = inputs.iter().map(Port::render).collect();
    let out_sig = match outputs {
        [] => "void".to_string(),
        [single] => single.ty.clone(),
        many => {
            let fields: Vec<String> = many.iter().map(Port::render).collect();
            format!("{{ {} }}", fields.join(", "))
        }
    };
    format!("({}) => {}", in_sig.join(", "), out_sig)
}

/// A stored atom as the store returns it: full record minus embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// Unique name within the game.
    pub name: AtomName,
    /// Atom kind.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// Code body (at most [`MAX_ATOM_CODE_BYTES`] bytes).
    pub code: String,
    /// Optional description.
    pub description: Option<String>,
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
    /// Monotonic version, bumped by the store on every upsert.
    pub version: i32,
}

/// Structure-only view of an atom: signature and dependencies, no code body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomSummary {
    /// Atom name.
    pub name: AtomName,
    /// Atom kind.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
    /// Names this atom depends on.
    pub depends_on: Vec<AtomName>,
}

/// Full atom record joined with its dependency list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomFull {
    /// Atom name.
    pub name: AtomName,
    /// Atom kind.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// Code body.
    pub code: String,
    /// Optional description.
    pub description: Option<String>,
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
    /// Monotonic version.
    pub version: i32,
    /// Names this atom depends on.
    pub depends_on: Vec<AtomName>,
}

impl AtomFull {
    /// Join a stored atom with its dependency list.
    pub fn from_atom(atom: Atom, depends_on: Vec<AtomName>) -> Self {
        Self {
            name: atom.name,
            atom_type: atom.atom_type,
            code: atom.code,
            description: atom.description,
            inputs: atom.inputs,
            outputs: atom.outputs,
            version: atom.version,
            depends_on,
        }
    }
}

/// A semantic search hit: full atom record annotated with similarity.
///
/// The version field is not meaningful for search results and is set to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched atom.
    #[serde(flatten)]
    pub atom: AtomFull,
    /// Cosine similarity to the query, in `[0, 1]`.
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_name_accepts_snake_case() {
        assert!(AtomName::parse("math_clamp").is_ok());
        assert!(AtomName::parse("p2").is_ok());
        assert!(AtomName::parse("a").is_ok());
    }

    #[test]
    fn test_atom_name_rejects_bad_patterns() {
        assert!(AtomName::parse("MathClamp").is_err());
        assert!(AtomName::parse("2fast").is_err());
        assert!(AtomName::parse("with-dash").is_err());
        assert!(AtomName::parse("").is_err());
        assert!(AtomName::parse("_lead").is_err());
    }

    #[test]
    fn test_format_signature_shapes() {
        let a = Port::new("a", "number");
        let mut b = Port::new("b", "string");
        b.optional = true;

        assert_eq!(format_signature(&[], &[]), "() => void");
        assert_eq!(
            format_signature(&[a.clone(), b], &[Port::new("out", "number")]),
            "(a: number, b: string?) => number"
        );
        assert_eq!(
            format_signature(&[a], &[Port::new("x", "number"), Port::new("y", "number")]),
            "(a: number) => { x: number, y: number }"
        );
    }

    #[test]
    fn test_atom_type_round_trip() {
        for ty in [AtomType::Core, AtomType::Feature, AtomType::Util] {
            assert_eq!(AtomType::from_str(&ty.to_string()), Some(ty));
        }
        assert_eq!(AtomType::from_str("plugin"), None);
    }
}
