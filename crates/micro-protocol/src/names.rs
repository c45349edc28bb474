//! Identifier rules for `service/logic/function` segments.
//!
//! Names declared on disk may carry one visibility modifier in front of the
//! base name (`_` private, `$` restricted). Segments supplied at call time
//! never may: a caller cannot address `_helper` even by guessing it.

use std::fmt;

/// Maximum length of a base name, modifier excluded.
pub const MAX_NAME_LEN: usize = 50;

const PRIVATE_MODIFIER: char = '_';
const RESTRICTED_MODIFIER: char = '$';

/// Visibility derived from a declared name's modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// No modifier.
    #[default]
    Public,
    /// `$`: callable only with the configured restriction token.
    Restricted,
    /// `_`: never registered.
    Private,
}

impl Visibility {
    fn from_modifier(c: char) -> Option<Self> {
        match c {
            PRIVATE_MODIFIER => Some(Self::Private),
            RESTRICTED_MODIFIER => Some(Self::Restricted),
            _ => None,
        }
    }

    /// The modifier character for this visibility, if any.
    pub fn modifier(&self) -> Option<char> {
        match self {
            Self::Public => None,
            Self::Restricted => Some(RESTRICTED_MODIFIER),
            Self::Private => Some(PRIVATE_MODIFIER),
        }
    }
}

/// A name as declared on disk or in a module's exports, split into its
/// visibility and base name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaredName {
    visibility: Visibility,
    name: String,
}

impl DeclaredName {
    /// Parse a declared name. Returns `None` when the base name breaks the
    /// charset/length rule or more than one modifier is present.
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let (visibility, base) = match chars.next().and_then(Visibility::from_modifier) {
            Some(visibility) => (visibility, chars.as_str()),
            None => (Visibility::Public, text),
        };

        if !is_valid_segment(base) {
            return None;
        }

        Some(Self {
            visibility,
            name: base.to_string(),
        })
    }

    /// Public constructor for names that are already known to be valid.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            visibility: Visibility::Public,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    pub fn is_restricted(&self) -> bool {
        self.visibility == Visibility::Restricted
    }
}

impl fmt::Display for DeclaredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(modifier) = self.visibility.modifier() {
            write!(f, "{modifier}")?;
        }
        f.write_str(&self.name)
    }
}

/// Strict check for a runtime call segment: `^[A-Za-z0-9]\w{0,49}$`.
pub fn is_valid_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    match bytes.first() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    bytes.len() <= MAX_NAME_LEN
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

/// Parse an on-disk declared name. See [`DeclaredName::parse`].
pub fn parse_declared(text: &str) -> Option<DeclaredName> {
    DeclaredName::parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_accepts_plain_names() {
        for name in ["auth", "User2", "0day", "list_all", "a"] {
            assert!(is_valid_segment(name), "{name} should be valid");
        }
    }

    #[test]
    fn segment_rejects_modifiers_and_bad_chars() {
        for name in ["_auth", "$auth", "", "a/b", "a-b", "a b", "a.b", "é", "user$"] {
            assert!(!is_valid_segment(name), "{name} should be invalid");
        }
    }

    #[test]
    fn segment_length_bound() {
        let max = "a".repeat(MAX_NAME_LEN);
        let over = "a".repeat(MAX_NAME_LEN + 1);
        assert!(is_valid_segment(&max));
        assert!(!is_valid_segment(&over));
    }

    #[test]
    fn parse_splits_modifier() {
        let private = parse_declared("_helper").unwrap();
        assert_eq!(private.visibility(), Visibility::Private);
        assert_eq!(private.name(), "helper");

        let restricted = parse_declared("$admin").unwrap();
        assert!(restricted.is_restricted());
        assert_eq!(restricted.name(), "admin");

        let public = parse_declared("user").unwrap();
        assert_eq!(public.visibility(), Visibility::Public);
    }

    #[test]
    fn parse_rejects_double_modifier() {
        assert!(parse_declared("__helper").is_none());
        assert!(parse_declared("$_helper").is_none());
        assert!(parse_declared("_$helper").is_none());
        assert!(parse_declared("$$x").is_none());
        assert!(parse_declared("_").is_none());
        assert!(parse_declared("").is_none());
    }

    #[test]
    fn parse_allows_full_length_after_modifier() {
        let name = format!("_{}", "b".repeat(MAX_NAME_LEN));
        assert_eq!(parse_declared(&name).unwrap().name().len(), MAX_NAME_LEN);
        let over = format!("$${}", "b".repeat(MAX_NAME_LEN + 1));
        assert!(parse_declared(&over).is_none());
    }

    #[test]
    fn parse_round_trips_through_display() {
        for text in ["auth", "_auth", "$auth", "x_1", "$Z9"] {
            assert_eq!(parse_declared(text).unwrap().to_string(), text);
        }
    }
}
