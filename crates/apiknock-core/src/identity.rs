//! Identities and their credentials

use std::fmt;

use indexmap::IndexMap;

use crate::matrix::identity_name;

/// Opaque credential. Never printed: `Debug` and `Display` render `***`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for injection into an outbound request only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Identity name → credential, in binding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identities(IndexMap<String, Credential>);

impl Identities {
    /// Bind `tokens` to `user_1`, `user_2`, ... in order.
    #[must_use]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| (identity_name(i + 1), Credential::new(token)))
                .collect(),
        )
    }

    /// Bind (or rebind) `name` to `credential`.
    pub fn bind(&mut self, name: impl Into<String>, credential: Credential) {
        self.0.insert(name.into(), credential);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Credential> {
        self.0.get(name)
    }

    #[must_use]
    pub fn first(&self) -> Option<(&str, &Credential)> {
        self.0.first().map(|(name, c)| (name.as_str(), c))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_is_masked() {
        let c = Credential::new("s3cret-token");
        assert_eq!(format!("{c:?}"), "Credential(***)");
        assert_eq!(c.to_string(), "***");
        assert_eq!(c.expose(), "s3cret-token");
    }

    #[test]
    fn identities_debug_hides_secrets() {
        let ids = Identities::from_tokens(["alpha-secret", "beta-secret"]);
        let debug = format!("{ids:?}");
        assert!(!debug.contains("alpha-secret"));
        assert!(debug.contains("user_1"));
    }

    #[test]
    fn from_tokens_numbers_from_one() {
        let ids = Identities::from_tokens(["a", "b", "c"]);
        assert_eq!(ids.len(), 3);
        let names: Vec<&str> = ids.names().collect();
        assert_eq!(names, ["user_1", "user_2", "user_3"]);
        assert_eq!(ids.get("user_2").map(Credential::expose), Some("b"));
        assert!(ids.get("user_4").is_none());
    }

    #[test]
    fn bind_overrides() {
        let mut ids = Identities::from_tokens(["a"]);
        ids.bind("user_1", Credential::new("z"));
        ids.bind("admin", Credential::new("root"));
        assert_eq!(ids.get("user_1").map(Credential::expose), Some("z"));
        assert_eq!(ids.first().map(|(n, _)| n), Some("user_1"));
        assert_eq!(ids.len(), 2);
    }
}
