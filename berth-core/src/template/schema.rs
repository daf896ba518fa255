//! Baseline required-key schema
//!
//! The keys every project environment must define, some only when another
//! field holds a particular value, plus the fields whose values come from a
//! fixed domain. Shared by template validation and project reconciliation.

/// Declared authentication method
pub const GIT_AUTH_METHOD: &str = "GIT_AUTH_METHOD";

/// Token-shaped credential field
pub const TOKEN_FIELD: &str = "GIT_TOKEN";

/// SSH-shaped credential field
pub const SSH_KEY_FIELD: &str = "SSH_PRIVATE_KEY_PATH";

pub const EDITOR: &str = "EDITOR";
pub const PROXY_ENABLED: &str = "PROXY_ENABLED";
pub const PROXY_URL: &str = "PROXY_URL";

/// `field` must equal `equals` for a conditional key to be required
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub equals: String,
}

impl Condition {
    pub fn new(field: &str, equals: &str) -> Self {
        Self {
            field: field.to_string(),
            equals: equals.to_string(),
        }
    }

    fn holds<L>(&self, lookup: &L) -> bool
    where
        L: Fn(&str) -> Option<String>,
    {
        lookup(&self.field)
            .map(|v| v.trim().eq_ignore_ascii_case(&self.equals))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequirement {
    pub key: String,
    /// `None` means always required
    pub when: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstrainedField {
    pub key: String,
    pub allowed: Vec<String>,
}

impl ConstrainedField {
    pub fn allows(&self, value: &str) -> bool {
        self.allowed.iter().any(|a| a == value.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineSchema {
    pub required: Vec<KeyRequirement>,
    pub constrained: Vec<ConstrainedField>,
}

impl Default for BaselineSchema {
    fn default() -> Self {
        Self::current()
    }
}

impl BaselineSchema {
    /// The schema this release of berth enforces
    pub fn current() -> Self {
        let always = |key: &str| KeyRequirement {
            key: key.to_string(),
            when: None,
        };
        let when = |key: &str, field: &str, equals: &str| KeyRequirement {
            key: key.to_string(),
            when: Some(Condition::new(field, equals)),
        };
        let domain = |key: &str, allowed: &[&str]| ConstrainedField {
            key: key.to_string(),
            allowed: allowed.iter().map(|a| a.to_string()).collect(),
        };

        Self {
            required: vec![
                always("GIT_USER_NAME"),
                always("GIT_USER_EMAIL"),
                always(GIT_AUTH_METHOD),
                when(TOKEN_FIELD, GIT_AUTH_METHOD, "token"),
                when(SSH_KEY_FIELD, GIT_AUTH_METHOD, "ssh"),
                always(EDITOR),
                when(PROXY_URL, PROXY_ENABLED, "true"),
            ],
            constrained: vec![
                domain(GIT_AUTH_METHOD, &["token", "ssh"]),
                domain(EDITOR, &["vscode", "intellij", "cursor", "none"]),
                domain(PROXY_ENABLED, &["true", "false"]),
            ],
        }
    }

    /// Required keys absent under `lookup`, in schema order
    ///
    /// Conditional requirements are evaluated against the same lookup.
    pub fn missing_keys<L>(&self, lookup: L) -> Vec<String>
    where
        L: Fn(&str) -> Option<String>,
    {
        self.required
            .iter()
            .filter(|req| req.when.as_ref().map(|c| c.holds(&lookup)).unwrap_or(true))
            .filter(|req| lookup(&req.key).is_none())
            .map(|req| req.key.clone())
            .collect()
    }

    pub fn constraint(&self, key: &str) -> Option<&ConstrainedField> {
        self.constrained.iter().find(|c| c.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_conditional_keys_follow_auth_method() {
        let schema = BaselineSchema::current();

        let missing = schema.missing_keys(lookup(&[
            ("GIT_USER_NAME", "Ada"),
            ("GIT_USER_EMAIL", "ada@example.com"),
            (GIT_AUTH_METHOD, "ssh"),
            (EDITOR, "vscode"),
        ]));
        assert_eq!(missing, vec![SSH_KEY_FIELD.to_string()]);

        let missing = schema.missing_keys(lookup(&[
            ("GIT_USER_NAME", "Ada"),
            ("GIT_USER_EMAIL", "ada@example.com"),
            (GIT_AUTH_METHOD, "token"),
            (TOKEN_FIELD, "ghp_x"),
            (EDITOR, "vscode"),
            (PROXY_ENABLED, "TRUE"),
        ]));
        assert_eq!(missing, vec![PROXY_URL.to_string()]);
    }

    #[test]
    fn test_everything_missing_reports_unconditional_keys() {
        let missing = BaselineSchema::current().missing_keys(|_| None);
        assert_eq!(
            missing,
            vec!["GIT_USER_NAME", "GIT_USER_EMAIL", GIT_AUTH_METHOD, EDITOR]
        );
    }

    #[test]
    fn test_constraint_domains() {
        let schema = BaselineSchema::current();
        let editor = schema.constraint(EDITOR).unwrap();
        assert!(editor.allows("intellij"));
        assert!(!editor.allows("emacs"));
        assert!(schema.constraint("GIT_USER_NAME").is_none());
    }
}
