//! Template classification
//!
//! One pass over a template returns every violation found. The format gate
//! runs first; an obsolete or unsupported document is not inspected further
//! because its layout cannot be trusted. The remaining rules all run and
//! their findings are concatenated in rule order.

use std::fmt;
use tracing::debug;

use super::schema::{self, BaselineSchema};
use super::{AuthMethod, Template, CURRENT_FORMAT_VERSION};
use crate::error::{ErrorKind, Result};
use crate::version::Version;

/// A single reason a template cannot be used as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateViolation {
    /// Older major format; must be recreated, never patched
    ObsoleteFormat { found: String, current: Version },

    /// Written by a newer major format than this release understands
    UnsupportedFormat { found: String, current: Version },

    MissingBaseKeys { keys: Vec<String> },

    InvalidConstrainedValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    AuthMethodInconsistent {
        declared: Option<AuthMethod>,
        extraneous: Vec<String>,
        detail: String,
    },
}

impl TemplateViolation {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TemplateViolation::ObsoleteFormat { .. } => ErrorKind::ObsoleteFormat,
            TemplateViolation::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            TemplateViolation::MissingBaseKeys { .. } => ErrorKind::MissingBaseKeys,
            TemplateViolation::InvalidConstrainedValue { .. } => {
                ErrorKind::InvalidConstrainedValue
            }
            TemplateViolation::AuthMethodInconsistent { .. } => ErrorKind::AuthMethodInconsistent,
        }
    }

    /// Whether an interactive flow could resolve this by asking for values
    pub fn is_fixable(&self) -> bool {
        matches!(
            self,
            TemplateViolation::MissingBaseKeys { .. }
                | TemplateViolation::InvalidConstrainedValue { .. }
        )
    }
}

impl fmt::Display for TemplateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateViolation::ObsoleteFormat { found, current } => write!(
                f,
                "template format '{found}' is obsolete (current is {current}); recreate the template"
            ),
            TemplateViolation::UnsupportedFormat { found, current } => write!(
                f,
                "template format '{found}' is newer than this release supports ({current}); upgrade berth"
            ),
            TemplateViolation::MissingBaseKeys { keys } => {
                write!(f, "missing required keys: {}", keys.join(", "))
            }
            TemplateViolation::InvalidConstrainedValue {
                field,
                value,
                allowed,
            } => write!(
                f,
                "{field}='{value}' is not one of: {}",
                allowed.join(", ")
            ),
            TemplateViolation::AuthMethodInconsistent { detail, .. } => {
                write!(f, "authentication is inconsistent: {detail}")
            }
        }
    }
}

/// A template that failed classification, with every violation found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRejected {
    violations: Vec<TemplateViolation>,
}

impl TemplateRejected {
    pub fn violations(&self) -> &[TemplateViolation] {
        &self.violations
    }

    /// Kind of the first violation, used as the error's discriminant
    pub fn primary_kind(&self) -> ErrorKind {
        self.violations
            .first()
            .map(TemplateViolation::kind)
            .unwrap_or(ErrorKind::Parse)
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.violations.iter().any(|v| v.kind() == kind)
    }
}

impl fmt::Display for TemplateRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template rejected ({} violation", self.violations.len())?;
        if self.violations.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str("):")?;
        for violation in &self.violations {
            write!(f, "\n  - [{}] {violation}", violation.kind())?;
        }
        Ok(())
    }
}

impl std::error::Error for TemplateRejected {}

/// A template that passed every rule
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTemplate {
    template: Template,
    format_version: Version,
}

impl ValidatedTemplate {
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn format_version(&self) -> &Version {
        &self.format_version
    }

    pub fn env_contribution(&self) -> std::collections::BTreeMap<String, String> {
        self.template.env_contribution()
    }
}

/// A check applied to a template whose format is current
pub trait TemplateRule: Send + Sync {
    fn check(&self, template: &Template, schema: &BaselineSchema) -> Vec<TemplateViolation>;

    fn rule_id(&self) -> &'static str;
}

/// Required keys, honoring conditional requirements
pub struct BaseKeyRule;

impl TemplateRule for BaseKeyRule {
    fn check(&self, template: &Template, schema: &BaselineSchema) -> Vec<TemplateViolation> {
        let keys = schema.missing_keys(|key| template.lookup(key));
        if keys.is_empty() {
            Vec::new()
        } else {
            vec![TemplateViolation::MissingBaseKeys { keys }]
        }
    }

    fn rule_id(&self) -> &'static str {
        "base-keys"
    }
}

pub struct ConstrainedValueRule;

impl TemplateRule for ConstrainedValueRule {
    fn check(&self, template: &Template, schema: &BaselineSchema) -> Vec<TemplateViolation> {
        schema
            .constrained
            .iter()
            .filter_map(|field| {
                let value = template.lookup(&field.key)?;
                (!field.allows(&value)).then(|| TemplateViolation::InvalidConstrainedValue {
                    field: field.key.clone(),
                    value,
                    allowed: field.allowed.clone(),
                })
            })
            .collect()
    }

    fn rule_id(&self) -> &'static str {
        "constrained-values"
    }
}

/// Exactly one credential shape, matching the declared method
pub struct AuthConsistencyRule;

impl AuthConsistencyRule {
    fn credential_field(method: AuthMethod) -> &'static str {
        match method {
            AuthMethod::Token => schema::TOKEN_FIELD,
            AuthMethod::Ssh => schema::SSH_KEY_FIELD,
        }
    }
}

impl TemplateRule for AuthConsistencyRule {
    fn check(&self, template: &Template, _schema: &BaselineSchema) -> Vec<TemplateViolation> {
        let mut violations = Vec::new();
        let declared = template.declared_auth_method();

        // An explicit GIT_AUTH_METHOD entry must agree with authMethod
        if let (Some(method), Some(written)) =
            (declared, template.explicit(schema::GIT_AUTH_METHOD))
        {
            if !written.trim().eq_ignore_ascii_case(method.as_str()) {
                violations.push(TemplateViolation::AuthMethodInconsistent {
                    declared,
                    extraneous: vec![schema::GIT_AUTH_METHOD.to_string()],
                    detail: format!(
                        "authMethod is '{method}' but {} is '{written}'",
                        schema::GIT_AUTH_METHOD
                    ),
                });
            }
        }

        let present: Vec<&'static str> = [schema::TOKEN_FIELD, schema::SSH_KEY_FIELD]
            .into_iter()
            .filter(|field| template.explicit(field).is_some())
            .collect();

        let extraneous: Vec<String> = match declared {
            Some(method) => present
                .iter()
                .filter(|field| **field != Self::credential_field(method))
                .map(|field| field.to_string())
                .collect(),
            None if present.len() > 1 => present.iter().map(|f| f.to_string()).collect(),
            None => Vec::new(),
        };

        if !extraneous.is_empty() {
            let detail = match declared {
                Some(method) => format!(
                    "authMethod is '{method}' but {} is also set; remove it",
                    extraneous.join(", ")
                ),
                None => format!(
                    "both {} are set and no authMethod is declared; keep only one",
                    extraneous.join(" and ")
                ),
            };
            violations.push(TemplateViolation::AuthMethodInconsistent {
                declared,
                extraneous,
                detail,
            });
        }

        violations
    }

    fn rule_id(&self) -> &'static str {
        "auth-consistency"
    }
}

/// Classifies templates against a baseline schema and a current format
pub struct TemplateValidator {
    schema: BaselineSchema,
    current_format: Version,
    rules: Vec<Box<dyn TemplateRule>>,
}

impl Default for TemplateValidator {
    fn default() -> Self {
        Self::new(BaselineSchema::current(), CURRENT_FORMAT_VERSION)
    }
}

impl TemplateValidator {
    pub fn new(schema: BaselineSchema, current_format: Version) -> Self {
        Self {
            schema,
            current_format,
            rules: vec![
                Box::new(BaseKeyRule),
                Box::new(ConstrainedValueRule),
                Box::new(AuthConsistencyRule),
            ],
        }
    }

    pub fn schema(&self) -> &BaselineSchema {
        &self.schema
    }

    pub fn current_format(&self) -> &Version {
        &self.current_format
    }

    /// Every violation in `template`, empty when it is usable
    ///
    /// Fails only when the format version string cannot be parsed.
    pub fn classify(&self, template: &Template) -> Result<Vec<TemplateViolation>> {
        if let Some(gate) = self.format_gate(template)? {
            debug!("Template format gate failed: {}", gate);
            return Ok(vec![gate]);
        }

        let mut violations = Vec::new();
        for rule in &self.rules {
            let found = rule.check(template, &self.schema);
            debug!("Rule {} found {} violation(s)", rule.rule_id(), found.len());
            violations.extend(found);
        }
        Ok(violations)
    }

    /// Accept `template` or reject it with the full violation list
    pub fn validate(&self, template: Template) -> Result<ValidatedTemplate> {
        let violations = self.classify(&template)?;
        if !violations.is_empty() {
            return Err(TemplateRejected { violations }.into());
        }

        let format_version = Version::parse(&template.format_version)?;
        Ok(ValidatedTemplate {
            template,
            format_version,
        })
    }

    fn format_gate(&self, template: &Template) -> Result<Option<TemplateViolation>> {
        let found = template.format_version.trim();
        if found.is_empty() {
            return Ok(Some(TemplateViolation::ObsoleteFormat {
                found: "(unversioned)".to_string(),
                current: self.current_format,
            }));
        }

        let version = Version::parse(found)?;
        let gate = if version.major < self.current_format.major {
            Some(TemplateViolation::ObsoleteFormat {
                found: found.to_string(),
                current: self.current_format,
            })
        } else if version.major > self.current_format.major {
            Some(TemplateViolation::UnsupportedFormat {
                found: found.to_string(),
                current: self.current_format,
            })
        } else {
            None
        };
        Ok(gate)
    }
}
