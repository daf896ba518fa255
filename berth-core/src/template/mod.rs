//! Developer template documents
//!
//! A template holds one developer's environment values (identity,
//! credentials, editor choice) and is versioned independently of any
//! catalog. It is read at the start of a load/validate/upgrade operation and
//! written back only by an explicit upgrade, in one atomic write.

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::error::{BerthError, Result};
use crate::version::Version;

pub mod schema;
mod validator;

pub use schema::BaselineSchema;
pub use validator::{TemplateRejected, TemplateValidator, TemplateViolation, ValidatedTemplate};

/// Template format this release reads and writes
pub const CURRENT_FORMAT_VERSION: Version = Version::new(2, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    Token,
    Ssh,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Token => "token",
            AuthMethod::Ssh => "ssh",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(AuthMethod::Token),
            "ssh" => Ok(AuthMethod::Ssh),
            other => Err(format!("unknown auth method '{other}' (expected token or ssh)")),
        }
    }
}

/// A developer template (template.yaml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Empty when the document predates format versioning
    #[serde(default, deserialize_with = "scalar_string")]
    pub format_version: String,

    #[serde(default)]
    pub base_keys: BTreeMap<String, Value>,

    /// Fields whose values come from a fixed domain (e.g. EDITOR)
    #[serde(default)]
    pub constrained_fields: BTreeMap<String, Value>,

    /// Kept as written; [`Template::declared_auth_method`] maps it onto
    /// [`AuthMethod`] and the validator classifies anything else
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_method: Option<String>,

    #[serde(default)]
    pub auth_fields: BTreeMap<String, Value>,
}

impl Template {
    /// Load a template from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BerthError::io(path, e))?;
        Self::from_yaml(&content).map_err(|reason| BerthError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        serde_yaml_ng::from_str(content).map_err(|e| format!("invalid template YAML: {e}"))
    }

    pub fn to_yaml(&self) -> std::result::Result<String, String> {
        serde_yaml_ng::to_string(self).map_err(|e| format!("failed to serialize template: {e}"))
    }

    /// Write the whole document or nothing
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_yaml().map_err(|reason| BerthError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| BerthError::io(parent, e))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| BerthError::io(parent, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| BerthError::io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| BerthError::io(path, e.error))?;
        Ok(())
    }

    /// Value of `key` as written in any section
    pub fn explicit(&self, key: &str) -> Option<String> {
        self.auth_fields
            .get(key)
            .or_else(|| self.constrained_fields.get(key))
            .or_else(|| self.base_keys.get(key))
            .map(render_value)
    }

    /// `authMethod`, when it names a known method in any casing
    pub fn declared_auth_method(&self) -> Option<AuthMethod> {
        self.auth_method.as_deref()?.parse().ok()
    }

    /// `authMethod` normalized when known, verbatim otherwise
    fn auth_method_value(&self) -> Option<String> {
        let raw = self.auth_method.as_deref()?;
        Some(match self.declared_auth_method() {
            Some(method) => method.to_string(),
            None => raw.trim().to_string(),
        })
    }

    /// Effective value of `key`; `GIT_AUTH_METHOD` follows `authMethod` when
    /// one is declared
    pub fn lookup(&self, key: &str) -> Option<String> {
        if key == schema::GIT_AUTH_METHOD {
            if let Some(method) = self.auth_method_value() {
                return Some(method);
            }
        }
        self.explicit(key)
    }

    /// Every key/value this template contributes to a project environment
    pub fn env_contribution(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for section in [&self.base_keys, &self.constrained_fields, &self.auth_fields] {
            for (key, value) in section {
                env.insert(key.clone(), render_value(value));
            }
        }
        if let Some(method) = self.auth_method_value() {
            env.insert(schema::GIT_AUTH_METHOD.to_string(), method);
        }
        env
    }

    /// Copy with the format version moved to `version`
    pub fn with_format_version(&self, version: &Version) -> Self {
        Self {
            format_version: version.to_string(),
            ..self.clone()
        }
    }
}

/// Accept `formatVersion: 2` or `2.0` written without quotes
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(render_value(&value))
}

fn optional_scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_null()).map(|v| render_value(&v)))
}

/// Render a YAML scalar the way it would appear in an env file
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Validate the template at `path` and, when it passes, rewrite it at the
/// validator's current format version. Returns whether the file changed.
///
/// Nothing is written when validation fails.
pub fn upgrade_in_place(path: &Path, validator: &TemplateValidator) -> Result<bool> {
    let template = Template::load(path)?;
    let validated = validator.validate(template)?;

    if validated.format_version() == validator.current_format() {
        return Ok(false);
    }

    validated
        .template()
        .with_format_version(validator.current_format())
        .save(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"
formatVersion: 2.0.0
baseKeys:
  GIT_USER_NAME: Ada Lovelace
  GIT_USER_EMAIL: ada@example.com
constrainedFields:
  EDITOR: vscode
  PROXY_ENABLED: false
authMethod: token
authFields:
  GIT_TOKEN: ghp_example
"#;

    #[test]
    fn test_parse_template() {
        let template = Template::from_yaml(TEMPLATE).unwrap();
        assert_eq!(template.format_version, "2.0.0");
        assert_eq!(template.declared_auth_method(), Some(AuthMethod::Token));
        assert_eq!(template.lookup("PROXY_ENABLED").as_deref(), Some("false"));
        assert_eq!(template.lookup("GIT_AUTH_METHOD").as_deref(), Some("token"));
        assert_eq!(template.explicit("GIT_AUTH_METHOD"), None);
    }

    #[test]
    fn test_env_contribution_merges_sections() {
        let template = Template::from_yaml(TEMPLATE).unwrap();
        let env = template.env_contribution();
        assert_eq!(
            env.keys().map(String::as_str).collect::<Vec<_>>(),
            vec![
                "EDITOR",
                "GIT_AUTH_METHOD",
                "GIT_TOKEN",
                "GIT_USER_EMAIL",
                "GIT_USER_NAME",
                "PROXY_ENABLED"
            ]
        );
        assert_eq!(env["GIT_USER_NAME"], "Ada Lovelace");
    }

    #[test]
    fn test_auth_method_is_kept_as_written() {
        let template = Template::from_yaml("formatVersion: 2.0.0\nauthMethod: password\n").unwrap();
        assert_eq!(template.auth_method.as_deref(), Some("password"));
        assert_eq!(template.declared_auth_method(), None);
        assert_eq!(template.lookup("GIT_AUTH_METHOD").as_deref(), Some("password"));

        let template = Template::from_yaml("formatVersion: 2.0.0\nauthMethod: SSH\n").unwrap();
        assert_eq!(template.declared_auth_method(), Some(AuthMethod::Ssh));
        assert_eq!(template.env_contribution()["GIT_AUTH_METHOD"], "ssh");
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/template.yaml");

        let template = Template::from_yaml(TEMPLATE).unwrap();
        template.save(&path).unwrap();

        assert_eq!(Template::load(&path).unwrap(), template);
    }

    #[test]
    fn test_upgrade_rewrites_format_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("template.yaml");
        std::fs::write(&path, TEMPLATE.replace("formatVersion: 2.0.0", "formatVersion: 2.0")).unwrap();

        let validator = TemplateValidator::new(BaselineSchema::current(), Version::new(2, 1, 0));
        assert!(upgrade_in_place(&path, &validator).unwrap());
        assert_eq!(Template::load(&path).unwrap().format_version, "2.1.0");

        assert!(!upgrade_in_place(&path, &validator).unwrap());
    }

    #[test]
    fn test_failed_upgrade_leaves_file_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("template.yaml");
        let original = TEMPLATE.replace("EDITOR: vscode", "EDITOR: notepad");
        std::fs::write(&path, &original).unwrap();

        let validator = TemplateValidator::new(BaselineSchema::current(), Version::new(2, 1, 0));
        assert!(upgrade_in_place(&path, &validator).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }
}
