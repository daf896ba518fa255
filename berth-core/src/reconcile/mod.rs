//! Two-stage reconciliation of a project against baseline and template
//!
//! ```text
//!   PersistedEnvState ──► Stage 1: baseline schema ──► missing_baseline_keys
//!           │
//!   ProjectManifest ───► metadata check ──► metadata_present
//!           │                 │
//!           ▼                 ▼ (only when present and a template resolved)
//!   ValidatedTemplate ──► Stage 2: presence diff ──► missing_template_keys
//! ```
//!
//! Reconciliation only produces a report. Callers decide whether to fix
//! anything; `berth check` prints it and `berth sync` appends the missing
//! template keys.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::project::ProjectManifest;
use crate::template::{BaselineSchema, ValidatedTemplate};

mod env;

pub use env::{parse_dotenv, EnvFileSet, PersistedEnvState, ENV_FILES};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub missing_baseline_keys: BTreeSet<String>,
    /// Keys the template declares that the project lacks, with the value
    /// that would be written
    pub missing_template_keys: BTreeMap<String, String>,
    pub metadata_present: bool,
    pub template_located: bool,
}

impl ReconciliationReport {
    /// Nothing missing and the template could be compared
    pub fn is_clean(&self) -> bool {
        self.metadata_present
            && self.template_located
            && self.missing_baseline_keys.is_empty()
            && self.missing_template_keys.is_empty()
    }

    pub fn has_missing_keys(&self) -> bool {
        !self.missing_baseline_keys.is_empty() || !self.missing_template_keys.is_empty()
    }
}

/// Diff `env` against `schema` and, when the project's metadata identifies
/// its template and that template resolved, against `template`
///
/// Only presence is compared in Stage 2. A project value that differs from
/// the template's is a local customization and is not reported.
pub fn reconcile<S>(
    env: &S,
    metadata: Option<&ProjectManifest>,
    schema: &BaselineSchema,
    template: Option<&ValidatedTemplate>,
) -> ReconciliationReport
where
    S: PersistedEnvState + ?Sized,
{
    let missing_baseline_keys: BTreeSet<String> = schema
        .missing_keys(|key| env.value(key).map(str::to_string))
        .into_iter()
        .collect();
    debug!(
        "Baseline stage: {} missing key(s)",
        missing_baseline_keys.len()
    );

    let metadata_present = metadata.is_some_and(ProjectManifest::identifies_template);

    let mut report = ReconciliationReport {
        missing_baseline_keys,
        metadata_present,
        ..Default::default()
    };

    if !metadata_present {
        debug!("Project metadata missing; skipping template stage");
        return report;
    }
    let Some(template) = template else {
        debug!("No template resolved; skipping template stage");
        return report;
    };

    report.template_located = true;
    report.missing_template_keys = template
        .env_contribution()
        .into_iter()
        .filter(|(key, _)| !env.contains_key(key))
        .collect();
    debug!(
        "Template stage: {} missing key(s)",
        report.missing_template_keys.len()
    );

    report
}
