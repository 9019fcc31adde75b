//! Findings and the aggregated validation report.

use crate::domain::Column;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// NaN or infinite values left in a column.
    NonFinite,
    /// A shifted feature does not match its one-step-shifted re-derivation.
    LookaheadSuspected,
    /// A realized feature does not match its own formula.
    DerivationMismatch,
    /// Label proportions.
    ClassBalance,
    ClassImbalance,
    MissingTarget,
    FoldOverlap,
    EmptyFold,
    /// A scaler applied to a fold was fitted on that fold's test period.
    ScalerLeakage,
    /// Scaled evaluation values far outside the training range.
    ScaledRangeDrift,
    /// A scaler could not be fitted or inverted for an audit.
    ScalerUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub column: Option<Column>,
    pub fold: Option<usize>,
    pub instrument: Option<String>,
    /// Rows affected.
    pub count: usize,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            column: None,
            fold: None,
            instrument: None,
            count: 0,
            message: message.into(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.column = Some(column);
        self
    }

    pub fn fold(mut self, fold: usize) -> Self {
        self.fold = Some(fold);
        self
    }

    pub fn instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}", self.severity, self.kind)?;
        if let Some(fold) = self.fold {
            write!(f, " fold={fold}")?;
        }
        if let Some(id) = &self.instrument {
            write!(f, " instrument={id}")?;
        }
        if let Some(c) = self.column {
            write!(f, " column={c}")?;
        }
        if self.count > 0 {
            write!(f, " rows={}", self.count)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Every finding of one or more audits. Never mutates the audited data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.findings.extend(other.findings);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn has_fatal(&self) -> bool {
        self.count(Severity::Fatal) > 0
    }

    /// No warnings and no fatal findings. Info findings are allowed.
    pub fn is_clean(&self) -> bool {
        self.findings.iter().all(|f| f.severity == Severity::Info)
    }

    /// Plain-text rendering, most severe first.
    pub fn render(&self) -> String {
        let mut sorted: Vec<&Finding> = self.findings.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Validation: {} fatal, {} warning, {} info",
            self.count(Severity::Fatal),
            self.count(Severity::Warning),
            self.count(Severity::Info)
        );
        for f in sorted {
            let _ = writeln!(out, "  {f}");
        }
        if self.is_clean() {
            let _ = writeln!(out, "No leakage or data-quality issues detected.");
        }
        out
    }
}
