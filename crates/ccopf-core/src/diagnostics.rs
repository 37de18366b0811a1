//! Non-fatal findings recorded during a model build.
//!
//! A configuration value that cannot be honoured (for instance an unknown
//! thermal-limit encoding) does not abort the build; it degrades to a fallback
//! and leaves an entry here, so callers can inspect what happened without
//! scraping logs.
//!
//! ```
//! use ccopf_core::diagnostics::Diagnostics;
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_entity("thermal", "unknown method 7", "thermal_const_method");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.summary(), "1 warning");
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The build continued with a fallback
    Warning,
    /// Part of the input was ignored
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key ("thermal", "settings", ...)
    pub category: String,
    pub message: String,
    /// Setting key or bus the issue refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.add(DiagnosticIssue {
            severity: Severity::Warning,
            category: category.to_string(),
            message: message.to_string(),
            entity: Some(entity.to_string()),
        });
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// One-line count, e.g. `"2 warnings"` or `"1 warning, 1 error"`.
    pub fn summary(&self) -> String {
        let plural = |n: usize, word: &str| format!("{} {}{}", n, word, if n == 1 { "" } else { "s" });
        match (self.count(Severity::Warning), self.count(Severity::Error)) {
            (0, 0) => "no issues".to_string(),
            (w, 0) => plural(w, "warning"),
            (0, e) => plural(e, "error"),
            (w, e) => format!("{}, {}", plural(w, "warning"), plural(e, "error")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "no issues");
        assert!(!diag.has_warnings());

        diag.add_warning_with_entity("thermal", "a", "thermal_const_method");
        diag.add_warning_with_entity("settings", "b", "loadfac");
        diag.add(DiagnosticIssue {
            severity: Severity::Error,
            category: "settings".into(),
            message: "c".into(),
            entity: None,
        });

        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.summary(), "2 warnings, 1 error");
    }

    #[test]
    fn test_display_names_entity() {
        let mut diag = Diagnostics::new();
        diag.add_warning_with_entity("thermal", "unknown method 9", "thermal_const_method");
        assert_eq!(
            diag.issues[0].to_string(),
            "[warning:thermal] unknown method 9 (thermal_const_method)"
        );
    }
}
