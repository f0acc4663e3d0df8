//! Advisory diagnostics
//!
//! Conditions that do not stop composition but that the user should hear
//! about. Every diagnostic is recorded; it is also logged under the
//! `neutral_prompt` target when the request is verbose. Conditions that
//! recur on every sampling step are recorded once per request.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// Kind of advisory condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Backend weight for a condition differs from the leaf weight
    WeightMismatch,

    /// Perpendicular reconciliation against a zero delta
    ProjectionNotFound,

    /// Sampler cannot be patched
    UnsupportedSampler,

    /// Step fell back to the backend's own combination
    Fallback,
}

impl DiagnosticKind {
    /// Stable name for logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightMismatch => "weight_mismatch",
            Self::ProjectionNotFound => "projection_not_found",
            Self::UnsupportedSampler => "unsupported_sampler",
            Self::Fallback => "fallback",
        }
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// What happened
    pub kind: DiagnosticKind,
    /// Human-readable detail
    pub message: String,
}

/// Diagnostics collected over one request
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    verbose: bool,
    projection_warned: bool,
    reported: HashSet<(DiagnosticKind, usize)>,
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create empty collector
    #[inline]
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Record a diagnostic
    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        if self.verbose {
            tracing::warn!(target: "neutral_prompt", kind = %kind, "{message}");
        }
        self.records.push(Diagnostic { kind, message });
    }

    /// Record a diagnostic unless `(kind, key)` was already recorded
    pub fn report_once(&mut self, kind: DiagnosticKind, key: usize, message: impl Into<String>) {
        if self.reported.insert((kind, key)) {
            self.report(kind, message);
        }
    }

    /// Leaf weight differs from the weight the backend carries
    ///
    /// Reported once per condition index per request.
    pub fn weight_mismatch(&mut self, index: usize, expected: f32, actual: f32) {
        self.report_once(
            DiagnosticKind::WeightMismatch,
            index,
            format!(
                "unexpected weight for condition #{index}: expected {expected}, got {actual}; \
                 another hook may be rewriting the backend's combination"
            ),
        );
    }

    /// Step fell back to the backend's combination
    ///
    /// Reported once per request; later steps usually fail the same way.
    pub fn fallback(&mut self, error: impl Display) {
        self.report_once(
            DiagnosticKind::Fallback,
            0,
            format!("falling back to the backend's combination: {error}"),
        );
    }

    /// Copy sampler records raised before the request started
    pub(crate) fn carry_sampler_records(&mut self, previous: &Self) {
        let carried = previous
            .records
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnsupportedSampler)
            .cloned();
        self.records.extend(carried);
    }

    /// Zero delta met by a perpendicular child
    ///
    /// Reported at most once per request, and only on the first step.
    pub fn projection_not_found(&mut self, step: usize) {
        if step != 0 || self.projection_warned {
            return;
        }
        self.projection_warned = true;
        self.report(
            DiagnosticKind::ProjectionNotFound,
            "could not find a projection for one or more AND_PERP prompts; \
             they will not be made perpendicular",
        );
    }

    /// Everything recorded so far
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Number of records of one kind
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records.iter().filter(|d| d.kind == kind).count()
    }

    /// True when nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_reported_once_on_first_step() {
        let mut diagnostics = Diagnostics::new(false);
        diagnostics.projection_not_found(0);
        diagnostics.projection_not_found(0);
        diagnostics.projection_not_found(3);
        assert_eq!(diagnostics.count(DiagnosticKind::ProjectionNotFound), 1);
    }

    #[test]
    fn projection_not_reported_after_first_step() {
        let mut diagnostics = Diagnostics::new(true);
        diagnostics.projection_not_found(1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn quiet_diagnostics_are_still_recorded() {
        let mut diagnostics = Diagnostics::new(false);
        diagnostics.weight_mismatch(2, 1.0, 0.5);
        assert_eq!(diagnostics.records().len(), 1);
        assert_eq!(diagnostics.records()[0].kind, DiagnosticKind::WeightMismatch);
        assert!(diagnostics.records()[0].message.contains("#2"));
    }

    #[test]
    fn repeated_conditions_recorded_once_per_request() {
        let mut diagnostics = Diagnostics::new(false);
        for _ in 0..20 {
            diagnostics.weight_mismatch(0, 1.0, 0.5);
            diagnostics.weight_mismatch(1, 2.0, 0.5);
            diagnostics.fallback("batch mismatch");
        }
        assert_eq!(diagnostics.count(DiagnosticKind::WeightMismatch), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::Fallback), 1);
        assert_eq!(diagnostics.records().len(), 3);
    }

    #[test]
    fn only_sampler_records_carry_over() {
        let mut previous = Diagnostics::new(false);
        previous.report(DiagnosticKind::UnsupportedSampler, "sampler 'DDIM'");
        previous.fallback("leaf count");

        let mut next = Diagnostics::new(false);
        next.carry_sampler_records(&previous);
        assert_eq!(next.count(DiagnosticKind::UnsupportedSampler), 1);
        assert_eq!(next.count(DiagnosticKind::Fallback), 0);
    }
}
