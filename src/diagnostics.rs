//! Structured warnings and errors raised during a merge run
//!
//! The engine never prints. Every condition is recorded as a [`Diagnostic`]
//! and mirrored to `tracing`; the caller decides what becomes visible.

use std::collections::HashSet;
use std::fmt;

/// What the merge engine is currently doing, for diagnostic context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Many inputs into one output; conditions name the input when known
    #[default]
    Merging,
    /// Each input rewritten on its own; conditions always name the input
    Batching,
    /// One input split into many outputs; conditions name the output
    Exploding,
}

/// Explicit context threaded through a merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub mode: Mode,
    /// Name of the input currently being processed
    pub input_name: Option<String>,
    /// Name of the output being produced
    pub output_name: Option<String>,
}

impl MergeContext {
    pub fn new(output_name: impl Into<String>) -> Self {
        Self { output_name: Some(output_name.into()), ..Default::default() }
    }

    fn describe(&self) -> Option<String> {
        let input = self.input_name.as_ref();
        let output = self.output_name.as_ref();
        match self.mode {
            Mode::Merging => input.or(output).cloned(),
            Mode::Batching => Some(input.cloned().unwrap_or_else(|| "<stdin>".to_string())),
            Mode::Exploding => output.or(input).cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Too many colors for one global colormap
    LocalColormaps,
    /// Input large enough to force eager compression
    HugeStream,
    /// Frames want different background colors
    BackgroundConflict,
    /// A background color was requested but the first frame is transparent
    IrrelevantBackground,
    /// A crop rectangle does not fit the frames it applies to
    CropGeometry,
    /// A palette index override is past the end of its colormap
    ColorOutOfRange,
    /// A color override is not present in the colormap
    ColorNotInColormap,
}

impl DiagnosticKind {
    /// Advisories are reported once per run.
    pub fn is_advisory(self) -> bool {
        matches!(
            self,
            DiagnosticKind::LocalColormaps
                | DiagnosticKind::HugeStream
                | DiagnosticKind::BackgroundConflict
                | DiagnosticKind::IrrelevantBackground
        )
    }
}

/// A single recorded condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub context: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.context {
            Some(ctx) => write!(f, "{}: {}: {}", ctx, level, self.message),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

/// Collected diagnostics for one merge run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    reported: HashSet<DiagnosticKind>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, ctx: &MergeContext, kind: DiagnosticKind, message: impl Into<String>) {
        self.record(ctx, Severity::Warning, kind, message.into());
    }

    pub fn error(&mut self, ctx: &MergeContext, kind: DiagnosticKind, message: impl Into<String>) {
        self.record(ctx, Severity::Error, kind, message.into());
    }

    fn record(&mut self, ctx: &MergeContext, severity: Severity, kind: DiagnosticKind, message: String) {
        if kind.is_advisory() && !self.reported.insert(kind) {
            return;
        }
        let context = ctx.describe();
        match severity {
            Severity::Warning => {
                tracing::warn!(kind = ?kind, context = context.as_deref(), "{}", message)
            }
            Severity::Error => {
                tracing::error!(kind = ?kind, context = context.as_deref(), "{}", message)
            }
        }
        self.entries.push(Diagnostic { severity, kind, message, context });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.entries.iter().any(|d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisories_reported_once() {
        let ctx = MergeContext::default();
        let mut diags = Diagnostics::new();
        diags.warn(&ctx, DiagnosticKind::LocalColormaps, "too many colors");
        diags.warn(&ctx, DiagnosticKind::LocalColormaps, "too many colors");
        assert_eq!(diags.count(DiagnosticKind::LocalColormaps), 1);
    }

    #[test]
    fn test_errors_always_recorded() {
        let ctx = MergeContext::default();
        let mut diags = Diagnostics::new();
        diags.error(&ctx, DiagnosticKind::CropGeometry, "bad crop");
        diags.error(&ctx, DiagnosticKind::CropGeometry, "bad crop");
        assert_eq!(diags.count(DiagnosticKind::CropGeometry), 2);
        assert_eq!(diags.error_count(), 2);
    }

    #[test]
    fn test_display_includes_context() {
        let mut ctx = MergeContext::new("out.gif");
        let mut diags = Diagnostics::new();
        diags.warn(&ctx, DiagnosticKind::HugeStream, "huge GIF");
        ctx.input_name = Some("in.gif".to_string());
        diags.error(&ctx, DiagnosticKind::ColorOutOfRange, "transparent color out of range");
        let lines: Vec<String> = diags.entries().iter().map(|d| d.to_string()).collect();
        assert_eq!(lines[0], "out.gif: warning: huge GIF");
        assert_eq!(lines[1], "in.gif: error: transparent color out of range");
    }

    #[test]
    fn test_context_follows_mode() {
        let mut ctx = MergeContext::new("out.gif");
        ctx.input_name = Some("in.gif".to_string());
        assert_eq!(ctx.describe().as_deref(), Some("in.gif"));

        ctx.mode = Mode::Exploding;
        assert_eq!(ctx.describe().as_deref(), Some("out.gif"));

        ctx.mode = Mode::Batching;
        ctx.input_name = None;
        assert_eq!(ctx.describe().as_deref(), Some("<stdin>"));
    }
}
