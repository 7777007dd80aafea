//! Structured diagnostics.
//!
//! A [`Msg`] carries a severity, a primary message, an optional primary
//! [`Span`], zero or more "fat" sub-messages (their own message *and* span,
//! rendered with their own source excerpt) and zero or more "thin"
//! sub-messages (plain trailing notes with no excerpt). A [`DiagnosticEngine`]
//! accumulates `Msg`s for one compilation and renders them to a writer with
//! source context, matching the "one paragraph per diagnostic" shape every
//! stage of the compiler uses.

mod render;

use std::io::{self, Write};

use aria_span::{SrcManager, Span};
use is_terminal::IsTerminal;

pub use render::RenderOptions;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MsgKind {
    Error,
    Warning,
    Note,
}

impl MsgKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            MsgKind::Error => "error",
            MsgKind::Warning => "warning",
            MsgKind::Note => "note",
        }
    }
}

/// A sub-message with its own span, rendered with its own source excerpt.
#[derive(Clone, Debug)]
pub struct FatSubMsg {
    pub message: String,
    pub span: Span,
}

/// A plain trailing note with no source excerpt.
#[derive(Clone, Debug)]
pub struct ThinSubMsg {
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct Msg {
    pub kind: MsgKind,
    pub message: String,
    pub span: Option<Span>,
    pub fat: Vec<FatSubMsg>,
    pub thin: Vec<ThinSubMsg>,
}

impl Msg {
    #[must_use]
    pub fn new(kind: MsgKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            fat: Vec::new(),
            thin: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(MsgKind::Error, message, Some(span))
    }

    #[must_use]
    pub fn error_no_span(message: impl Into<String>) -> Self {
        Self::new(MsgKind::Error, message, None)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(MsgKind::Warning, message, Some(span))
    }

    #[must_use]
    pub fn note(message: impl Into<String>, span: Span) -> Self {
        Self::new(MsgKind::Note, message, Some(span))
    }

    #[must_use]
    pub fn with_fat(mut self, message: impl Into<String>, span: Span) -> Self {
        self.fat.push(FatSubMsg {
            message: message.into(),
            span,
        });
        self
    }

    #[must_use]
    pub fn with_thin(mut self, message: impl Into<String>) -> Self {
        self.thin.push(ThinSubMsg {
            message: message.into(),
        });
        self
    }
}

/// Accumulates diagnostics for one compilation stage (or the whole
/// compilation, if the caller shares one engine across stages).
///
/// Emitting an [`MsgKind::Error`] sets a sticky flag: once set, it is never
/// cleared. The driver uses [`DiagnosticEngine::has_errors`] as the "stage
/// barrier" described in the error-handling design — the next stage does
/// not run if this one reported any errors.
#[derive(Default)]
pub struct DiagnosticEngine {
    messages: Vec<Msg>,
    error_flag: bool,
    warning_count: u32,
}

impl DiagnosticEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, msg: Msg) {
        match msg.kind {
            MsgKind::Error => self.error_flag = true,
            MsgKind::Warning => self.warning_count += 1,
            MsgKind::Note => {}
        }
        self.messages.push(msg);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_flag
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.kind == MsgKind::Error)
            .count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warning_count as usize
    }

    #[must_use]
    pub fn messages(&self) -> &[Msg] {
        &self.messages
    }

    /// The span of the first diagnostic emitted, if any. Useful for tests
    /// that only care that *some* diagnostic fired at the expected site.
    #[must_use]
    pub fn first_span(&self) -> Option<Span> {
        self.messages.first().and_then(|m| m.span)
    }

    /// Merge another engine's messages into this one, preserving emission
    /// order. Used to combine per-file lexer/parser diagnostics into one
    /// engine for the whole compilation.
    pub fn extend(&mut self, other: DiagnosticEngine) {
        self.error_flag |= other.error_flag;
        self.warning_count += other.warning_count;
        self.messages.extend(other.messages);
    }

    /// Renders every accumulated message, in emission order, followed by a
    /// summary line.
    pub fn render(
        &self,
        srcs: &SrcManager,
        out: &mut dyn Write,
        opts: RenderOptions,
    ) -> io::Result<()> {
        for (i, msg) in self.messages.iter().enumerate() {
            render::render_msg(msg, srcs, out, opts, i > 0)?;
        }
        render::render_summary(self.error_count(), self.warning_count(), out, opts)
    }

    /// Renders to stderr, auto-detecting color from whether stderr is a
    /// TTY (colored output piped to a file or another process is noise).
    pub fn print(&self, srcs: &SrcManager) {
        let stderr = io::stderr();
        let opts = RenderOptions {
            color: stderr.is_terminal(),
        };
        let mut lock = stderr.lock();
        let _ = self.render(srcs, &mut lock, opts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_span::{SrcManager, Span};

    fn dummy_span(mgr: &mut SrcManager) -> Span {
        let id = mgr.add("t.aria".into(), "fn main() {}\n".to_string());
        Span::new(id, 3, 7)
    }

    #[test]
    fn emitting_error_sets_sticky_flag() {
        let mut mgr = SrcManager::new();
        let span = dummy_span(&mut mgr);
        let mut engine = DiagnosticEngine::new();
        assert!(!engine.has_errors());
        engine.emit(Msg::warning("shadowed", span));
        assert!(!engine.has_errors());
        engine.emit(Msg::error("undeclared symbol", span));
        assert!(engine.has_errors());
        engine.emit(Msg::note("see also", span));
        assert!(engine.has_errors());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 1);
    }

    #[test]
    fn first_span_is_observable() {
        let mut mgr = SrcManager::new();
        let span = dummy_span(&mut mgr);
        let mut engine = DiagnosticEngine::new();
        engine.emit(Msg::error("boom", span));
        assert_eq!(engine.first_span(), Some(span));
    }
}
