//! Source-excerpt rendering.
//!
//! Mirrors the shape of a classic one-paragraph-per-diagnostic compiler
//! output: a colored severity prefix, a `--> file:line:col` locator, a
//! gutter-numbered source line, and a caret underline beneath the span.
//! Multi-line spans don't extend the carets across lines — they just add a
//! trailing ellipsis, since there is no single line to underline.

use std::io::{self, Write};

use aria_span::{SrcManager, Span};

use crate::{Msg, MsgKind};

/// ANSI color codes; disabled entirely when [`RenderOptions::color`] is
/// false (piped output, `NO_COLOR`, non-TTY stderr).
mod color {
    pub const RED: &str = "\x1b[1;31m";
    pub const YELLOW: &str = "\x1b[1;33m";
    pub const CYAN: &str = "\x1b[1;36m";
    pub const BLUE: &str = "\x1b[1;34m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RESET: &str = "\x1b[0m";
}

#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { color: false }
    }
}

struct Paint<'a> {
    enabled: bool,
    code: &'a str,
}

impl<'a> Paint<'a> {
    fn write(&self, out: &mut dyn Write, text: &str) -> io::Result<()> {
        if self.enabled {
            write!(out, "{}{text}{}", self.code, color::RESET)
        } else {
            write!(out, "{text}")
        }
    }
}

fn severity_color(kind: MsgKind) -> &'static str {
    match kind {
        MsgKind::Error => color::RED,
        MsgKind::Warning => color::YELLOW,
        MsgKind::Note => color::CYAN,
    }
}

/// Renders `msg` to `out`. `blank_before`, when true, writes a blank
/// separator line first — callers pass `false` for the very first
/// diagnostic of a run and `true` for every one after.
pub fn render_msg(
    msg: &Msg,
    srcs: &SrcManager,
    out: &mut dyn Write,
    opts: RenderOptions,
    blank_before: bool,
) -> io::Result<()> {
    if blank_before {
        writeln!(out)?;
    }
    render_header(msg.kind, &msg.message, out, opts)?;
    if let Some(span) = msg.span {
        render_excerpt(span, srcs, out, opts)?;
    }
    for fat in &msg.fat {
        writeln!(out)?;
        render_header(MsgKind::Note, &fat.message, out, opts)?;
        render_excerpt(fat.span, srcs, out, opts)?;
    }
    for thin in &msg.thin {
        let prefix = Paint {
            enabled: opts.color,
            code: color::BOLD,
        };
        write!(out, "  = ")?;
        prefix.write(out, "note: ")?;
        writeln!(out, "{}", thin.message)?;
    }
    Ok(())
}

fn render_header(
    kind: MsgKind,
    message: &str,
    out: &mut dyn Write,
    opts: RenderOptions,
) -> io::Result<()> {
    let sev = Paint {
        enabled: opts.color,
        code: severity_color(kind),
    };
    sev.write(out, kind.label())?;
    let bold = Paint {
        enabled: opts.color,
        code: color::BOLD,
    };
    write!(out, ": ")?;
    bold.write(out, message)?;
    writeln!(out)
}

fn render_excerpt(
    span: Span,
    srcs: &SrcManager,
    out: &mut dyn Write,
    opts: RenderOptions,
) -> io::Result<()> {
    let file = srcs.get(span.file);
    let lc = file.line_col(span.start);
    let locator = Paint {
        enabled: opts.color,
        code: color::BLUE,
    };
    write!(out, "  ")?;
    locator.write(out, "-->")?;
    writeln!(out, " {}:{}:{}", file.path().display(), lc.line, lc.col)?;

    let gutter = format!("{}", lc.line);
    let pad = " ".repeat(gutter.len());
    writeln!(out, "{pad} |")?;

    let (line_start, line_end) = file.line_span(span.start);
    let line_text = &file.contents()[line_start as usize..line_end as usize];
    let gutter_paint = Paint {
        enabled: opts.color,
        code: color::BLUE,
    };
    write!(out, "{pad} ")?;
    gutter_paint.write(out, "|")?;
    writeln!(out, " {line_text}")?;

    let multiline = file.line_col(span.end.max(span.start)).line != lc.line;
    let caret_start = display_col(line_text, (span.start - line_start) as usize);
    let caret_end = if multiline {
        display_col(line_text, line_text.len())
    } else {
        display_col(line_text, (span.end - line_start) as usize)
    };
    let caret_len = caret_end.saturating_sub(caret_start).max(1);

    write!(out, "{pad} ")?;
    gutter_paint.write(out, "|")?;
    write!(out, " {}", " ".repeat(caret_start))?;
    let caret_color = Paint {
        enabled: opts.color,
        code: severity_color(MsgKind::Error),
    };
    caret_color.write(out, &"^".repeat(caret_len))?;
    if multiline {
        write!(out, " ···")?;
    }
    writeln!(out)
}

/// Expands tabs (four columns each) up to byte offset `upto` within `line`,
/// returning the display column.
fn display_col(line: &str, upto: usize) -> usize {
    let mut col = 0;
    for b in line.as_bytes()[..upto.min(line.len())].iter() {
        col += if *b == b'\t' { 4 } else { 1 };
    }
    col
}

/// Renders a trailing summary line, e.g. `2 errors, 1 warning emitted`.
pub fn render_summary(
    error_count: usize,
    warning_count: usize,
    out: &mut dyn Write,
    opts: RenderOptions,
) -> io::Result<()> {
    if error_count == 0 && warning_count == 0 {
        return Ok(());
    }
    writeln!(out)?;
    let mut parts = Vec::new();
    if error_count > 0 {
        parts.push(format!(
            "{error_count} error{}",
            if error_count == 1 { "" } else { "s" }
        ));
    }
    if warning_count > 0 {
        parts.push(format!(
            "{warning_count} warning{}",
            if warning_count == 1 { "" } else { "s" }
        ));
    }
    let sev = Paint {
        enabled: opts.color,
        code: if error_count > 0 {
            color::RED
        } else {
            color::YELLOW
        },
    };
    sev.write(out, &parts.join(", "))?;
    writeln!(out, " emitted")
}
