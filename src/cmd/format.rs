/*!
format.rs

Console styling for the interactive client.

  - StyleOptions::detect() -> colors/emoji unless NO_COLOR / NO_EMOJI is set
    or stdout is not a terminal; StyleOptions::plain() for captured output.
  - color(role, text, &StyleOptions)
  - emoji(tag, &StyleOptions)  (tags: error, wave)
  - box_header(title, subtitle_opt, &StyleOptions) for the startup banner

Helpers return strings; callers decide where to print them.
*/

use std::borrow::Cow;
use std::io::IsTerminal;

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
}

impl StyleOptions {
    pub fn detect() -> Self {
        let tty = std::io::stdout().is_terminal();
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(80);

        StyleOptions {
            use_color: tty && std::env::var_os("NO_COLOR").is_none(),
            use_emoji: tty && std::env::var_os("NO_EMOJI").is_none(),
            term_width: width,
        }
    }

    /// No escapes, no emoji.
    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width: 80,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Success,
    Error,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",
        Role::Secondary => "38;5;250",
        Role::Success => "38;5;82",
        Role::Error => "38;5;196",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "error" => "✖ ",
        "wave" => "👋 ",
        _ => "",
    }
}

/// Single-line boxed title with an optional dimmed subtitle.
pub fn box_header(
    title: impl AsRef<str>,
    subtitle: Option<impl AsRef<str>>,
    style: &StyleOptions,
) -> String {
    let mut inner = color(Role::Primary, title.as_ref(), style);
    if let Some(sub) = subtitle {
        inner.push_str("  ");
        inner.push_str(&color(Role::Secondary, sub.as_ref(), style));
    }

    let width = display_width(&inner).min(style.term_width.saturating_sub(4));
    let rule = "─".repeat(width + 2);
    let pad = " ".repeat(width.saturating_sub(display_width(&inner)));
    format!("┌{rule}┐\n│ {inner}{pad} │\n└{rule}┘")
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for t in chars.by_ref() {
                if t.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

pub fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}
