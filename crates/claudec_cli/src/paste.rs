//! Sanitization for text captured between bracketed-paste markers
//! (`ESC [ 200 ~` ... `ESC [ 201 ~`). Crossterm already strips the
//! markers themselves and hands us the raw content; everything here is
//! independently-togglable cleanup applied to that content.

#[derive(Debug, Clone, Copy)]
pub struct PasteSanitizeOptions {
    pub strip_c0_except_tab_lf: bool,
    pub normalize_newlines: bool,
    pub trim: bool,
    pub collapse_blank_lines: bool,
}

impl Default for PasteSanitizeOptions {
    fn default() -> Self {
        Self {
            strip_c0_except_tab_lf: true,
            normalize_newlines: true,
            trim: true,
            collapse_blank_lines: true,
        }
    }
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn strip_c0_except_tab_lf(s: &str) -> String {
    s.chars().filter(|&c| c == '\t' || c == '\n' || !c.is_control()).collect()
}

/// Collapses three or more consecutive newlines down to exactly two (one
/// blank line), leaving shorter runs untouched.
fn collapse_blank_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = 0u32;
    for c in s.chars() {
        if c == '\n' {
            run += 1;
            if run <= 2 {
                out.push(c);
            }
        } else {
            run = 0;
            out.push(c);
        }
    }
    out
}

/// Applies the requested cleanup steps in a fixed order: newline
/// normalization, then C0 stripping, then trimming, then blank-line
/// collapsing. Each step is independently toggled by `opts`.
pub fn sanitize(raw: &str, opts: &PasteSanitizeOptions) -> String {
    let mut out = raw.to_string();
    if opts.normalize_newlines {
        out = normalize_newlines(&out);
    }
    if opts.strip_c0_except_tab_lf {
        out = strip_c0_except_tab_lf(&out);
    }
    if opts.trim {
        out = out.trim().to_string();
    }
    if opts.collapse_blank_lines {
        out = collapse_blank_lines(&out);
    }
    out
}

/// Truncates to at most `max_chars` visible characters, appending an
/// ellipsis when truncation happened, for the inline paste preview.
pub fn preview(sanitized: &str, max_chars: usize) -> String {
    if sanitized.chars().count() <= max_chars {
        return sanitized.to_string();
    }
    let truncated: String = sanitized.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalizes_crlf_and_lone_cr() {
        let opts = PasteSanitizeOptions {
            strip_c0_except_tab_lf: false,
            trim: false,
            collapse_blank_lines: false,
            ..Default::default()
        };
        assert_eq!(sanitize("a\r\nb\rc", &opts), "a\nb\nc");
    }

    #[test]
    fn strips_c0_but_keeps_tab_and_newline() {
        let opts = PasteSanitizeOptions {
            normalize_newlines: false,
            trim: false,
            collapse_blank_lines: false,
            ..Default::default()
        };
        let raw = "a\u{0007}\tb\nc";
        assert_eq!(sanitize(raw, &opts), "a\tb\nc");
    }

    #[test]
    fn trims_leading_and_trailing_whitespace() {
        let opts = PasteSanitizeOptions {
            normalize_newlines: false,
            strip_c0_except_tab_lf: false,
            collapse_blank_lines: false,
            ..Default::default()
        };
        assert_eq!(sanitize("  hi  \n", &opts), "hi");
    }

    #[test]
    fn collapses_long_runs_of_blank_lines_to_two() {
        let opts = PasteSanitizeOptions {
            normalize_newlines: false,
            strip_c0_except_tab_lf: false,
            trim: false,
            ..Default::default()
        };
        assert_eq!(sanitize("a\n\n\n\n\nb", &opts), "a\n\nb");
    }

    #[test]
    fn all_options_compose() {
        let raw = "  a\r\n\r\n\r\n\r\nb\u{0001}  ";
        assert_eq!(sanitize(raw, &PasteSanitizeOptions::default()), "a\n\nb");
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        assert_eq!(preview("hello world", 5), "hello…");
        assert_eq!(preview("hi", 5), "hi");
    }
}
