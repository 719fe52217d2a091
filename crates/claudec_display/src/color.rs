use std::env;
use std::io::IsTerminal;
use std::str::FromStr;

use colored::ColoredString;

/// How aggressively to emit ANSI color codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    Always,
    #[default]
    Auto,
    Never,
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" | "true" | "1" | "yes" => Ok(Self::Always),
            "auto" => Ok(Self::Auto),
            "never" | "false" | "0" | "no" => Ok(Self::Never),
            other => Err(format!("invalid color mode: {other}. expected: always, auto, never")),
        }
    }
}

/// Resolved color configuration: the requested [`ColorMode`] plus whether
/// stdout is actually a terminal, combined by [`Self::should_use_color`].
#[derive(Debug, Clone)]
pub struct ColorConfig {
    mode: ColorMode,
    is_terminal: bool,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorConfig {
    pub fn new() -> Self {
        Self { mode: Self::detect_mode(), is_terminal: std::io::stdout().is_terminal() }
    }

    pub fn with_mode(mode: ColorMode) -> Self {
        Self { mode, is_terminal: std::io::stdout().is_terminal() }
    }

    /// Priority: `NO_COLOR` (industry standard) > `CLAUDE_C_COLOR` > auto.
    fn detect_mode() -> ColorMode {
        if env::var("NO_COLOR").is_ok_and(|v| !v.is_empty()) {
            return ColorMode::Never;
        }
        if let Ok(raw) = env::var("CLAUDE_C_COLOR")
            && let Ok(mode) = ColorMode::from_str(&raw)
        {
            return mode;
        }
        ColorMode::Auto
    }

    pub fn should_use_color(&self) -> bool {
        match self.mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => self.is_terminal,
        }
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    /// Applies `color_fn` when colors are enabled, else returns `text`
    /// unchanged — the one seam every renderer in this crate goes through so
    /// `NO_COLOR`/non-terminal output degrades to plain ANSI-free text.
    pub fn colorize<F>(&self, text: &str, color_fn: F) -> String
    where
        F: FnOnce(&str) -> ColoredString,
    {
        if self.should_use_color() { color_fn(text).to_string() } else { text.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test]
    fn parses_all_recognized_spellings() {
        for (input, expected) in [
            ("always", ColorMode::Always),
            ("TRUE", ColorMode::Always),
            ("auto", ColorMode::Auto),
            ("never", ColorMode::Never),
            ("0", ColorMode::Never),
        ] {
            assert_eq!(ColorMode::from_str(input).unwrap(), expected, "input={input}");
        }
    }

    #[test]
    fn rejects_unknown_spelling() {
        assert!(ColorMode::from_str("rainbow").is_err());
    }

    #[test]
    fn always_mode_colorizes_regardless_of_terminal() {
        use colored::Colorize;
        let cfg = ColorConfig::with_mode(ColorMode::Always);
        assert!(cfg.colorize("x", |s| s.red()).contains("\x1b["));
    }

    #[test]
    fn never_mode_never_colorizes() {
        use colored::Colorize;
        let cfg = ColorConfig::with_mode(ColorMode::Never);
        assert_eq!(cfg.colorize("x", |s| s.red()), "x");
    }

    #[test]
    #[serial]
    fn no_color_env_forces_never() {
        unsafe {
            std::env::set_var("NO_COLOR", "1");
        }
        assert_eq!(ColorConfig::detect_mode(), ColorMode::Never);
        unsafe {
            std::env::remove_var("NO_COLOR");
        }
    }
}
