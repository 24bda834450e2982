//! Terminal output context
//!
//! Constructed once by the binary and passed to whatever prints, so colour
//! detection and `--quiet` are decided in one place. Errors and warnings go
//! to stderr and are never silenced.

use owo_colors::{OwoColorize, Style};

pub const ICON_CHECK: &str = "✅";
pub const ICON_CROSS: &str = "❌";
pub const ICON_WARN: &str = "⚠️";
pub const ICON_INFO: &str = "ℹ️";
pub const ICON_DATABASE: &str = "🗄️";

#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub label: Style,
}

impl Theme {
    /// Coloured when `console` reports colour support (tty, `CLICOLOR`,
    /// `NO_COLOR`), plain otherwise
    pub fn detect() -> Self {
        if ::console::colors_enabled() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().cyan().bold(),
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warn: Style::new().yellow().bold(),
            label: Style::new().white().dimmed(),
        }
    }

    pub fn plain() -> Self {
        Self {
            header: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warn: Style::new(),
            label: Style::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Console {
    theme: Theme,
    quiet: bool,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        Self { theme: Theme::detect(), quiet }
    }

    /// Uncoloured, non-quiet console (for tests)
    pub fn plain() -> Self {
        Self { theme: Theme::plain(), quiet: false }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn header(&self, icon: &str, text: &str) {
        if self.quiet {
            return;
        }
        println!("{} {}", icon, text.style(self.theme.header.clone()));
    }

    pub fn success(&self, label: &str) {
        if self.quiet {
            return;
        }
        println!("{} {}", ICON_CHECK, label.style(self.theme.success.clone()));
    }

    pub fn error(&self, label: &str) {
        eprintln!("{} {}", ICON_CROSS, label.style(self.theme.error.clone()));
    }

    pub fn warn(&self, label: &str) {
        eprintln!("{} {}", ICON_WARN, label.style(self.theme.warn.clone()));
    }

    pub fn info(&self, label: &str, value: &str) {
        if self.quiet {
            return;
        }
        println!("{} {}: {}", ICON_INFO, label.style(self.theme.label.clone()), value);
    }

    pub fn section(&self, title: &str) {
        if self.quiet {
            return;
        }
        println!();
        println!("━{}━", title.style(self.theme.header.clone()));
    }

    pub fn summary_row(&self, label: &str, value: &str) {
        if self.quiet {
            return;
        }
        println!("  {} {}", label.style(self.theme.label.clone()), value);
    }

    /// Print a pre-rendered block (tables, report bodies)
    pub fn block(&self, text: &str) {
        if self.quiet {
            return;
        }
        println!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colored_theme_emits_escapes() {
        let styled = format!("{}", "failed".style(Theme::colored().error));
        assert!(styled.contains('\x1b'));
        assert!(styled.contains("failed"));
    }

    #[test]
    fn test_quiet_flag() {
        assert!(Console::new(true).is_quiet());
        assert!(!Console::plain().is_quiet());
    }
}
