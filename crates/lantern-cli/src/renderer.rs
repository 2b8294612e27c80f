//! Markdown rendering for the terminal using termimad, with a plain-text
//! mode for pipes and `--no-color`.

use std::io::{self, Write};

use anyhow::Result;
use termimad::{crossterm::style::Color, MadSkin};

/// Header lines are printed verbatim in this color so the `#` markers stay
/// visible; termimad styles everything else inline.
const HEADER_COLOR: &str = "\x1b[36m";
const FAILURE_COLOR: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub struct TerminalRenderer {
    rich_enabled: bool,
    skin: MadSkin,
}

impl TerminalRenderer {
    pub fn new(rich_enabled: bool) -> Self {
        let mut skin = MadSkin::default();
        skin.set_headers_fg(Color::Cyan);
        skin.bold.set_fg(Color::Yellow);
        skin.italic.set_fg(Color::Magenta);
        skin.inline_code.set_fg(Color::Green);
        skin.inline_code.set_bg(Color::AnsiValue(236));
        skin.code_block.set_bg(Color::AnsiValue(236));
        skin.quote_mark.set_fg(Color::Red);

        Self { rich_enabled, skin }
    }

    /// Prints `markdown` and flushes, so progress lines appear as events
    /// arrive.
    pub fn render(&self, markdown: &str) -> Result<()> {
        let mut stdout = io::stdout().lock();
        if self.rich_enabled {
            for line in markdown.lines() {
                if line.starts_with('#') {
                    writeln!(stdout, "{HEADER_COLOR}{line}{RESET}")?;
                } else {
                    writeln!(stdout, "{}", self.skin.inline(line))?;
                }
            }
        } else {
            write!(stdout, "{markdown}")?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Prints one progress line. Failed and skipped work is shown in red
    /// without markdown styling.
    pub fn render_progress(&self, line: &str, failed: bool) -> Result<()> {
        if self.rich_enabled && failed {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{FAILURE_COLOR}{line}{RESET}")?;
            stdout.flush()?;
            Ok(())
        } else {
            self.render(&format!("{line}\n"))
        }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_renderer() {
        let renderer = TerminalRenderer::new(false);
        assert!(!renderer.rich_enabled);
        assert!(renderer.render("# Sessions\n").is_ok());
    }

    #[test]
    fn test_plain_progress_line() {
        let renderer = TerminalRenderer::new(false);
        assert!(renderer
            .render_progress("**Objective 2**: failed (cancelled)", true)
            .is_ok());
    }

    #[test]
    fn test_default_is_rich() {
        assert!(TerminalRenderer::default().rich_enabled);
    }
}
