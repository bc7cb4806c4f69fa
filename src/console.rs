use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table,
};
use dialoguer::console::{style, Term};

/// Final state of a step's progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Success,
    IgnoredExit,
    Failure,
    Skipped,
}

/// The interactive console: one progress line per step, stage rules and debug panels.
///
/// Console write errors are ignored; the durable log is the record of the run.
#[derive(Clone)]
pub struct Console {
    term: Term,
    enabled: bool,
}

impl Console {
    pub fn stdout() -> Self {
        Self {
            term: Term::stdout(),
            enabled: true,
        }
    }

    /// A console that prints nothing.
    pub fn hidden() -> Self {
        Self {
            term: Term::stdout(),
            enabled: false,
        }
    }

    pub fn is_term(&self) -> bool {
        self.enabled && self.term.is_term()
    }

    /// Print the pending line. It is rewritten in place by [`finish`](Self::finish).
    pub fn pending(&self, description: &str) {
        if !self.is_term() {
            return;
        }
        let _ = self
            .term
            .write_str(&style(format!("[ ] {description}")).yellow().bold().to_string());
    }

    pub fn finish(&self, description: &str, mark: Mark) {
        if !self.enabled {
            return;
        }
        if self.term.is_term() {
            let _ = self.term.clear_line();
        }
        let line = match mark {
            Mark::Success => style(format!("[✓] {description}")).green(),
            Mark::IgnoredExit => style(format!("[✓] {description} (return code ignored)")).green(),
            Mark::Failure => style(format!("[✗] {description}")).red(),
            Mark::Skipped => style(format!("[-] {description} (skipped)")).dim(),
        };
        let _ = self.term.write_line(&line.to_string());
    }

    pub fn rule(&self, title: &str) {
        if !self.enabled {
            return;
        }
        let width = match self.term.size_checked() {
            Some((_, cols)) => cols as usize,
            None => 80,
        };
        let line = format!("{:─^width$}", format!(" {title} "));
        let _ = self.term.write_line(&style(line).green().to_string());
    }

    pub fn panel(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![Cell::new(title).add_attribute(Attribute::Bold)])
            .add_row(vec![Cell::new(body)]);
        let _ = self.term.write_line(&table.to_string());
    }

    pub fn line(&self, text: &str) {
        if self.enabled {
            let _ = self.term.write_line(text);
        }
    }

    pub fn warn(&self, text: &str) {
        if self.enabled {
            let _ = self
                .term
                .write_line(&style(text).yellow().bold().to_string());
        }
    }

    pub fn critical(&self, text: &str) {
        if self.enabled {
            let _ = self
                .term
                .write_line(&style(text).red().bold().reverse().to_string());
        }
    }

    /// A `label:.... value` line of the selection summary.
    pub fn field(&self, label: &str, value: &str) {
        if self.enabled {
            let label = format!("{label}:");
            let _ = self.term.write_line(&format!(
                "{}{}",
                style(format!("{label:.<20} ")).yellow(),
                style(value).green()
            ));
        }
    }
}
