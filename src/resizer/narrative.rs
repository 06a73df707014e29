use tracing::{error, info};

/// Human readable account of one resize run
///
/// Each line is logged as it is recorded. The joined text is what gets
/// published once the run is over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Narrative {
    lines: Vec<String>,
}

impl Narrative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.lines.push(line);
    }

    pub fn failure(&mut self, line: impl Into<String>) {
        let line = line.into();
        error!("{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}
