use std::fmt::{self, Display, Formatter};

use super::painter::Painter;
use super::table::Table;

/// Titled key-value summary printed after a command finishes.
pub(crate) struct Report<'a> {
    painter: &'a Painter,
    title: String,
    rows: Vec<(&'static str, String)>,
}

impl<'a> Report<'a> {
    pub(crate) fn new(painter: &'a Painter, title: impl Into<String>) -> Self {
        Self {
            painter,
            title: title.into(),
            rows: Vec::new(),
        }
    }

    /// Adds a numeric row.
    pub(crate) fn count(mut self, field: &'static str, value: impl ToString) -> Self {
        let value = self.painter.count(value);
        self.rows.push((field, value));
        self
    }

    /// Adds a row rendered as-is.
    pub(crate) fn text(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.rows.push((field, value.into()));
        self
    }
}

impl Display for Report<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.painter.success("✓"), self.painter.heading(&self.title))?;
        let table = Table::key_value(self.painter, self.rows.clone());
        write!(f, "{table}")
    }
}
