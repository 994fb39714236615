use owo_colors::{OwoColorize, Style as OwoStyle};

/// Applies colour to terminal text when stdout is interactive.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    /// Counts and sizes; rendered bold so they stand out from field names.
    pub(crate) fn count(&self, value: impl ToString) -> String {
        self.paint(&value.to_string(), OwoStyle::new().bold())
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn apply(painter: &Painter, style: &str, text: &str) -> String {
        match style {
            "heading" => painter.heading(text),
            "success" => painter.success(text),
            "warning" => painter.warning(text),
            "muted" => painter.muted(text),
            "count" => painter.count(text),
            other => panic!("unknown style: {other}"),
        }
    }

    #[rstest]
    #[case::heading("heading")]
    #[case::success("success")]
    #[case::warning("warning")]
    #[case::muted("muted")]
    #[case::count("count")]
    fn plain_painter_leaves_text_alone(#[case] style: &str) {
        let painter = Painter::new(false);
        assert_eq!("960", apply(&painter, style, "960"));
    }

    #[rstest]
    #[case::heading("heading")]
    #[case::warning("warning")]
    #[case::count("count")]
    fn colour_painter_wraps_text_in_escapes(#[case] style: &str) {
        let styled = apply(&Painter::new(true), style, "960");
        assert_ne!("960", styled);
        assert!(styled.contains("960"));
    }
}
