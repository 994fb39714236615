mod painter;
mod report;
mod table;

pub(crate) use self::painter::Painter;
pub(crate) use self::report::Report;
