//! Source-annotated rendering of race reports.
//!
//! When the file named by a race report can be read, both access sites are
//! shown as labels on the source text.

use std::path::Path;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::report::{AccessRecord, ErrorReport, Location};

/// Character offset of `line:column` (both 1-based) in `text`.
fn char_offset(text: &str, location: &Location) -> Option<usize> {
    let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
    let column = usize::try_from(location.column).ok()?.saturating_sub(1);
    let mut offset = 0;
    for (idx, content) in text.split_inclusive('\n').enumerate() {
        if idx == line {
            let width = content.trim_end_matches('\n').chars().count();
            return Some(offset + column.min(width));
        }
        offset += content.chars().count();
    }
    None
}

/// Offset of `record` in `text` when it lies in `file`.
fn site(file: &str, text: &str, record: &AccessRecord) -> Option<usize> {
    let location = record.location.as_ref()?;
    if location.file != file {
        return None;
    }
    char_offset(text, location)
}

/// Render `report` against `text`, the contents of the file it names.
/// Returns `None` for non-race reports or when no access maps into `text`.
pub fn render_race(report: &ErrorReport, text: &str, color: bool) -> Option<String> {
    let ErrorReport::Race {
        resource,
        first,
        second,
    } = report
    else {
        return None;
    };
    let file = second.location.as_ref()?.file.as_str();
    let sites: Vec<(usize, &AccessRecord, Color)> = [(first, Color::Cyan), (second, Color::Red)]
        .into_iter()
        .filter_map(|(record, c)| Some((site(file, text, record)?, record, c)))
        .collect();
    let offset = sites.last()?.0;

    let mut builder = Report::build(ReportKind::Error, file, offset)
        .with_config(Config::default().with_color(color))
        .with_message(format!(
            "potential {}-{} race on {resource}",
            first.access, second.access
        ));
    for (start, record, color) in sites {
        builder = builder.with_label(
            Label::new((file, start..start + 1))
                .with_message(format!("{} by entry point {}", record.access, record.entry_point))
                .with_color(color),
        );
    }

    let mut out = Vec::new();
    builder
        .finish()
        .write((file, Source::from(text.to_string())), &mut out)
        .ok()?;
    String::from_utf8(out).ok()
}

/// Render a race report against its source file if that file is readable.
pub fn render_race_from_disk(report: &ErrorReport, color: bool) -> Option<String> {
    let ErrorReport::Race { second, .. } = report else {
        return None;
    };
    let file = &second.location.as_ref()?.file;
    let text = std::fs::read_to_string(Path::new(file)).ok()?;
    render_race(report, &text, color)
}
