//! Plain-text digest.

use std::fmt::Write;

use super::View;

pub fn render(view: &View<'_>) -> String {
    let mut out = String::new();
    let _ = write_text(&mut out, view);
    out
}

fn write_text(out: &mut String, view: &View<'_>) -> std::fmt::Result {
    let header = view.header;
    writeln!(out, "{}", header.title)?;
    let keywords = if header.keywords.is_empty() {
        "any".to_string()
    } else {
        header.keywords.terms.join(", ")
    };
    writeln!(
        out,
        "Period: {} | Found: {} | Keywords: {}",
        view.period(),
        view.total,
        keywords
    )?;

    let incomplete: Vec<_> = view.incomplete_sources().collect();
    if !incomplete.is_empty() {
        writeln!(out, "\nIncomplete sources:")?;
        for s in incomplete {
            writeln!(
                out,
                "- {} ({}): {}",
                s.label,
                s.status.label(),
                s.status.reason().unwrap_or_default()
            )?;
        }
    }

    for entry in view.entries {
        writeln!(out)?;
        writeln!(out, "# {}", entry.heading)?;
        writeln!(out, "Source: {}", entry.item.source_id)?;
        writeln!(out, "Date:   {}", entry.date)?;
        if let Some(link) = entry.item.url.as_deref() {
            writeln!(out, "Link:   {link}")?;
        }
        for p in &entry.paragraphs {
            writeln!(out)?;
            for line in p.lines() {
                writeln!(out, "    {line}")?;
            }
        }
    }

    if let Some(notice) = view.omitted_notice() {
        writeln!(out, "\n[{notice}]")?;
    }
    Ok(())
}
