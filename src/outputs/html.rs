//! Standalone HTML digest page.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write;

use super::View;

const STYLE: &str = r#"    body { font-family: -apple-system, system-ui, Segoe UI, Roboto, Arial, sans-serif; margin: 0; background: #0b0f19; color: #e8ebf5; }
    .wrap { max-width: 980px; margin: 0 auto; padding: 32px 16px; }
    .card { background: #12182b; border: 1px solid #1e2742; border-radius: 16px; padding: 16px 18px; margin: 12px 0; box-shadow: 0 10px 30px rgba(0,0,0,.25); }
    .muted { color: #a9b2d6; font-size: 13px; }
    .title { font-size: 24px; margin: 0 0 8px 0; }
    .pill { display: inline-block; background: #1c2440; border: 1px solid #2b355a; color: #b5c3ff; padding: 2px 10px; border-radius: 999px; margin-right: 6px; font-size: 12px; }
    .post-title { font-size: 16px; margin: 0; line-height: 1.45; }
    .warn { border-color: #5a4a2b; }
    a { color: #8fb3ff; text-decoration: none; }
    a:hover { text-decoration: underline; }
    .header { margin-bottom: 16px; }
    .content p { margin: 0.6em 0; }"#;

pub fn render(view: &View<'_>) -> String {
    let mut out = String::new();
    // fmt::Write into a String does not fail.
    let _ = write_page(&mut out, view);
    out
}

fn write_page(out: &mut String, view: &View<'_>) -> std::fmt::Result {
    let header = view.header;
    writeln!(out, "<!doctype html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "  <meta charset=\"utf-8\">")?;
    writeln!(out, "  <title>{}</title>", text(&header.title))?;
    writeln!(
        out,
        "  <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">"
    )?;
    writeln!(out, "  <style>\n{STYLE}\n  </style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "  <div class=\"wrap\">")?;

    writeln!(out, "    <div class=\"header\">")?;
    writeln!(out, "      <h1 class=\"title\">{}</h1>", text(&header.title))?;
    write!(
        out,
        "      <div class=\"muted\">Period: {} • Found: {} • Keywords:",
        text(&view.period()),
        view.total
    )?;
    if header.keywords.is_empty() {
        write!(out, " <span class=\"pill\">any</span>")?;
    }
    for k in &header.keywords.terms {
        write!(out, " <span class=\"pill\">{}</span>", text(k))?;
    }
    writeln!(out, "</div>")?;
    writeln!(out, "    </div>")?;

    let incomplete: Vec<_> = view.incomplete_sources().collect();
    if !incomplete.is_empty() {
        writeln!(out, "    <div class=\"card warn\">")?;
        writeln!(out, "      <div class=\"muted\">Incomplete sources</div>")?;
        writeln!(out, "      <ul>")?;
        for s in incomplete {
            writeln!(
                out,
                "        <li>{} ({}): {}</li>",
                text(&s.label),
                s.status.label(),
                text(s.status.reason().unwrap_or_default())
            )?;
        }
        writeln!(out, "      </ul>")?;
        writeln!(out, "    </div>")?;
    }

    for entry in view.entries {
        writeln!(out, "    <div class=\"card\">")?;
        writeln!(
            out,
            "      <div class=\"muted\">{} • {}</div>",
            text(&entry.date),
            text(&entry.item.source_id)
        )?;
        match entry.link() {
            Some(link) => writeln!(
                out,
                "      <h3 class=\"post-title\"><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></h3>",
                attr(link),
                text(&entry.heading)
            )?,
            None => writeln!(out, "      <h3 class=\"post-title\">{}</h3>", text(&entry.heading))?,
        }
        if !entry.paragraphs.is_empty() {
            write!(out, "      <div class=\"content\">")?;
            for p in &entry.paragraphs {
                write!(out, "<p>{}</p>", text(p).replace('\n', "<br>"))?;
            }
            writeln!(out, "</div>")?;
        }
        writeln!(out, "    </div>")?;
    }

    if let Some(notice) = view.omitted_notice() {
        writeln!(out, "    <div class=\"card warn\"><div class=\"muted\">{}</div></div>", text(&notice))?;
    }

    writeln!(out, "  </div>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

/// Drop indentation and blank lines. Text content is never on its own
/// indented line, so nothing visible changes.
pub fn minify(html: &str) -> String {
    html.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
