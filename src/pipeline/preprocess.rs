//! Pre-processing: turn text-like documents into the shape each target needs.
//!
//! Three consumers read document text:
//!
//! - the paginator (merge mode and the `pdf` convert target) wants plain
//!   text, see [`to_plain_text`];
//! - the `txt`, `md` and `html` convert targets each have their own
//!   renderer: [`to_txt`], [`to_markdown`], [`to_html`].
//!
//! Each rule is a small pure function (`&str → String`) so the renderers
//! stay a readable sequence of steps and every rule is testable on its own.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

/// Text dialects with dedicated handling. Anything else is `Plain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Plain,
    Markdown,
    Html,
    Json,
    Csv,
    Tsv,
}

impl TextKind {
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "md" => TextKind::Markdown,
            "html" | "htm" => TextKind::Html,
            "json" => TextKind::Json,
            "csv" => TextKind::Csv,
            "tsv" => TextKind::Tsv,
            _ => TextKind::Plain,
        }
    }

    fn delimiter(&self) -> Option<u8> {
        match self {
            TextKind::Csv => Some(b','),
            TextKind::Tsv => Some(b'\t'),
            _ => None,
        }
    }
}

/// Decode raw bytes as UTF-8 (lossy), drop a leading BOM and normalise line
/// endings to `\n`.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(&text);
    normalise_line_endings(text)
}

// ── Renderers ────────────────────────────────────────────────────────────

/// Plain text for the paginator.
///
/// Markdown loses its heading markers, emphasis and link targets; HTML is
/// reduced to the body's text content; JSON is pretty-printed; CSV/TSV rows
/// are joined with ` | `.
pub fn to_plain_text(content: &str, kind: TextKind) -> String {
    match kind {
        TextKind::Markdown => strip_markdown(content),
        TextKind::Html => html_body_text(content),
        TextKind::Json => pretty_json(content).unwrap_or_else(|| content.to_string()),
        TextKind::Csv | TextKind::Tsv => rows_as_text(content, kind),
        TextKind::Plain => content.to_string(),
    }
}

/// `txt` convert target. Markdown is kept verbatim.
pub fn to_txt(content: &str, kind: TextKind) -> String {
    match kind {
        TextKind::Markdown => content.to_string(),
        _ => to_plain_text(content, kind),
    }
}

/// `md` convert target.
pub fn to_markdown(content: &str, kind: TextKind) -> String {
    match kind {
        TextKind::Json => match pretty_json(content) {
            Some(pretty) => format!("```json\n{pretty}\n```"),
            None => format!("```\n{content}\n```"),
        },
        TextKind::Csv | TextKind::Tsv => {
            let rows = parse_delimited(content, kind);
            if rows.is_empty() {
                content.to_string()
            } else {
                markdown_table(&rows)
            }
        }
        _ => content.to_string(),
    }
}

/// `html` convert target: a standalone page titled `title`.
pub fn to_html(content: &str, kind: TextKind, title: &str) -> String {
    let title = escape_html(title);
    match kind {
        TextKind::Html => content.to_string(),
        TextKind::Markdown => html_page(
            &title,
            "body{font-family:system-ui;max-width:800px;margin:40px auto;padding:20px;line-height:1.6}",
            &markdown_to_html(content),
        ),
        TextKind::Json => {
            let pretty = pretty_json(content).unwrap_or_else(|| content.to_string());
            html_page(
                &title,
                "pre{background:#f5f5f5;padding:20px;overflow:auto}",
                &format!("<pre>{}</pre>", escape_html(&pretty)),
            )
        }
        TextKind::Csv | TextKind::Tsv => html_page(
            &title,
            "table{border-collapse:collapse;width:100%}th,td{text-align:left}th{background:#f0f0f0}",
            &html_table(&parse_delimited(content, kind)),
        ),
        TextKind::Plain => html_page(
            &title,
            "",
            &format!("<pre>{}</pre>", escape_html(content)),
        ),
    }
}

fn html_page(title: &str, style: &str, body: &str) -> String {
    let style = if style.is_empty() {
        String::new()
    } else {
        format!("\n<style>{style}</style>")
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>{title}</title>{style}\n</head>\n<body>{body}</body>\n</html>"
    )
}

// ── Rule: line endings ───────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Markdown stripping ─────────────────────────────────────────────

static RE_MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"#{1,6}\s").unwrap());
static RE_MD_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static RE_MD_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static RE_MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.+?)\]\(.+?\)").unwrap());

/// Remove heading markers, bold/italic asterisks and link targets.
///
/// Deliberately shallow: lists, code and tables pass through as typed.
pub fn strip_markdown(input: &str) -> String {
    let s = RE_MD_HEADING.replace_all(input, "");
    let s = RE_MD_BOLD.replace_all(&s, "$1");
    let s = RE_MD_ITALIC.replace_all(&s, "$1");
    RE_MD_LINK.replace_all(&s, "$1").into_owned()
}

fn markdown_to_html(input: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(input, options);
    let mut out = String::with_capacity(input.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

// ── Rule: HTML text extraction ───────────────────────────────────────────

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Text content of `<body>`, or of the whole document when there is none.
pub fn html_body_text(input: &str) -> String {
    let doc = Html::parse_document(input);
    match doc.select(&BODY).next() {
        Some(body) => body.text().collect(),
        None => doc.root_element().text().collect(),
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Rule: JSON pretty-printing ───────────────────────────────────────────

/// Two-space indented JSON, or `None` when `input` is not valid JSON.
pub fn pretty_json(input: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(e) => {
            debug!("Not valid JSON, keeping text as-is: {}", e);
            return None;
        }
    };
    serde_json::to_string_pretty(&value).ok()
}

// ── Rule: delimited tables ───────────────────────────────────────────────

/// Parse CSV/TSV. Quotes and doubled quotes are honoured, cells are
/// trimmed, ragged rows are allowed and blank rows are skipped.
pub fn parse_delimited(input: &str, kind: TextKind) -> Vec<Vec<String>> {
    let Some(delimiter) = kind.delimiter() else {
        return Vec::new();
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    reader
        .records()
        .filter_map(|result| match result {
            Ok(record) => Some(
                record
                    .iter()
                    .map(std::string::ToString::to_string)
                    .collect::<Vec<_>>(),
            ),
            Err(e) => {
                debug!("Skipping malformed delimited row: {}", e);
                None
            }
        })
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect()
}

fn rows_as_text(input: &str, kind: TextKind) -> String {
    parse_delimited(input, kind)
        .iter()
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn markdown_table(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push_str("| ");
        out.push_str(&row.join(" | "));
        out.push_str(" |\n");
        if i == 0 {
            out.push_str("| ");
            out.push_str(&vec!["---"; row.len()].join(" | "));
            out.push_str(" |\n");
        }
    }
    out
}

fn html_table(rows: &[Vec<String>]) -> String {
    let mut out = String::from("<table border='1' cellpadding='8' cellspacing='0'>");
    for (i, row) in rows.iter().enumerate() {
        let tag = if i == 0 { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape_html(cell)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}
