//! Text pagination: plain text → fixed-size pages of hard-wrapped lines.
//!
//! Layout is a simple cursor walk from the top margin down. Lines are
//! hard-wrapped by character count (not glyph width), so the output is
//! deterministic and independent of font metrics.
//!
//! Text is drawn in the standard Helvetica font with `WinAnsiEncoding`.
//! A sub-line containing a character outside that encoding is skipped with a
//! warning; its vertical slot is still consumed so the rest of the layout
//! does not shift.

use crate::config::TextLayout;
use crate::document::{Page, Rgb, TextRun};
use tracing::{debug, warn};

/// Gray level of the item-name header.
pub const HEADER_GRAY: f32 = 0.4;

/// Lay `text` out on as many pages as it needs.
///
/// `header` is drawn once at the top of the first page (merge mode) and
/// consumes `layout.header_gap_lines` line heights. Always returns at least
/// one page, even for empty input.
pub fn paginate(text: &str, layout: &TextLayout, header: Option<&str>) -> Vec<Page> {
    let line_height = layout.line_height();
    let top = layout.page_height - layout.margin;
    let floor = layout.margin + line_height;
    let budget = layout.chars_per_line();

    let mut pages = Vec::new();
    let mut runs = Vec::new();
    let mut y = top;
    let mut skipped = 0usize;

    if let Some(name) = header {
        runs.push(TextRun::new(
            lossy_win_ansi(&strip_controls(name)),
            layout.margin,
            y,
            layout.header_font_size,
            Rgb::gray(HEADER_GRAY),
        ));
        y -= line_height * layout.header_gap_lines;
    }

    for line in text.split('\n') {
        for sub_line in wrap_line(line, budget) {
            if y < floor {
                pages.push(Page::text(
                    layout.page_width,
                    layout.page_height,
                    std::mem::take(&mut runs),
                ));
                y = top;
            }

            let clean = strip_controls(&sub_line);
            if !clean.is_empty() {
                if is_win_ansi_encodable(&clean) {
                    runs.push(TextRun::new(clean, layout.margin, y, layout.font_size, Rgb::BLACK));
                } else {
                    skipped += 1;
                    warn!(
                        "Skipping line on page {}: characters outside the standard font encoding",
                        pages.len() + 1
                    );
                }
            }
            y -= line_height;
        }
    }

    pages.push(Page::text(layout.page_width, layout.page_height, runs));
    debug!(
        "Paginated {} chars into {} page(s), {} line(s) skipped",
        text.len(),
        pages.len(),
        skipped
    );
    pages
}

/// Split `line` into chunks of at most `budget` characters.
///
/// An empty line yields one empty chunk so blank lines still advance the
/// cursor. Concatenating the chunks gives back `line`.
pub fn wrap_line(line: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    if line.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(budget)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Remove C0 control characters (U+0000–U+001F) and DEL.
pub fn strip_controls(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\u{0}'..='\u{1F}' | '\u{7F}')).collect()
}

// ── WinAnsiEncoding ──────────────────────────────────────────────────────

/// Map one character to its WinAnsiEncoding byte.
pub fn win_ansi_byte(c: char) -> Option<u8> {
    let cp = c as u32;
    match cp {
        0x20..=0x7E | 0xA0..=0xFF => Some(cp as u8),
        _ => Some(match c {
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => return None,
        }),
    }
}

pub fn is_win_ansi_encodable(s: &str) -> bool {
    s.chars().all(|c| win_ansi_byte(c).is_some())
}

/// Encode `s`, failing on the first unmappable character.
pub fn encode_win_ansi(s: &str) -> Result<Vec<u8>, char> {
    s.chars().map(|c| win_ansi_byte(c).ok_or(c)).collect()
}

/// Replace unmappable characters with `?`. Used for item names, which must
/// always be shown.
pub fn lossy_win_ansi(s: &str) -> String {
    s.chars()
        .map(|c| if win_ansi_byte(c).is_some() { c } else { '?' })
        .collect()
}
