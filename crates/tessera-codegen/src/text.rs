//! Template text emission.

use crate::context::{Accumulator, Frame};
use crate::names::quote_char;
use crate::writer::SourceWriter;

/// Largest number of characters written by one literal statement, unless a
/// line ends first.
pub const CHUNK_SIZE: usize = 8192;

/// Text shorter than this is written one character per statement.
pub const PER_CHAR_LIMIT: usize = 3;

const WRITE_OPEN: &str = "ctx.out().write_str(\"";
const WRITE_CLOSE: &str = "\")?;";

pub(crate) fn emit_template_text(
    text: &str,
    frame: &Frame,
    acc: &mut Accumulator<'_>,
    out: &mut SourceWriter,
) {
    if text.is_empty() || (acc.options.trim_spaces && text.trim().is_empty()) {
        return;
    }

    if text.chars().count() < PER_CHAR_LIMIT {
        for ch in text.chars() {
            out.line(&format!("ctx.out().write_char({})?;", quote_char(ch)));
        }
        return;
    }

    if frame.gen_bytes {
        let n = acc.text_constant(text);
        out.line(&format!("ctx.write_encoded(ENCODING, TEXT_{n}_BYTES, TEXT_{n})?;"));
        return;
    }

    let page = acc.page;
    let break_at_newline = acc.options.mapped_file;
    let escape_pound = page.el_ignored || page.deferred_syntax_allowed_as_literal;
    let chars: Vec<char> = text.chars().collect();

    let mut chunk = String::new();
    let mut count = CHUNK_SIZE as isize;
    for (i, &ch) in chars.iter().enumerate() {
        count -= 1;
        let opens_brace = chars.get(i + 1) == Some(&'{');
        match ch {
            '"' => chunk.push_str("\\\""),
            '\\' => chunk.push_str("\\\\"),
            '\r' => chunk.push_str("\\r"),
            '\t' => chunk.push_str("\\t"),
            '\n' => {
                chunk.push_str("\\n");
                if break_at_newline || count < 0 {
                    out.line(&format!("{WRITE_OPEN}{chunk}{WRITE_CLOSE}"));
                    chunk.clear();
                    count = CHUNK_SIZE as isize;
                }
            }
            // An escaped `${` or `#{` that must stay escaped at runtime.
            '$' if page.el_ignored && opens_brace => chunk.push_str("\\\\$"),
            '#' if escape_pound && opens_brace => chunk.push_str("\\\\#"),
            c if c.is_control() => chunk.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => chunk.push(c),
        }
    }
    if !chunk.is_empty() {
        out.line(&format!("{WRITE_OPEN}{chunk}{WRITE_CLOSE}"));
    }
}
