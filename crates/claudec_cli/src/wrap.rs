//! Pure wrap-math, UTF-8 boundary, word-motion, and visible-width helpers
//! for the line editor. Kept free of any terminal I/O so the
//! contracts are exercised directly in tests without a tty.

/// Cursor position after laying out `buffer` up to some offset, plus how
/// far the whole buffer extends. `total_lines` is the 0-indexed line
/// reached by running the same layout over the *entire* buffer — not a
/// count — so that when the cursor sits at the end of the buffer,
/// `total_lines == cursor_line` rather than one past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapPosition {
    pub cursor_line: usize,
    pub cursor_column: usize,
    pub total_lines: usize,
}

/// Advances `(line, column)` by one visible cell `ch`. A literal `\n`
/// always moves to `(line + 1, 0)`; any other character advances column
/// by one, except that landing on `terminal_width` wraps to the next
/// line at column 1 rather than column 0 (the character that overflows
/// is itself the first cell of the new line).
fn step(line: &mut usize, column: &mut usize, ch: char, terminal_width: usize) {
    let terminal_width = terminal_width.max(1);
    if ch == '\n' {
        *line += 1;
        *column = 0;
        return;
    }
    if *column >= terminal_width {
        *line += 1;
        *column = 1;
    } else {
        *column += 1;
    }
}

fn layout(buffer: &str, prompt_width: usize, terminal_width: usize) -> (usize, usize) {
    let mut line = 0usize;
    let mut column = prompt_width;
    for ch in buffer.chars() {
        step(&mut line, &mut column, ch, terminal_width);
    }
    (line, column)
}

/// Computes `(cursor_line, cursor_column, total_lines)` for the cursor's
/// position after word-wrapping `buffer` at `terminal_width`.
/// `cursor_byte_offset` must land on a `char` boundary.
pub fn compute_wrap(
    buffer: &str,
    cursor_byte_offset: usize,
    prompt_width: usize,
    terminal_width: usize,
) -> WrapPosition {
    let prefix = &buffer[..cursor_byte_offset];
    let (cursor_line, cursor_column) = layout(prefix, prompt_width, terminal_width);
    let (full_line, _) = layout(buffer, prompt_width, terminal_width);
    WrapPosition { cursor_line, cursor_column, total_lines: full_line.max(cursor_line) }
}

/// Length in bytes of the UTF-8 character starting with `leading_byte`.
/// A continuation byte seen as a leading byte is invalid and reported as
/// length 1 so callers always advance.
pub fn char_len_from_leading_byte(leading_byte: u8) -> usize {
    match leading_byte {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

fn is_continuation_byte(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

/// The byte offset of the character boundary immediately before `offset`.
pub fn prev_char_boundary(buffer: &str, offset: usize) -> usize {
    if offset == 0 {
        return 0;
    }
    let bytes = buffer.as_bytes();
    let mut i = offset - 1;
    while i > 0 && is_continuation_byte(bytes[i]) {
        i -= 1;
    }
    i
}

/// The byte offset of the character boundary immediately after `offset`.
pub fn next_char_boundary(buffer: &str, offset: usize) -> usize {
    if offset >= buffer.len() {
        return buffer.len();
    }
    let bytes = buffer.as_bytes();
    let mut i = offset + char_len_from_leading_byte(bytes[offset]);
    if i > buffer.len() {
        i = buffer.len();
    }
    while i < buffer.len() && !buffer.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Backward-word motion: skip boundary (non-word) characters left, then
/// skip word characters left; result is the left edge of the word. Clamps
/// to 0 at the start of the buffer.
pub fn backward_word(buffer: &str, cursor: usize) -> usize {
    let boundaries: Vec<(usize, char)> = buffer.char_indices().collect();
    let mut idx = boundaries.iter().position(|&(i, _)| i == cursor).unwrap_or(boundaries.len());
    while idx > 0 && !is_word_char(boundaries[idx - 1].1) {
        idx -= 1;
    }
    while idx > 0 && is_word_char(boundaries[idx - 1].1) {
        idx -= 1;
    }
    boundaries.get(idx).map(|&(i, _)| i).unwrap_or(0)
}

/// Forward-word motion: skip word characters right until a boundary, then
/// skip boundary characters right until the next word starts. Clamps to
/// the end of the buffer.
pub fn forward_word(buffer: &str, cursor: usize) -> usize {
    let boundaries: Vec<(usize, char)> = buffer.char_indices().collect();
    let mut idx = boundaries.iter().position(|&(i, _)| i == cursor).unwrap_or(boundaries.len());
    while idx < boundaries.len() && is_word_char(boundaries[idx].1) {
        idx += 1;
    }
    while idx < boundaries.len() && !is_word_char(boundaries[idx].1) {
        idx += 1;
    }
    boundaries.get(idx).map(|&(i, _)| i).unwrap_or(buffer.len())
}

/// Visible width, skipping ANSI escapes: `ESC [ ... final`
/// (final byte `A-Z`/`a-z`) contributes 0 columns, an incomplete escape
/// contributes 0, everything else contributes 1 column per character.
pub fn visible_width(s: &str) -> usize {
    let mut width = 0;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            while let Some(c2) = chars.next() {
                if c2.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        if c == '\u{1b}' {
            continue;
        }
        width += 1;
    }
    width
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cursor_column_starts_at_prompt_width() {
        let wrap = compute_wrap("", 0, 4, 80);
        assert_eq!(wrap.cursor_column, 4);
        assert_eq!(wrap.cursor_line, 0);
    }

    #[test]
    fn wrap_boundary_at_terminal_width() {
        let buffer = "1234567890X";
        let at_ten = compute_wrap(buffer, 10, 0, 10);
        assert_eq!((at_ten.cursor_line, at_ten.cursor_column), (0, 10));
        assert_eq!(at_ten.total_lines, 1);

        let at_eleven = compute_wrap(buffer, 11, 0, 10);
        assert_eq!((at_eleven.cursor_line, at_eleven.cursor_column), (1, 1));
        assert_eq!(at_eleven.total_lines, 1);
    }

    #[test]
    fn literal_newline_resets_column_to_zero() {
        let wrap = compute_wrap("ab\ncd", 3, 0, 80);
        assert_eq!((wrap.cursor_line, wrap.cursor_column), (1, 0));
    }

    #[test]
    fn total_lines_is_never_less_than_cursor_line() {
        let wrap = compute_wrap("a\nb\nc\nd", 1, 0, 80);
        assert!(wrap.total_lines >= wrap.cursor_line);
    }

    #[test]
    fn char_len_covers_all_four_utf8_lead_byte_classes() {
        assert_eq!(char_len_from_leading_byte(b'a'), 1);
        assert_eq!(char_len_from_leading_byte(0xC2), 2);
        assert_eq!(char_len_from_leading_byte(0xE2), 3);
        assert_eq!(char_len_from_leading_byte(0xF0), 4);
        assert_eq!(char_len_from_leading_byte(0x80), 1);
    }

    #[test]
    fn char_boundary_motion_skips_whole_code_points() {
        let s = "a\u{00e9}b"; // 'a', e-acute (2 bytes), 'b'
        assert_eq!(next_char_boundary(s, 0), 1);
        assert_eq!(next_char_boundary(s, 1), 3);
        assert_eq!(prev_char_boundary(s, 3), 1);
        assert_eq!(prev_char_boundary(s, 1), 0);
    }

    #[test]
    fn next_char_boundary_clamps_at_end() {
        let s = "ab";
        assert_eq!(next_char_boundary(s, 2), 2);
    }

    #[test]
    fn backward_word_skips_trailing_space_then_the_word() {
        let s = "foo bar  ";
        assert_eq!(backward_word(s, s.len()), 4);
        assert_eq!(backward_word(s, 4), 0);
        assert_eq!(backward_word(s, 0), 0);
    }

    #[test]
    fn forward_word_lands_on_next_words_start() {
        let s = "foo  bar";
        assert_eq!(forward_word(s, 0), 5);
        assert_eq!(forward_word(s, 5), s.len());
    }

    #[test]
    fn visible_width_ignores_csi_escapes() {
        assert_eq!(visible_width("\u{1b}[1mhi\u{1b}[0m"), 2);
        assert_eq!(visible_width("plain"), 5);
    }

    #[test]
    fn visible_width_treats_incomplete_escape_as_zero_width() {
        assert_eq!(visible_width("a\u{1b}["), 1);
        assert_eq!(visible_width("\u{1b}"), 0);
    }
}
