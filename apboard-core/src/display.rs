//! 将任意文本排版为显示屏能容纳的行。

use crate::config::DisplayConfig;

/// Lays `text` out for a display of the given geometry.
///
/// Words wrap at `chars_per_line`, words longer than a line are broken,
/// explicit newlines start a new line, and output stops after `max_lines`.
/// Control characters become spaces. The result always fits the geometry.
pub fn layout_text(text: &str, geometry: &DisplayConfig) -> Vec<String> {
    let width = geometry.chars_per_line.max(1);
    let mut lines: Vec<String> = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph: String = paragraph
            .trim_end_matches('\r')
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();

        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            if current_len > 0 && current_len + 1 + word.len() <= width {
                current.push(' ');
                current.extend(word.iter());
                current_len += 1 + word.len();
                continue;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            while word.len() > width {
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            current.extend(word.iter());
            current_len = word.len();
        }
        lines.push(current);

        if lines.len() >= geometry.max_lines {
            break;
        }
    }

    lines.truncate(geometry.max_lines);
    lines
}
