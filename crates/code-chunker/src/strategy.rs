use crate::config::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How chunk boundaries are measured for a given text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// Human-formatted code: boundaries fall on line breaks
    Lines,
    /// Mean line length above the threshold: boundaries are byte offsets
    Minified,
}

impl ChunkMode {
    /// Classify text by its mean line length
    pub fn detect(text: &str, config: &ChunkerConfig) -> Self {
        let lines = text.lines().count().max(1);
        let mean = text.chars().count() / lines;
        if mean > config.minified_line_chars {
            Self::Minified
        } else {
            Self::Lines
        }
    }
}

/// Line table plus mode-specific window sizes for one text
pub(crate) struct TextLayout<'a> {
    text: &'a str,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
    pub mode: ChunkMode,
    /// Chunks longer than this are cut into character windows
    pub split_limit: usize,
    line_window: usize,
}

impl<'a> TextLayout<'a> {
    pub fn new(text: &'a str, config: &ChunkerConfig) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(i, b)| b == b'\n' && i + 1 < text.len())
                .map(|(i, _)| i + 1),
        );

        let mode = ChunkMode::detect(text, config);
        let split_limit = match mode {
            ChunkMode::Lines => config.max_chunk_chars,
            ChunkMode::Minified => config.max_chunk_chars.min(config.minified_window_chars),
        };

        Self {
            text,
            line_starts,
            mode,
            split_limit,
            line_window: config.line_window,
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// 1-based line containing `byte`
    pub fn line_of(&self, byte: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= byte).max(1)
    }

    /// Line span of a non-empty byte range, inclusive on both ends
    pub fn lines_of(&self, range: &Range<usize>) -> (usize, usize) {
        let last = range.end.saturating_sub(1).max(range.start);
        (self.line_of(range.start), self.line_of(last))
    }

    fn line_start(&self, line: usize) -> usize {
        self.line_starts[line - 1]
    }

    /// Offset of the line terminator (or end of text) of `line`
    fn line_end(&self, line: usize) -> usize {
        match self.line_starts.get(line) {
            Some(&next) => next - 1,
            None => self.text.len(),
        }
    }

    /// Widen a byte range so it starts and ends on line boundaries
    pub fn snap_to_lines(&self, range: Range<usize>) -> Range<usize> {
        let (first, last) = self.lines_of(&range);
        self.line_start(first)..self.line_end(last)
    }

    /// Sub-range of `range` with surrounding whitespace removed; empty when blank
    pub fn trimmed(&self, range: Range<usize>) -> Range<usize> {
        let slice = &self.text[range.clone()];
        let lead = slice.len() - slice.trim_start().len();
        let body = slice.trim();
        let start = range.start + lead;
        start..start + body.len()
    }

    /// Window ranges covering `range`, cut by lines or by characters per mode
    pub fn windows(&self, range: Range<usize>) -> Vec<Range<usize>> {
        match self.mode {
            ChunkMode::Lines => self.line_windows(range),
            ChunkMode::Minified => self.char_windows(range, self.split_limit),
        }
    }

    fn line_windows(&self, range: Range<usize>) -> Vec<Range<usize>> {
        if range.is_empty() {
            return Vec::new();
        }
        let (first, last) = self.lines_of(&range);
        let mut windows = Vec::new();
        let mut line = first;
        while line <= last {
            let window_last = (line + self.line_window - 1).min(last);
            let start = self.line_start(line).max(range.start);
            let end = self.line_end(window_last).min(range.end);
            if start < end {
                windows.push(start..end);
            }
            line = window_last + 1;
        }
        windows
    }

    /// Consecutive ranges of at most `limit` bytes, cut on char boundaries
    pub fn char_windows(&self, range: Range<usize>, limit: usize) -> Vec<Range<usize>> {
        let mut windows = Vec::new();
        let mut pos = range.start;
        while pos < range.end {
            let mut cut = floor_char_boundary(self.text, (pos + limit).min(range.end));
            if cut <= pos {
                cut = ceil_char_boundary(self.text, pos + 1).min(range.end);
            }
            windows.push(pos..cut);
            pos = cut;
        }
        windows
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(text: &str) -> TextLayout<'_> {
        TextLayout::new(text, &ChunkerConfig::default())
    }

    #[test]
    fn detects_minified_by_mean_line_length() {
        let config = ChunkerConfig::default();
        assert_eq!(ChunkMode::detect("a\nb\nc", &config), ChunkMode::Lines);
        let long = "x".repeat(4001);
        assert_eq!(ChunkMode::detect(&long, &config), ChunkMode::Minified);
        let exact = "x".repeat(4000);
        assert_eq!(ChunkMode::detect(&exact, &config), ChunkMode::Lines);
    }

    #[test]
    fn line_lookup_is_one_based() {
        let text = "ab\ncd\n\nef";
        let layout = layout(text);
        assert_eq!(layout.line_of(0), 1);
        assert_eq!(layout.line_of(2), 1);
        assert_eq!(layout.line_of(3), 2);
        assert_eq!(layout.line_of(6), 3);
        assert_eq!(layout.line_of(7), 4);
        assert_eq!(layout.snap_to_lines(4..5), 3..5);
    }

    #[test]
    fn line_windows_respect_window_size() {
        let text = (1..=450).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let layout = layout(&text);
        let windows = layout.windows(0..text.len());
        assert_eq!(windows.len(), 3);
        assert_eq!(layout.lines_of(&windows[0]), (1, 200));
        assert_eq!(layout.lines_of(&windows[2]), (401, 450));
    }

    #[test]
    fn char_windows_never_split_a_character() {
        let text = "é".repeat(10);
        let layout = layout(&text);
        let windows = layout.char_windows(0..text.len(), 3);
        assert!(windows.iter().all(|w| text.get(w.clone()).is_some()));
        assert_eq!(windows.first().map(|w| w.start), Some(0));
        assert_eq!(windows.last().map(|w| w.end), Some(text.len()));
    }

    #[test]
    fn trimmed_strips_surrounding_whitespace() {
        let text = "  \n  foo();  \n";
        let layout = layout(text);
        let range = layout.trimmed(0..text.len());
        assert_eq!(&text[range], "foo();");
        assert!(layout.trimmed(0..3).is_empty());
    }
}
