//! Break point detection for chunking

use serde::{Deserialize, Serialize};

/// What a chunk ended on. Ordered from weakest to strongest boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    /// No usable boundary, cut at the size limit
    Hard = 0,
    /// Terminal punctuation followed by whitespace
    Sentence = 1,
    /// Single line break
    Line = 2,
    /// Blank line
    Paragraph = 3,
    /// The text ran out
    End = 4,
}

impl BreakKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakKind::Hard => "hard",
            BreakKind::Sentence => "sentence",
            BreakKind::Line => "line",
            BreakKind::Paragraph => "paragraph",
            BreakKind::End => "end",
        }
    }
}

impl std::fmt::Display for BreakKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position (in chars) just after a boundary character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPoint {
    pub position: usize,
    pub kind: BreakKind,
}

impl BreakPoint {
    pub fn new(position: usize, kind: BreakKind) -> Self {
        Self { position, kind }
    }
}

fn is_terminal_punctuation(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Every sentence, line and paragraph boundary, sorted by position
pub fn find_break_points(chars: &[char]) -> Vec<BreakPoint> {
    let mut points = Vec::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            let kind = if i > 0 && chars[i - 1] == '\n' {
                BreakKind::Paragraph
            } else {
                BreakKind::Line
            };
            points.push(BreakPoint::new(i + 1, kind));
        } else if is_terminal_punctuation(c) {
            let followed_by_space = chars.get(i + 1).map_or(true, |next| next.is_whitespace());
            if followed_by_space {
                points.push(BreakPoint::new(i + 1, BreakKind::Sentence));
            }
        }
    }

    points
}

/// The last break point in `(start, limit]`, if it lies past `min_position`
pub fn last_break_before(
    points: &[BreakPoint],
    start: usize,
    limit: usize,
    min_position: usize,
) -> Option<BreakPoint> {
    // points are sorted, so the first one past `limit` bounds the search
    let upper = points.partition_point(|p| p.position <= limit);
    points[..upper]
        .last()
        .copied()
        .filter(|p| p.position > start && p.position > min_position)
}
