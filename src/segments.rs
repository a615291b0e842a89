//! Splits a reply into alternating prose and code segments.
//!
//! The scanner walks the reply fence by fence. Text before the first fence is
//! prose, text between the first and second fence is code, and so on. An
//! unterminated trailing fence turns the rest of the reply into code.

pub const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Prose,
    Code,
}

impl SegmentKind {
    fn flip(self) -> Self {
        match self {
            SegmentKind::Prose => SegmentKind::Code,
            SegmentKind::Code => SegmentKind::Prose,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    /// Language tag stripped from the first line of a code segment.
    pub language: Option<String>,
    /// Latency annotation; only ever set on the first code segment of a reply.
    pub inference_time_ms: Option<f64>,
}

impl Segment {
    pub fn is_code(&self) -> bool {
        self.kind == SegmentKind::Code
    }
}

/// Split `reply` on fence markers. Blank segments are dropped.
pub fn split_reply(reply: &str, inference_time_ms: Option<f64>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut kind = SegmentKind::Prose;
    let mut rest = reply;
    let mut annotated = false;

    loop {
        let (raw, next) = match rest.find(FENCE) {
            Some(pos) => (&rest[..pos], Some(&rest[pos + FENCE.len()..])),
            None => (rest, None),
        };

        if let Some(mut segment) = build_segment(kind, raw) {
            if segment.is_code() && !annotated {
                segment.inference_time_ms = inference_time_ms;
                annotated = true;
            }
            segments.push(segment);
        }

        match next {
            Some(after) => {
                rest = after;
                kind = kind.flip();
            }
            None => break,
        }
    }

    segments
}

fn build_segment(kind: SegmentKind, raw: &str) -> Option<Segment> {
    if raw.trim().is_empty() {
        return None;
    }

    let (language, text) = match kind {
        SegmentKind::Prose => (None, raw.trim()),
        SegmentKind::Code => {
            let (language, body) = strip_language_tag(trim_line_breaks(raw));
            (language, trim_line_breaks(body))
        }
    };
    if text.trim().is_empty() {
        return None;
    }

    Some(Segment {
        kind,
        text: text.to_string(),
        language: language.map(str::to_string),
        inference_time_ms: None,
    })
}

/// Drop surrounding blank lines but keep the first line's indentation.
fn trim_line_breaks(code: &str) -> &str {
    let start = code
        .char_indices()
        .scan(0, |line_start, (i, c)| {
            if c == '\n' {
                *line_start = i + 1;
            }
            Some((*line_start, c))
        })
        .find(|(_, c)| !c.is_whitespace())
        .map_or(code.len(), |(line_start, _)| line_start);
    code[start..].trim_end()
}

/// Drop a first line that is a lone word followed by a line break.
fn strip_language_tag(code: &str) -> (Option<&str>, &str) {
    if let Some((first, body)) = code.split_once('\n') {
        let tag = first.trim_end();
        if is_bare_word(tag) {
            return (Some(tag), body);
        }
    }
    (None, code)
}

fn is_bare_word(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '+' | '-' | '#' | '.'))
}
