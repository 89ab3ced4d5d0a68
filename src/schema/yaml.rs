//! YAML-backed event source
//!
//! `serde_yaml` drives a recording seed through the whole document; every
//! mapping, sequence and scalar it visits becomes one [`Event`]. Mappings are
//! walked key by key, so duplicate keys reach the builder (which reports them
//! with schema-level messages) instead of being rejected by a map type.
//!
//! `serde_yaml` exposes no spans for successfully parsed nodes. Marks are
//! recovered by searching forward through the source text for each scalar in
//! document order, skipping comments; structural events take the position of
//! the cursor. Numbers keep the text they were written with when the plain
//! token can be found at the cursor, and are re-rendered from their parsed
//! value otherwise.

use std::fmt;
use std::ops::Range;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use tracing::trace;

use super::event::{Event, EventKind, EventSource, VecEventSource};
use crate::error::{Error, Mark, Result};

/// Event source over a YAML document
#[derive(Debug, Clone)]
pub struct YamlEventSource {
    inner: VecEventSource,
}

impl YamlEventSource {
    /// Parse `text` and record its events.
    pub fn from_str(text: &str) -> Result<Self> {
        let mut sink = Sink {
            events: vec![Event::new(EventKind::StreamStart, Mark::new(1, 0))],
            locator: Locator::new(text),
        };

        let deserializer = serde_yaml::Deserializer::from_str(text);
        Recorder { sink: &mut sink }
            .deserialize(deserializer)
            .map_err(syntax_error)?;

        let end = sink.locator.end();
        sink.events.push(Event::new(EventKind::StreamEnd, end));
        trace!(events = sink.events.len(), "recorded yaml events");

        Ok(Self {
            inner: VecEventSource::new(sink.events),
        })
    }
}

impl EventSource for YamlEventSource {
    fn next_event(&mut self) -> Result<Event> {
        self.inner.next_event()
    }
}

fn syntax_error(err: serde_yaml::Error) -> Error {
    let mark = err
        .location()
        .map(|loc| Mark::new(loc.line(), loc.column().saturating_sub(1)))
        .unwrap_or_default();
    Error::Syntax {
        mark,
        message: err.to_string(),
    }
}

// =============================================================================
// Position recovery
// =============================================================================

#[derive(Debug)]
struct Locator<'s> {
    src: &'s str,
    comments: Vec<Range<usize>>,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'s> Locator<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            comments: comment_spans(src),
            offset: 0,
            line: 1,
            column: 0,
        }
    }

    fn here(&self) -> Mark {
        Mark::new(self.line, self.column)
    }

    fn end(&mut self) -> Mark {
        self.advance_to(self.src.len());
        self.here()
    }

    fn advance_to(&mut self, target: usize) {
        for ch in self.src[self.offset..target].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.offset = target;
    }

    /// Position of the next occurrence of `text` outside a comment, moving
    /// the cursor past it. Multi-line scalars are matched on their first line
    /// only.
    fn find(&mut self, text: &str) -> Mark {
        let needle = text.lines().next().unwrap_or_default().trim();
        if needle.is_empty() {
            return self.here();
        }
        let mut from = self.offset;
        while let Some(pos) = self.src[from..].find(needle) {
            let start = from + pos;
            let comment_end = self
                .comments
                .iter()
                .find(|span| span.contains(&start))
                .map(|span| span.end);
            match comment_end {
                Some(end) => from = end,
                None => {
                    self.advance_to(start);
                    let mark = self.here();
                    self.advance_to(start + needle.len());
                    return mark;
                }
            }
        }
        self.here()
    }

    /// The plain scalar at the next token, moving the cursor past it.
    /// Quoted, tagged and aliased nodes yield `None`.
    fn plain_token(&mut self) -> Option<(Mark, String)> {
        let rest = &self.src[self.offset..];
        let mut start = None;
        let mut in_comment = false;
        for (i, c) in rest.char_indices() {
            if in_comment {
                in_comment = c != '\n';
                continue;
            }
            match c {
                '#' => in_comment = true,
                '-' if rest[i + 1..].starts_with(char::is_whitespace) => {}
                ':' | '[' | '{' | ',' | '?' => {}
                c if c.is_whitespace() => {}
                _ => {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start?;

        let line = rest[start..]
            .split(|c: char| matches!(c, '\n' | ',' | ']' | '}'))
            .next()
            .unwrap_or_default();
        let token = line.split(" #").next().unwrap_or_default();
        let token = token.split(": ").next().unwrap_or_default().trim_end();
        let token = token.strip_suffix(':').unwrap_or(token);
        if token.is_empty() || token.starts_with(|c: char| matches!(c, '"' | '\'' | '!' | '&' | '*')) {
            return None;
        }

        let start = self.offset + start;
        let token = token.to_string();
        self.advance_to(start);
        let mark = self.here();
        self.advance_to(start + token.len());
        Some((mark, token))
    }
}

/// Byte ranges of `#` comments, excluding quoted scalars and block scalar
/// content
fn comment_spans(src: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut quote: Option<char> = None;
    let mut block_parent: Option<usize> = None;
    let mut offset = 0;

    for line in src.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let body = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        let indent = body.len() - body.trim_start().len();

        if let Some(parent) = block_parent {
            if body.trim().is_empty() || indent > parent {
                continue;
            }
            block_parent = None;
        }

        let mut prev: Option<char> = None;
        let mut significant: Option<char> = None;
        let mut chars = body.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match quote {
                Some('"') => match c {
                    '\\' => {
                        chars.next();
                    }
                    '"' => quote = None,
                    _ => {}
                },
                Some(_) => {
                    if c == '\'' {
                        // '' escapes a quote inside single-quoted scalars
                        if matches!(chars.peek(), Some(&(_, '\''))) {
                            chars.next();
                        } else {
                            quote = None;
                        }
                    }
                }
                None => {
                    if c == '#' && prev.map_or(true, char::is_whitespace) {
                        spans.push(line_start + i..line_start + body.len());
                        break;
                    }
                    if opens_scalar(significant) {
                        if c == '"' || c == '\'' {
                            quote = Some(c);
                        } else if (c == '|' || c == '>') && is_block_header(&body[i + 1..]) {
                            block_parent = Some(indent);
                        }
                    }
                }
            }
            if !c.is_whitespace() {
                significant = Some(c);
            }
            prev = Some(c);
        }
    }
    spans
}

/// Whether a scalar may start after `prev`, the last non-blank character
/// on the line
fn opens_scalar(prev: Option<char>) -> bool {
    prev.map_or(true, |p| matches!(p, ':' | '-' | '[' | '{' | ',' | '?'))
}

/// Chomping and indentation indicators, then at most a comment
fn is_block_header(rest: &str) -> bool {
    let rest = rest
        .trim_start_matches(|c: char| c == '+' || c == '-' || c.is_ascii_digit())
        .trim_start();
    rest.is_empty() || rest.starts_with('#')
}

// =============================================================================
// Recording
// =============================================================================

struct Sink<'s> {
    events: Vec<Event>,
    locator: Locator<'s>,
}

impl Sink<'_> {
    fn structural(&mut self, kind: EventKind) {
        let mark = self.locator.here();
        self.events.push(Event::new(kind, mark));
    }

    fn scalar(&mut self, value: String) {
        let mark = self.locator.find(&value);
        self.events.push(Event::scalar(value, mark));
    }

    fn number(&mut self, rendered: String) {
        match self.locator.plain_token() {
            Some((mark, text)) => self.events.push(Event::scalar(text, mark)),
            None => self.scalar(rendered),
        }
    }
}

struct Recorder<'r, 's> {
    sink: &'r mut Sink<'s>,
}

impl<'de> DeserializeSeed<'de> for Recorder<'_, '_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Recorder<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping, sequence or scalar")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<(), E> {
        self.sink.scalar(v.to_string());
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<(), E> {
        self.sink.number(v.to_string());
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<(), E> {
        self.sink.number(v.to_string());
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<(), E> {
        self.sink.number(v.to_string());
        Ok(())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<(), E> {
        self.sink.scalar(v.to_string());
        Ok(())
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<(), E> {
        self.sink.scalar(v);
        Ok(())
    }

    // null
    fn visit_unit<E: de::Error>(self) -> std::result::Result<(), E> {
        self.sink.scalar(String::new());
        Ok(())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<(), E> {
        self.visit_unit()
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.sink.structural(EventKind::SequenceStart);
        while seq
            .next_element_seed(Recorder {
                sink: &mut *self.sink,
            })?
            .is_some()
        {}
        self.sink.structural(EventKind::SequenceEnd);
        Ok(())
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        self.sink.structural(EventKind::MappingStart);
        while map
            .next_key_seed(Recorder {
                sink: &mut *self.sink,
            })?
            .is_some()
        {
            map.next_value_seed(Recorder {
                sink: &mut *self.sink,
            })?;
        }
        self.sink.structural(EventKind::MappingEnd);
        Ok(())
    }

    fn visit_enum<A>(self, _data: A) -> std::result::Result<(), A::Error>
    where
        A: de::EnumAccess<'de>,
    {
        Err(de::Error::custom("tagged values are not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(text: &str) -> Vec<Event> {
        let mut source = YamlEventSource::from_str(text).unwrap();
        let mut events = Vec::new();
        loop {
            let event = source.next_event().unwrap();
            let done = event.kind == EventKind::StreamEnd;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_records_structure_in_document_order() {
        let kinds: Vec<EventKind> = drain("a: [x, y]\nb: 1\n")
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::StreamStart,
                EventKind::MappingStart,
                EventKind::Scalar,
                EventKind::SequenceStart,
                EventKind::Scalar,
                EventKind::Scalar,
                EventKind::SequenceEnd,
                EventKind::Scalar,
                EventKind::Scalar,
                EventKind::MappingEnd,
                EventKind::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_scalars_keep_their_text() {
        let values: Vec<String> = drain("count: 1\nflag: true\nname: returns this\n")
            .into_iter()
            .filter(|e| e.kind == EventKind::Scalar)
            .map(|e| e.value)
            .collect();
        assert_eq!(
            values,
            vec!["count", "1", "flag", "true", "name", "returns this"]
        );
    }

    #[test]
    fn test_duplicate_keys_are_preserved() {
        let keys: Vec<String> = drain("a: 1\na: 2\n")
            .into_iter()
            .filter(|e| e.kind == EventKind::Scalar)
            .map(|e| e.value)
            .collect();
        assert_eq!(keys, vec!["a", "1", "a", "2"]);
    }

    #[test]
    fn test_null_value_is_empty_scalar() {
        let events = drain("Leaf:\n");
        assert_eq!(events[3].kind, EventKind::Scalar);
        assert_eq!(events[3].value, "");
    }

    #[test]
    fn test_scalar_marks_point_at_source() {
        let events = drain("protocol:\n  eval:\n    return: int\n");
        let eval = events.iter().find(|e| e.value == "eval").unwrap();
        assert_eq!(eval.mark, Mark::new(2, 2));
        let int = events.iter().find(|e| e.value == "int").unwrap();
        assert_eq!(int.mark, Mark::new(3, 12));
    }

    #[test]
    fn test_comments_do_not_capture_marks() {
        let events = drain("Base:\nDerived:  # extends Base\n  extends: [Base]\n");
        let extends = events.iter().find(|e| e.value == "extends").unwrap();
        assert_eq!(extends.mark, Mark::new(3, 2));
        let base = events.iter().filter(|e| e.value == "Base").nth(1).unwrap();
        assert_eq!(base.mark, Mark::new(3, 12));
    }

    #[test]
    fn test_hash_inside_quotes_and_block_scalars_is_not_a_comment() {
        let text = "prologue: |\n  #include <stdio.h>\nname: \"a # b\"\nnext: b\n";
        let events = drain(text);
        let prologue = events.iter().find(|e| e.value == "#include <stdio.h>\n").unwrap();
        assert_eq!(prologue.mark, Mark::new(2, 2));
        let quoted = events.iter().find(|e| e.value == "a # b").unwrap();
        assert_eq!(quoted.mark, Mark::new(3, 7));
        let next = events.iter().find(|e| e.value == "b").unwrap();
        assert_eq!(next.mark, Mark::new(4, 6));
    }

    #[test]
    fn test_numbers_keep_their_source_text() {
        let events = drain("width: 1.50\nmask: 0x10  # bits\nsizes: [8, -2]\n");
        let values: Vec<(&str, Mark)> = events
            .iter()
            .filter(|e| e.kind == EventKind::Scalar)
            .map(|e| (e.value.as_str(), e.mark))
            .collect();
        assert_eq!(
            values,
            vec![
                ("width", Mark::new(1, 0)),
                ("1.50", Mark::new(1, 7)),
                ("mask", Mark::new(2, 0)),
                ("0x10", Mark::new(2, 6)),
                ("sizes", Mark::new(3, 0)),
                ("8", Mark::new(3, 8)),
                ("-2", Mark::new(3, 11)),
            ]
        );
    }

    #[test]
    fn test_syntax_error_is_positioned() {
        let err = YamlEventSource::from_str("a: [1, 2\nb: c\n").unwrap_err();
        match err {
            Error::Syntax { mark, .. } => assert!(mark.line >= 1),
            other => panic!("Expected Syntax, got {:?}", other),
        }
    }
}
