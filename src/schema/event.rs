//! Structural events and the contract for reading them

use std::collections::VecDeque;
use std::fmt;

use crate::error::{Error, Mark, Result};

/// Kind of a structural event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StreamStart,
    MappingStart,
    MappingEnd,
    SequenceStart,
    SequenceEnd,
    Scalar,
    StreamEnd,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StreamStart => "stream start",
            Self::MappingStart => "mapping start",
            Self::MappingEnd => "mapping end",
            Self::SequenceStart => "sequence start",
            Self::SequenceEnd => "sequence end",
            Self::Scalar => "scalar",
            Self::StreamEnd => "stream end",
        };
        f.write_str(name)
    }
}

/// A single structural event with its source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Scalar text; empty for every other kind
    pub value: String,
    pub mark: Mark,
}

impl Event {
    pub fn new(kind: EventKind, mark: Mark) -> Self {
        Self {
            kind,
            value: String::new(),
            mark,
        }
    }

    pub fn scalar(value: impl Into<String>, mark: Mark) -> Self {
        Self {
            kind: EventKind::Scalar,
            value: value.into(),
            mark,
        }
    }

    /// Fail with a positioned structural error unless this event is `kind`
    pub fn expect(&self, kind: EventKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::UnexpectedEvent {
                mark: self.mark,
                expected: kind,
                found: self.kind,
            })
        }
    }
}

/// Producer of structural events in document order
pub trait EventSource {
    /// Next event. Once exhausted, keeps yielding [`EventKind::StreamEnd`].
    fn next_event(&mut self) -> Result<Event>;

    /// Next event, which must be of `kind`
    fn expect(&mut self, kind: EventKind) -> Result<Event> {
        let event = self.next_event()?;
        event.expect(kind)?;
        Ok(event)
    }

    /// Next event, which must be a scalar; returns its text and position
    fn expect_scalar(&mut self) -> Result<(String, Mark)> {
        let event = self.expect(EventKind::Scalar)?;
        Ok((event.value, event.mark))
    }
}

/// Event source over an already materialized event list
#[derive(Debug, Clone, Default)]
pub struct VecEventSource {
    events: VecDeque<Event>,
    last_mark: Mark,
}

impl VecEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
            last_mark: Mark::default(),
        }
    }

    /// Events not yet consumed
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl From<Vec<Event>> for VecEventSource {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}

impl EventSource for VecEventSource {
    fn next_event(&mut self) -> Result<Event> {
        match self.events.pop_front() {
            Some(event) => {
                self.last_mark = event.mark;
                Ok(event)
            }
            None => Ok(Event::new(EventKind::StreamEnd, self.last_mark)),
        }
    }
}
