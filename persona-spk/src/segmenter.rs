//! Streaming text segmentation
//!
//! Splits incrementally generated text into speakable units. A unit ends at
//! a sentence boundary: a run of terminator characters plus any closing
//! quotes or brackets. A boundary is only acted on once the character after
//! it is known (or the stream has ended), and units shorter than `min_chars`
//! are merged into the next one. When no boundary fits within `max_chars`
//! the text is cut at a word break instead.
//!
//! Every decision depends only on text that has already arrived in full, so
//! the output is the same however the input is fragmented.

use crate::config::SegmenterConfig;
use futures::stream::{self, Stream, StreamExt};
use persona_core::{RunId, UtteranceSegment};
use std::collections::VecDeque;
use tracing::debug;

const CLOSERS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', ')', ']', '}', '\u{300D}', '\u{300F}', '\u{00BB}'];

/// Segmenter bound to a single generation run
pub struct Segmenter {
    config: SegmenterConfig,
    terminators: Vec<char>,
    run: RunId,
    pending: Vec<char>,
    next_sequence: u64,
    finished: bool,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, run: RunId) -> Self {
        let terminators = config.terminators.chars().collect();
        Self {
            config,
            terminators,
            run,
            pending: Vec::new(),
            next_sequence: 0,
            finished: false,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Feed one fragment; returns the segments it completed
    pub fn push(&mut self, fragment: &str) -> Vec<UtteranceSegment> {
        if self.finished {
            debug!("Fragment after end of {} ignored", self.run);
            return Vec::new();
        }
        self.pending.extend(fragment.chars());
        self.drain(false)
    }

    /// Signal end of the text stream and flush whatever remains
    pub fn finish(&mut self) -> Vec<UtteranceSegment> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut out = self.drain(true);
        if let Some(segment) = self.take(self.pending.len()) {
            out.push(segment);
        }
        out
    }

    /// Characters buffered but not yet emitted
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn drain(&mut self, at_end: bool) -> Vec<UtteranceSegment> {
        let mut out = Vec::new();
        loop {
            self.trim_leading();
            if self.pending.is_empty() {
                break;
            }
            match self.next_cut(at_end) {
                Some(cut) => out.extend(self.take(cut)),
                None => break,
            }
        }
        out
    }

    /// Where the next segment ends, if that is already decided
    fn next_cut(&self, at_end: bool) -> Option<usize> {
        let text = &self.pending;
        let len = text.len();
        let max = self.config.max_chars;

        let mut i = 0;
        while i < len {
            if !self.is_terminator(text[i]) {
                i += 1;
                continue;
            }

            let mut end = i;
            let mut last_terminator = text[i];
            while end < len && self.is_terminator(text[end]) {
                last_terminator = text[end];
                end += 1;
            }
            while end < len && CLOSERS.contains(&text[end]) {
                end += 1;
            }

            let candidate_len = trimmed_len(&text[..end]);
            if candidate_len > max {
                break;
            }
            if end == len && !at_end {
                // The run may still grow, or be followed by a non-space
                return None;
            }

            let is_boundary = end == len || is_strong(last_terminator) || text[end].is_whitespace();
            if is_boundary && candidate_len >= self.config.min_chars {
                return Some(end);
            }
            i = end;
        }

        if len > max {
            // A break at index `max` still leaves exactly `max` characters
            if let Some(w) = text[..=max].iter().rposition(|c| c.is_whitespace()) {
                return Some(w);
            }
            if let Some(w) = text[max + 1..].iter().position(|c| c.is_whitespace()) {
                return Some(max + 1 + w);
            }
        }
        None
    }

    fn take(&mut self, cut: usize) -> Option<UtteranceSegment> {
        let raw: String = self.pending.drain(..cut).collect();
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let segment = UtteranceSegment {
            sequence: self.next_sequence,
            text: text.to_string(),
            run: self.run,
        };
        self.next_sequence += 1;
        Some(segment)
    }

    fn trim_leading(&mut self) {
        let skip = self.pending.iter().take_while(|c| c.is_whitespace()).count();
        if skip > 0 {
            self.pending.drain(..skip);
        }
    }

    fn is_terminator(&self, c: char) -> bool {
        self.terminators.contains(&c)
    }
}

/// Full-width terminators and newlines end a sentence without trailing whitespace
fn is_strong(c: char) -> bool {
    c == '\n' || !c.is_ascii()
}

fn trimmed_len(chars: &[char]) -> usize {
    let trailing = chars.iter().rev().take_while(|c| c.is_whitespace()).count();
    chars.len() - trailing
}

/// Lazily segment a stream of text fragments for one generation run.
///
/// The returned stream ends after the upstream ends and the remainder is flushed.
pub fn segment_stream<S>(fragments: S, config: SegmenterConfig, run: RunId) -> impl Stream<Item = UtteranceSegment>
where
    S: Stream + Unpin,
    S::Item: AsRef<str>,
{
    let state = (fragments, Segmenter::new(config, run), VecDeque::new(), false);
    stream::unfold(state, |(mut fragments, mut segmenter, mut ready, mut done)| async move {
        loop {
            if let Some(segment) = ready.pop_front() {
                return Some((segment, (fragments, segmenter, ready, done)));
            }
            if done {
                return None;
            }
            match fragments.next().await {
                Some(fragment) => ready.extend(segmenter.push(fragment.as_ref())),
                None => {
                    ready.extend(segmenter.finish());
                    done = true;
                }
            }
        }
    })
}
