//! Bounded output ring buffer

use std::collections::VecDeque;

use super::types::{OutputChunk, OutputEvent, StreamKind};

/// Combined stdout/stderr of one run, capped at a byte ceiling
///
/// Every byte has a fixed offset in the combined output. When the ceiling is
/// exceeded the oldest bytes are evicted; readers whose cursor falls behind the
/// retained window learn exactly how many bytes they lost.
#[derive(Debug)]
pub struct OutputBuffer {
    chunks: VecDeque<OutputChunk>,
    capacity: usize,
    retained: usize,
    /// Offset of the first retained byte, which is also the number of evicted bytes
    start: u64,
    /// Total bytes ever appended
    end: u64,
}

/// What a reader gets for its cursor
#[derive(Debug, Default)]
pub struct ReadResult {
    pub lost_bytes: u64,
    pub chunks: Vec<OutputChunk>,
    pub next_cursor: u64,
}

impl ReadResult {
    pub fn is_empty(&self) -> bool {
        self.lost_bytes == 0 && self.chunks.is_empty()
    }

    pub fn into_events(self) -> Vec<OutputEvent> {
        let mut events = Vec::with_capacity(self.chunks.len() + 1);
        if self.lost_bytes > 0 {
            events.push(OutputEvent::Gap {
                lost_bytes: self.lost_bytes,
            });
        }
        events.extend(self.chunks.into_iter().map(OutputEvent::Chunk));
        events
    }
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            capacity: capacity.max(1),
            retained: 0,
            start: 0,
            end: 0,
        }
    }

    pub fn append(&mut self, stream: StreamKind, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let offset = self.end;
        self.end += data.len() as u64;

        // A chunk larger than the whole buffer keeps only its tail
        let (offset, data) = if data.len() > self.capacity {
            let skip = data.len() - self.capacity;
            (offset + skip as u64, &data[skip..])
        } else {
            (offset, data)
        };

        // Coalesce with the previous chunk of the same stream
        match self.chunks.back_mut() {
            Some(last) if last.stream == stream && last.end() == offset => {
                last.data.extend_from_slice(data)
            }
            _ => self.chunks.push_back(OutputChunk {
                offset,
                stream,
                data: data.to_vec(),
            }),
        }
        self.retained += data.len();
        self.evict();
    }

    fn evict(&mut self) {
        while self.retained > self.capacity {
            let excess = self.retained - self.capacity;
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.data.len() <= excess {
                self.retained -= front.data.len();
                self.chunks.pop_front();
            } else {
                front.data.drain(..excess);
                front.offset += excess as u64;
                self.retained -= excess;
            }
        }
        self.start = self
            .chunks
            .front()
            .map_or(self.end, |chunk| chunk.offset);
    }

    /// Everything at or after `cursor`, with the bytes already evicted counted
    pub fn read_from(&self, cursor: u64) -> ReadResult {
        let lost_bytes = self.start.saturating_sub(cursor);
        let from = cursor.max(self.start);
        let chunks = self
            .chunks
            .iter()
            .filter(|chunk| chunk.end() > from)
            .map(|chunk| {
                if chunk.offset >= from {
                    chunk.clone()
                } else {
                    let skip = (from - chunk.offset) as usize;
                    OutputChunk {
                        offset: from,
                        stream: chunk.stream,
                        data: chunk.data[skip..].to_vec(),
                    }
                }
            })
            .collect();
        ReadResult {
            lost_bytes,
            chunks,
            next_cursor: self.end.max(cursor),
        }
    }

    /// The retained window as text, prefixed with a marker when bytes were dropped
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.start > 0 {
            out.push_str(&format!("[... {} bytes dropped ...]\n", self.start));
        }
        let bytes: Vec<u8> = self
            .chunks
            .iter()
            .flat_map(|chunk| chunk.data.iter().copied())
            .collect();
        out.push_str(&String::from_utf8_lossy(&bytes));
        out
    }

    pub fn retained_bytes(&self) -> usize {
        self.retained
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.start
    }

    pub fn total_bytes(&self) -> u64 {
        self.end
    }
}
