//! Fixed-size chunking of streamed model text

/// Buffers text increments and cuts them into chunks of exactly
/// `threshold` characters. The tail is released by [`ChunkBuffer::finish`].
#[derive(Debug)]
pub struct ChunkBuffer {
    threshold: usize,
    buffer: String,
    chars: usize,
}

impl ChunkBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: String::new(),
            chars: 0,
        }
    }

    /// Append `delta` and return every chunk that is now complete.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        self.chars += delta.chars().count();

        let mut ready = Vec::new();
        while self.chars >= self.threshold {
            // Byte index of the first char past the threshold.
            let cut = self
                .buffer
                .char_indices()
                .nth(self.threshold)
                .map_or(self.buffer.len(), |(idx, _)| idx);
            let rest = self.buffer.split_off(cut);
            ready.push(std::mem::replace(&mut self.buffer, rest));
            self.chars -= self.threshold;
        }
        ready
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        self.chars = 0;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn pending_chars(&self) -> usize {
        self.chars
    }
}
