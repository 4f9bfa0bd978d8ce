//! Server-sent events framing
//!
//! Turns a raw byte stream into the payloads of its `data:` lines.
//! Handles partial lines and multi-byte characters split across chunks.

use crate::error::FintrackError;
use crate::Result;
use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>,
    pending: Vec<u8>,
    finished: bool,
}

impl SseStream {
    pub fn new(
        byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            pending: Vec::new(),
            finished: false,
        }
    }
}

impl Stream for SseStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(data) = next_data_line(&mut this.pending, this.finished) {
                return Poll::Ready(Some(data));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.pending.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    this.pending.clear();
                    return Poll::Ready(Some(Err(FintrackError::LlmError(format!(
                        "stream interrupted: {}",
                        e
                    )))));
                }
                Poll::Ready(None) => this.finished = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pop the next `data:` payload. At end of stream a final unterminated line counts too.
fn next_data_line(pending: &mut Vec<u8>, at_end: bool) -> Option<Result<String>> {
    loop {
        let line_bytes: Vec<u8> = match pending.iter().position(|b| *b == b'\n') {
            Some(pos) => pending.drain(..=pos).collect(),
            None if at_end && !pending.is_empty() => std::mem::take(pending),
            None => return None,
        };

        let line = match std::str::from_utf8(&line_bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                return Some(Err(FintrackError::LlmError(format!(
                    "invalid UTF-8 in event stream: {}",
                    e
                ))))
            }
        };

        // Blank separators and `event:`/`id:`/`retry:` fields carry nothing we need.
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() {
                return Some(Ok(data.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunks(parts: &[&[u8]]) -> Vec<std::result::Result<Bytes, reqwest::Error>> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    #[tokio::test]
    async fn test_data_lines_across_chunks() {
        let stream = SseStream::new(futures::stream::iter(chunks(&[
            b"data: {\"a\":",
            b"1}\r\n\r\nevent: ping\n",
            b"data: {\"b\":2}\n\n",
        ])));

        let items: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_split_multibyte_character() {
        let text = "data: \"৳ 500\"\n".as_bytes();
        let (head, tail) = text.split_at(8);
        let stream = SseStream::new(futures::stream::iter(chunks(&[head, tail])));

        let items: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec!["\"৳ 500\""]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let stream = SseStream::new(futures::stream::iter(chunks(&[b"data: last"])));
        let items: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec!["last"]);
    }
}
