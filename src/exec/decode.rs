//! Incremental UTF-8 decoding for captured process output
//!
//! Pipes hand us arbitrary byte chunks. A multi-byte character can straddle two
//! reads, so the decoder keeps the incomplete tail until the next chunk arrives.
//! Invalid sequences become U+FFFD and decoding continues after them.

use std::io::Read;

const REPLACEMENT: char = '\u{FFFD}';

/// Stateful UTF-8 decoder
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
  pending: Vec<u8>,
}

impl Utf8StreamDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Decode a chunk, returning every complete character it finishes
  pub fn decode(&mut self, chunk: &[u8]) -> String {
    self.pending.extend_from_slice(chunk);

    let mut out = String::new();
    let mut consumed = 0;

    loop {
      let rest = &self.pending[consumed..];
      match std::str::from_utf8(rest) {
        Ok(valid) => {
          out.push_str(valid);
          consumed = self.pending.len();
          break;
        }
        Err(err) => {
          let valid_up_to = err.valid_up_to();
          if let Ok(valid) = std::str::from_utf8(&rest[..valid_up_to]) {
            out.push_str(valid);
          }
          match err.error_len() {
            Some(invalid_len) => {
              out.push(REPLACEMENT);
              consumed += valid_up_to + invalid_len;
            }
            None => {
              // Incomplete sequence at the end; wait for more bytes
              consumed += valid_up_to;
              break;
            }
          }
        }
      }
    }

    self.pending.drain(..consumed);
    out
  }

  /// Flush at end of stream; a dangling partial sequence becomes U+FFFD
  pub fn finish(&mut self) -> String {
    if self.pending.is_empty() {
      return String::new();
    }
    self.pending.clear();
    REPLACEMENT.to_string()
  }
}

/// Read `reader` to EOF, handing decoded text to `sink` as it arrives.
///
/// `sink` is only called with non-empty text. Read errors end the stream; what
/// was decoded up to that point has already been delivered.
pub fn pump<R, F>(mut reader: R, mut sink: F) -> std::io::Result<()>
where
  R: Read,
  F: FnMut(&str),
{
  let mut decoder = Utf8StreamDecoder::new();
  let mut buf = [0u8; 8192];

  let result = loop {
    match reader.read(&mut buf) {
      Ok(0) => break Ok(()),
      Ok(n) => {
        let text = decoder.decode(&buf[..n]);
        if !text.is_empty() {
          sink(&text);
        }
      }
      Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
      Err(e) => break Err(e),
    }
  };

  let tail = decoder.finish();
  if !tail.is_empty() {
    sink(&tail);
  }
  result
}
