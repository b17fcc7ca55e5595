use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::serial::error::SerialPortError;

/// This codec has a configurable delimiter character for reading,
/// and optionally adds a character to each line it encodes.
///
/// Decoded lines have surrounding whitespace (such as `\r`) removed,
/// bad utf8 is replaced, and lines left empty are skipped.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a newline into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,

    /// If provided, which byte to append when writing (encoding) lines.
    /// If `None`, forwards the data as-is.
    write_delimiter: Option<u8>,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8, write_delimiter: Option<u8>) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
            write_delimiter,
        }
    }

    fn to_line(bytes: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim();

        (!line.is_empty()).then(|| line.to_owned())
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n', Some(b'\n'))
    }
}

impl Decoder for LinesCodec {
    type Item = String;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = src.len();
            let look_at = &src[self.cursor..read_to];

            let Some(position) = look_at.iter().position(|&byte| byte == self.read_delimiter) else {
                // We did not find a full frame.
                // The next time we are called the same buffer `src` will be provided to us (same starting point),
                // but possibly with more data.
                // Since our job is to find the delimiter, we don't need to re-read the bytes we have already looked at.
                self.cursor = read_to;
                return Ok(None);
            };

            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            // Split at the delimiter, getting the bytes before it.
            let line = src.split_to(actual_position);

            // Discard the delimiter by advancing the source buffer beyond it.
            src.advance(1);

            if let Some(line) = Self::to_line(&line) {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // Whatever is left is the last (unterminated) line.
        self.cursor = 0;
        let rest = src.split();

        Ok(Self::to_line(&rest))
    }
}

impl Encoder<String> for LinesCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());

        if let Some(character) = self.write_delimiter {
            dst.extend_from_slice(&[character]);
        }
        Ok(())
    }
}
