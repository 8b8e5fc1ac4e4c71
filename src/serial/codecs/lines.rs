use bytes::{Buf, BytesMut};
use futures::{future, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead};
use tracing::{debug, error, trace};

use crate::serial::{error::SerialPortError, SerialMessage, SerialMessageBytes};

/// The longest line kept by default.
/// Protocol lines are far shorter, anything longer is noise.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// This codec has a configurable delimiter character for reading,
/// and optionally adds a character to each line it encodes.
///
/// Lines longer than the maximum length are discarded up to the next delimiter,
/// so a board printing without newlines cannot grow the buffer without bound.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a newline into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,

    /// If provided, which byte to append when writing (encoding) messages.
    /// If `None`, forwards the data as-is.
    write_delimiter: Option<u8>,

    /// Lines longer than this, delimiter excluded, are dropped.
    max_length: usize,

    /// Whether we are skipping the rest of an over-long line.
    discarding: bool,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8, write_delimiter: Option<u8>) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
            write_delimiter,
            max_length: DEFAULT_MAX_LINE_LENGTH,
            discarding: false,
        }
    }

    /// The same codec, dropping lines longer than `max_length` bytes.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// The longest line this codec yields.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Return a [StringCodec], which does the same thing as the underlying [LinesCodec].
    /// The difference is that it yields [`SerialMessage`]s instead of vectors of bytes.
    pub fn into_string_codec(self) -> StringCodec {
        StringCodec { wrapped: self }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n', None)
    }
}

impl Decoder for LinesCodec {
    type Item = SerialMessageBytes;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = src.len();

            let found = src[self.cursor..read_to]
                .iter()
                .position(|&byte| byte == self.read_delimiter)
                // Since we might "start late" in the buffer (from the cursor),
                // the "global" position within the buffer has to be calculated.
                .map(|position| self.cursor + position);

            match (self.discarding, found) {
                (true, Some(position)) => {
                    // The end of the over-long line, delimiter included.
                    src.advance(position + 1);
                    self.cursor = 0;
                    self.discarding = false;
                }
                (true, None) => {
                    src.clear();
                    self.cursor = 0;
                    return Ok(None);
                }
                (false, Some(position)) if position > self.max_length => {
                    debug!(
                        length = position,
                        max = self.max_length,
                        "Discarding over-long line"
                    );
                    src.advance(position + 1);
                    self.cursor = 0;
                }
                (false, Some(position)) => {
                    // Next time we need to start over.
                    self.cursor = 0;

                    // Split at the delimiter, getting a slice of the bytes before it.
                    let line = src.split_to(position);

                    // Discard the delimiter by advancing the source buffer beyond it.
                    src.advance(1);

                    let line = match line.last() {
                        Some(b'\r') if self.read_delimiter == b'\n' => &line[..line.len() - 1],
                        _ => &line[..],
                    };

                    return Ok(Some(line.to_vec()));
                }
                (false, None) if read_to > self.max_length => {
                    debug!(
                        buffered = read_to,
                        max = self.max_length,
                        "Line too long, discarding up to the next delimiter"
                    );
                    src.clear();
                    self.cursor = 0;
                    self.discarding = true;
                    return Ok(None);
                }
                (false, None) => {
                    // We did not find a full frame.
                    // The next time we are called the same buffer `src` will be provided to us (same starting point),
                    // but possibly with more data.
                    // Since our job is to find the delimiter, we don't need to re-read the bytes we have already looked at.
                    self.cursor = read_to;

                    // Indicate that we need more bytes to look at.
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // A line without its delimiter never completed.
        if !src.is_empty() {
            trace!("Discarding {} bytes of an unfinished line", src.len());
            src.clear();
        }
        self.cursor = 0;
        self.discarding = false;

        Ok(None)
    }
}

impl Encoder<SerialMessageBytes> for LinesCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: SerialMessageBytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);

        if let Some(character) = self.write_delimiter {
            dst.extend_from_slice(&[character]);
        }
        Ok(())
    }
}

/// This does the same thing as the underlying [LinesCodec].
/// The difference is that it reads [`SerialMessage`]s.
///
/// Bad utf8 is replaced by a lossy character, so garbled bytes on the wire
/// never end the stream.
#[derive(Debug, Clone, Default)]
pub struct StringCodec {
    wrapped: LinesCodec,
}

impl Decoder for StringCodec {
    type Item = SerialMessage;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.wrapped.decode(src)?.map(SerialMessage::new_lossy))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.wrapped.decode_eof(src)?.map(SerialMessage::new_lossy))
    }
}

impl Encoder<SerialMessageBytes> for StringCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: SerialMessageBytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.wrapped.encode(item, dst)
    }
}

/// Lines read from `reader`, split using `codec`.
///
/// The stream ends when the reader reaches end of file,
/// or on the first IO error.
pub fn line_stream<R>(reader: R, codec: LinesCodec) -> impl Stream<Item = SerialMessage>
where
    R: AsyncRead,
{
    FramedRead::new(reader, codec.into_string_codec())
        .take_while(|line| {
            if let Err(e) = line {
                error!(?e, "Could not read line, stopping");
            }
            future::ready(line.is_ok())
        })
        .filter_map(|line| future::ready(line.ok()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const WIRE: &[u8] = b"{\"function_name\":\"DHT_TEMPERATURE\",\"parameters\":{\"value\":21.5}}\n\
        booting...\r\n\
        \n\
        {\"function_name\":\"RECV_433\",\"parameters\":{\"value\":123456}}\n\
        trailing";

    fn decode_in_chunks(bytes: &[u8], chunk_size: usize) -> Vec<SerialMessage> {
        let mut codec = LinesCodec::default().into_string_codec();
        let mut buffer = BytesMut::new();
        let mut lines = vec![];

        for chunk in bytes.chunks(chunk_size) {
            buffer.extend_from_slice(chunk);

            while let Some(line) = codec.decode(&mut buffer).unwrap() {
                lines.push(line);
            }
        }

        while let Some(line) = codec.decode_eof(&mut buffer).unwrap() {
            lines.push(line);
        }

        lines
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let expected = decode_in_chunks(WIRE, WIRE.len());

        assert_eq!(
            expected,
            vec![
                SerialMessage::from(
                    r#"{"function_name":"DHT_TEMPERATURE","parameters":{"value":21.5}}"#
                ),
                SerialMessage::from("booting..."),
                SerialMessage::from(""),
                SerialMessage::from(r#"{"function_name":"RECV_433","parameters":{"value":123456}}"#),
            ]
        );

        for chunk_size in 1..WIRE.len() {
            assert_eq!(expected, decode_in_chunks(WIRE, chunk_size), "chunk size {chunk_size}");
        }
    }

    #[test]
    fn partial_line_is_kept_for_next_chunk() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::from(&b"hel"[..]);

        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(&buffer[..], b"hel");

        buffer.extend_from_slice(b"lo\nwor");
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(&buffer[..], b"wor");
    }

    #[test]
    fn unfinished_line_is_dropped_at_eof() {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::from(&b"no newline"[..]);

        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn bad_utf8_is_replaced() {
        let mut codec = LinesCodec::default().into_string_codec();
        let mut buffer = BytesMut::from(&b"ok \xff\xfe here\n"[..]);

        let line = codec.decode(&mut buffer).unwrap().unwrap();

        assert!(line.as_str().starts_with("ok "));
        assert!(line.as_str().ends_with(" here"));
    }

    #[test]
    fn custom_delimiter() {
        let mut codec = LinesCodec::new(b';', Some(b';'));
        let mut buffer = BytesMut::from(&b"a;b\r;"[..]);

        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"a".to_vec()));
        // Only newline delimited lines have their carriage return removed.
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"b\r".to_vec()));

        let mut out = BytesMut::new();
        codec.encode(b"c".to_vec(), &mut out).unwrap();
        assert_eq!(&out[..], b"c;");
    }

    #[test]
    fn over_long_lines_are_dropped() {
        let mut codec = LinesCodec::default().with_max_length(8);
        let mut buffer = BytesMut::new();

        // Arrives in pieces, so most of it is dropped before its end is seen.
        buffer.extend_from_slice(b"0123456789");
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"abcdef\nshort\n");
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"short".to_vec()));

        // Arrives whole.
        buffer.extend_from_slice(b"much too long\nok\n");
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"ok".to_vec()));

        // Right at the limit is kept.
        buffer.extend_from_slice(b"12345678\n");
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"12345678".to_vec()));
    }

    #[test]
    fn endless_line_does_not_grow_the_buffer() {
        let mut codec = LinesCodec::default().into_string_codec();
        let mut buffer = BytesMut::new();
        let megabyte = vec![b'x'; 1024 * 1024];

        for _ in 0..16 {
            buffer.extend_from_slice(&megabyte);
            assert_eq!(codec.decode(&mut buffer).unwrap(), None);
            assert!(buffer.len() <= DEFAULT_MAX_LINE_LENGTH);
        }

        buffer.extend_from_slice(b"xxx\n{\"function_name\":\"RECV_433\",\"parameters\":{\"value\":1}}\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(SerialMessage::from(
                r#"{"function_name":"RECV_433","parameters":{"value":1}}"#
            ))
        );
    }

    #[test]
    fn chunk_boundaries_do_not_matter_for_long_lines() {
        let wire = b"abcdefghijklmnop\nkeep\nabcdefghijkl\r\nalso\n";

        let decode = |chunk_size: usize| {
            let mut codec = LinesCodec::default().with_max_length(6);
            let mut buffer = BytesMut::new();
            let mut lines = vec![];

            for chunk in wire.chunks(chunk_size) {
                buffer.extend_from_slice(chunk);
                while let Some(line) = codec.decode(&mut buffer).unwrap() {
                    lines.push(line);
                }
            }
            lines
        };

        for chunk_size in 1..=wire.len() {
            assert_eq!(
                decode(chunk_size),
                vec![b"keep".to_vec(), b"also".to_vec()],
                "chunk size {chunk_size}"
            );
        }
    }

    #[tokio::test]
    async fn line_stream_ends_with_reader() {
        let lines = line_stream(WIRE, LinesCodec::default())
            .map(|line| line.as_str().to_owned())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "booting...");
    }
}
