// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use deltaprof_protobuf::{Field, Value};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Buffered bytes are handed to the sink once the buffer grows past this.
const FLUSH_THRESHOLD: usize = 4096;

enum Sink<W: Write> {
    Gzip(GzEncoder<W>),
    Plain(W),
}

impl<W: Write> Sink<W> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Sink::Gzip(zipper) => zipper.write_all(buf),
            Sink::Plain(writer) => writer.write_all(buf),
        }
    }
}

/// Serializes protobuf fields into a small buffer and streams it, optionally
/// gzip compressed, to the underlying writer every few KiB. The encoded
/// profile is never held in memory as a whole.
pub struct StreamingEncoder<W: Write> {
    buffer: Vec<u8>,
    sink: Sink<W>,
}

#[inline]
#[cold]
fn cold() {}

#[inline]
fn likely(b: bool) -> bool {
    if !b {
        cold()
    }
    b
}

impl<W: Write> StreamingEncoder<W> {
    pub fn gzip(writer: W) -> Self {
        Self::with_sink(Sink::Gzip(GzEncoder::new(writer, Compression::default())))
    }

    pub fn uncompressed(writer: W) -> Self {
        Self::with_sink(Sink::Plain(writer))
    }

    fn with_sink(sink: Sink<W>) -> Self {
        Self {
            buffer: Vec::with_capacity(2 * FLUSH_THRESHOLD),
            sink,
        }
    }

    /// Encodes the field in its in-wire protobuf format.
    ///
    /// # Errors
    /// If the underlying writer fails while the buffer is flushed.
    pub fn encode<T: Value, const N: u32, const O: bool>(
        &mut self,
        field: &Field<T, N, O>,
    ) -> io::Result<()> {
        // Writing into a Vec cannot fail.
        field.encode(&mut self.buffer)?;
        if likely(self.buffer.len() <= FLUSH_THRESHOLD) {
            return Ok(());
        }
        self.flush_buffer()
    }

    #[cold]
    #[inline(never)]
    fn flush_buffer(&mut self) -> io::Result<()> {
        self.sink.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    /// Writes what is left, closes the compression stream and returns the
    /// writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_buffer()?;
        match self.sink {
            Sink::Gzip(zipper) => zipper.finish(),
            Sink::Plain(mut writer) => {
                writer.flush()?;
                Ok(writer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaprof_protobuf::{NO_OPT_ZERO, STRING_TABLE};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn strings(encoder: &mut StreamingEncoder<Vec<u8>>, n: usize) -> Vec<u8> {
        let mut expected = Vec::new();
        for i in 0..n {
            let s = format!("string number {i}");
            let field = Field::<&str, STRING_TABLE, NO_OPT_ZERO>::from(s.as_str());
            field.encode(&mut expected).unwrap();
            encoder.encode(&field).unwrap();
        }
        expected
    }

    #[test]
    fn gzip_stream_decodes_to_the_fields() {
        let mut encoder = StreamingEncoder::gzip(Vec::new());
        let expected = strings(&mut encoder, 2000);
        let compressed = encoder.finish().unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn uncompressed_stream_is_raw() {
        let mut encoder = StreamingEncoder::uncompressed(Vec::new());
        let expected = strings(&mut encoder, 10);
        assert_eq!(encoder.finish().unwrap(), expected);
    }

    #[test]
    fn empty_stream_is_valid_gzip() {
        let compressed = StreamingEncoder::gzip(Vec::new()).finish().unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert!(decoded.is_empty());
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_errors_surface() {
        let mut encoder = StreamingEncoder::uncompressed(FailingWriter);
        let long = "x".repeat(FLUSH_THRESHOLD);
        let field = Field::<&str, STRING_TABLE, NO_OPT_ZERO>::from(long.as_str());
        assert!(encoder.encode(&field).is_err());
    }
}
