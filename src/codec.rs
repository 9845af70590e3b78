use bytes::{Buf, Bytes, BytesMut};
use encoding_rs::{CoderResult, Encoding};
use std::io;
use tokio_util::codec::Decoder;

/// Frames a byte stream in some legacy charset into UTF-8 chunks for the CSV reader.
///
/// Partial multi-byte sequences stay inside the `encoding_rs` decoder between
/// calls, so chunk boundaries never split a character.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    out: BytesMut,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
            out: BytesMut::new(),
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<Bytes> {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len() * 3 + 4);
            let start = self.out.len();
            self.out.resize(start + needed.max(4), 0);

            let (result, read, written, _replaced) =
                self.decoder
                    .decode_to_utf8(&src[..], &mut self.out[start..], last);
            self.out.truncate(start + written);
            src.advance(read);

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }

        if self.out.is_empty() {
            None
        } else {
            Some(self.out.split().freeze())
        }
    }
}

impl Decoder for Utf8Transcoder {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let chunk = self.transcode(src, true);
        src.clear();
        Ok(chunk)
    }
}
