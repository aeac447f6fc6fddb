/// Incremental, error-tolerant UTF-8 decoder for the output pump. A chunked
/// read can split a multi-byte sequence; the incomplete tail is carried into
/// the next call instead of being mangled into replacement characters.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes `input` together with any carried-over tail. Invalid bytes
    /// become U+FFFD; an incomplete trailing sequence is held back.
    pub(crate) fn decode(&mut self, input: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(input);

        let mut out = String::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            match std::str::from_utf8(&bytes[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    pos = bytes.len();
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    // Safe split: everything before the error is valid UTF-8.
                    out.push_str(String::from_utf8_lossy(&bytes[pos..pos + valid_up_to]).as_ref());
                    pos += valid_up_to;
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos += bad;
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk;
                            // finish it when the next read arrives.
                            self.carry = bytes[pos..].to_vec();
                            pos = bytes.len();
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a dangling partial sequence at end of stream as replacement
    /// characters. Only called once the process will produce no more bytes.
    pub(crate) fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&tail).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"hello\n"), "hello\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn multibyte_split_across_chunks_is_reassembled() {
        // "héllo" with the two-byte 'é' split between reads.
        let bytes = "h\u{e9}llo".as_bytes();
        let mut decoder = Utf8Decoder::default();
        let first = decoder.decode(&bytes[..2]);
        let second = decoder.decode(&bytes[2..]);
        assert_eq!(format!("{first}{second}"), "héllo");
    }

    #[test]
    fn four_byte_emoji_split_three_ways() {
        let bytes = "ok\u{1f600}".as_bytes();
        let mut decoder = Utf8Decoder::default();
        let mut out = String::new();
        for chunk in bytes.chunks(3) {
            out.push_str(&decoder.decode(chunk));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "ok\u{1f600}");
    }

    #[test]
    fn invalid_byte_becomes_replacement_character() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn truncated_tail_is_flushed_lossily_at_eof() {
        let mut decoder = Utf8Decoder::default();
        // First two bytes of a three-byte sequence, then the stream ends.
        assert_eq!(decoder.decode(&[0xe2, 0x82]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }
}
