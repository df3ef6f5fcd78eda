use smallvec::SmallVec;

/// Order-preserving byte encoding for index fields.
///
/// Each field is written as a tag byte followed by its payload. Text payloads
/// escape interior NULs (`0x00` -> `0x00 0xFF`) and end with a `0x00`
/// terminator, so the terminator doubles as the composite-field separator and
/// can never occur inside an encoded field. Integers are big-endian so byte
/// order equals numeric order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EncodedKey {
    bytes: SmallVec<[u8; 64]>,
}

const TAG_U64: u8 = 0x10;
const TAG_TEXT: u8 = 0x14;
const TAG_BOOL: u8 = 0x16;

impl EncodedKey {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn starts_with(&self, prefix: &EncodedKey) -> bool {
        self.bytes.starts_with(&prefix.bytes)
    }
}

/// Builds composite keys field by field. `finish_str_prefix` emits a trailing
/// text field without its terminator, producing a key usable only as a byte
/// prefix (it matches every full key whose last field starts with the given
/// string).
#[derive(Debug, Default)]
pub struct KeyBuilder {
    bytes: SmallVec<[u8; 64]>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(mut self, s: &str) -> Self {
        self.bytes.push(TAG_TEXT);
        append_text(s, &mut self.bytes);
        self
    }

    pub fn push_bool(mut self, b: bool) -> Self {
        self.bytes.push(TAG_BOOL);
        self.bytes.push(if b { 1 } else { 0 });
        self
    }

    pub fn push_u64(mut self, v: u64) -> Self {
        self.bytes.push(TAG_U64);
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn finish(self) -> EncodedKey {
        EncodedKey { bytes: self.bytes }
    }

    pub fn finish_str_prefix(mut self, s: &str) -> EncodedKey {
        self.bytes.push(TAG_TEXT);
        append_text_unterminated(s, &mut self.bytes);
        EncodedKey { bytes: self.bytes }
    }
}

/// Smallest key strictly greater than every key with the given prefix, or
/// `None` when the prefix is all `0xFF` and no such bound exists.
pub fn prefix_successor(prefix: &EncodedKey) -> Option<EncodedKey> {
    let mut next = prefix.bytes.clone();
    for i in (0..next.len()).rev() {
        if next[i] != 0xFF {
            next[i] += 1;
            next.truncate(i + 1);
            return Some(EncodedKey { bytes: next });
        }
    }
    None
}

fn append_text(s: &str, out: &mut SmallVec<[u8; 64]>) {
    append_text_unterminated(s, out);
    out.push(0x00);
}

fn append_text_unterminated(s: &str, out: &mut SmallVec<[u8; 64]>) {
    for byte in s.as_bytes() {
        if *byte == 0 {
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(*byte);
        }
    }
}
