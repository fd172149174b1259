//! Decoding of watched files.

/// How file bytes are turned into text before matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, with invalid sequences replaced by U+FFFD.
    #[default]
    Utf8Lossy,
    /// ISO-8859-1: every byte is one character.
    Latin1,
}

impl TextEncoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8Lossy => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        assert_eq!(TextEncoding::Utf8Lossy.decode("héllo".as_bytes()), "héllo");
        assert_eq!(TextEncoding::Utf8Lossy.decode(&[b'a', 0xff]), "a\u{fffd}");
        assert_eq!(TextEncoding::Latin1.decode(&[b'a', 0xe9]), "aé");
    }
}
