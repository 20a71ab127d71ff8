use serde::{Deserialize, Serialize};

/// Response character encodings the output writers can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Charset {
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    pub const DEFAULT: Charset = Charset::Latin1;

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" => Some(Charset::Latin1),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            _ => None,
        }
    }

    /// Charset named by the `charset=` parameter of a content type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type.find("charset=") {
            Some(idx) => Self::from_label(&content_type[idx + "charset=".len()..]),
            None => Some(Self::DEFAULT),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
        }
    }

    fn limit(self) -> Option<u32> {
        match self {
            Charset::Utf8 => None,
            Charset::Latin1 => Some(0xFF),
            Charset::Ascii => Some(0x7F),
        }
    }

    pub fn can_encode(self, text: &str) -> bool {
        match self.limit() {
            None => true,
            Some(limit) => text.chars().all(|c| c as u32 <= limit),
        }
    }

    /// Unmappable characters become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self.limit() {
            None => text.as_bytes().to_vec(),
            Some(limit) => text
                .chars()
                .map(|c| if c as u32 <= limit { c as u32 as u8 } else { b'?' })
                .collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 | Charset::Ascii => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_without_charset_defaults_to_latin1() {
        assert_eq!(Charset::from_content_type("text/html"), Some(Charset::Latin1));
        assert_eq!(
            Charset::from_content_type("text/html;charset=UTF-8"),
            Some(Charset::Utf8)
        );
        assert_eq!(Charset::from_content_type("text/html;charset=EBCDIC"), None);
    }

    #[test]
    fn latin1_replaces_unmappable() {
        assert_eq!(Charset::Latin1.encode("é€"), vec![0xE9, b'?']);
        assert_eq!(Charset::Latin1.decode(&[0xE9]), "é");
    }
}
