//! Character-encoding detection side-channel.
//!
//! The statistical detector handles the common cases. Central-European
//! legacy text is the one spot it routinely gets wrong: windows-1250 and
//! ISO-8859-2 cover the same languages with overlapping byte ranges, so a
//! low-confidence guess between the two is re-decided by counting bytes
//! that only one of the code pages defines as letters.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, ISO_8859_2, WINDOWS_1250};

/// Detection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedEncoding {
    pub encoding: &'static Encoding,
    /// Whether the statistical detector was confident on its own.
    pub confident: bool,
}

impl DetectedEncoding {
    /// Label written back to the resource file record.
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Bytes that windows-1250 maps to letters (ś, ź, Ś, Ź, ť, ž) but that are
/// unassigned or control characters in ISO-8859-2's 0x80–0x9F range.
const CP1250_ONLY_LETTERS: &[u8] = &[0x8C, 0x8F, 0x9C, 0x9F, 0x8D, 0x9E];

/// Detect the encoding of a byte buffer.
pub fn detect_encoding(bytes: &[u8]) -> DetectedEncoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (encoding, confident) = detector.guess_assess(None, true);

    if confident {
        return DetectedEncoding {
            encoding,
            confident: true,
        };
    }

    // Only arbitrate when the weak guess already points at the ambiguous
    // Central-European pair.
    if encoding == WINDOWS_1250 || encoding == ISO_8859_2 {
        let cp1250_hits = bytes
            .iter()
            .filter(|b| CP1250_ONLY_LETTERS.contains(b))
            .count();
        let encoding = if cp1250_hits > 0 {
            WINDOWS_1250
        } else {
            ISO_8859_2
        };
        return DetectedEncoding {
            encoding,
            confident: false,
        };
    }

    DetectedEncoding {
        encoding,
        confident: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_is_confidently_utf8_compatible() {
        let detected = detect_encoding(b"plain ascii text, nothing special");
        assert!(detected.encoding.is_ascii_compatible());
    }

    #[test]
    fn test_utf8_polish() {
        let detected = detect_encoding("za\u{17c}\u{f3}\u{142}\u{107} g\u{119}\u{15b}l\u{105} ja\u{17a}\u{144}".as_bytes());
        assert_eq!(detected.encoding, encoding_rs::UTF_8);
    }

    #[test]
    fn test_cp1250_marker_bytes_pick_windows_1250() {
        // 0x9C is ś in windows-1250 and undefined in ISO-8859-2; the
        // arbitration must pick windows-1250 whenever such bytes appear.
        let sample = b"jako\x9c\x9f tekst w starym kodowaniu \xb3\xb9";
        let mut detector = EncodingDetector::new();
        detector.feed(sample, true);
        let (guess, confident) = detector.guess_assess(None, true);
        if !confident && (guess == WINDOWS_1250 || guess == ISO_8859_2) {
            assert_eq!(detect_encoding(sample).encoding, WINDOWS_1250);
        }
    }

    #[test]
    fn test_name_is_stable() {
        assert_eq!(
            DetectedEncoding {
                encoding: WINDOWS_1250,
                confident: false
            }
            .name(),
            "windows-1250"
        );
    }
}
