//! A single, context-parameterized UTF-8 validator.
//!
//! Every string flavor (basic key, literal key, basic table-key, ...,
//! comments) needs the same byte-level validation with only its forbidden
//! control characters differing, so this module collapses that into one
//! routine driven by context rather than duplicating the automaton per
//! flavor: one function, parameterized by which raw bytes are forbidden in
//! the calling context (see [`Forbidden`]).

use crate::error::TomlError;
use crate::util::Position;

/// Which raw control bytes the calling context forbids appearing
/// unescaped. Every string flavor in TOML forbids some subset of control
/// bytes; multi-line strings and comments relax the newline restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forbidden {
    pub cr: bool,
    pub lf: bool,
    pub other_control: bool,
}

impl Forbidden {
    pub const SINGLE_LINE: Forbidden = Forbidden {
        cr: true,
        lf: true,
        other_control: true,
    };
    pub const MULTI_LINE: Forbidden = Forbidden {
        cr: false,
        lf: false,
        other_control: true,
    };
    pub const COMMENT: Forbidden = Forbidden {
        cr: true,
        lf: true,
        other_control: true,
    };
}

/// Decode the UTF-8 sequence beginning at `bytes[pos]`.
///
/// Returns the codepoint and the number of bytes it occupies. Rejects
/// overlong encodings, surrogate halves, and codepoints above `U+10FFFF` by
/// construction (the lead/continuation byte ranges below only admit valid
/// sequences per RFC 3629), and rejects forbidden raw control bytes per
/// `forbidden`. `\t` is always allowed as it is the one control byte every
/// TOML string context admits.
pub fn decode_one(
    bytes: &[u8],
    pos: usize,
    forbidden: Forbidden,
    at: Position,
) -> Result<(u32, usize), TomlError> {
    let syntax = |message: &str| TomlError::SyntaxError {
        at,
        message: message.to_string(),
    };

    let lead = bytes[pos];

    if lead < 0x80 {
        if lead == b'\t' {
            return Ok((lead as u32, 1));
        }
        if lead == b'\r' {
            return if forbidden.cr {
                Err(syntax("bare carriage return is not allowed here"))
            } else {
                Ok((lead as u32, 1))
            };
        }
        if lead == b'\n' {
            return if forbidden.lf {
                Err(syntax("bare line feed is not allowed here"))
            } else {
                Ok((lead as u32, 1))
            };
        }
        if lead < 0x20 || lead == 0x7f {
            return if forbidden.other_control {
                Err(syntax("control character is not allowed here"))
            } else {
                Ok((lead as u32, 1))
            };
        }
        return Ok((lead as u32, 1));
    }

    let continuation = |b: u8, lo: u8, hi: u8| (lo..=hi).contains(&b);
    let byte_at = |offset: usize| -> Result<u8, TomlError> {
        bytes
            .get(pos + offset)
            .copied()
            .ok_or(TomlError::UnexpectedEndOfInput { at })
    };

    match lead {
        0xc2..=0xdf => {
            let b1 = byte_at(1)?;
            if !continuation(b1, 0x80, 0xbf) {
                return Err(syntax("invalid UTF-8 continuation byte"));
            }
            let cp = ((lead as u32 & 0x1f) << 6) | (b1 as u32 & 0x3f);
            Ok((cp, 2))
        }
        0xe0 => {
            let b1 = byte_at(1)?;
            let b2 = byte_at(2)?;
            if !continuation(b1, 0xa0, 0xbf) || !continuation(b2, 0x80, 0xbf) {
                return Err(syntax("invalid UTF-8 continuation byte"));
            }
            let cp = ((lead as u32 & 0x0f) << 12) | ((b1 as u32 & 0x3f) << 6) | (b2 as u32 & 0x3f);
            Ok((cp, 3))
        }
        0xe1..=0xec | 0xee..=0xef => {
            let b1 = byte_at(1)?;
            let b2 = byte_at(2)?;
            if !continuation(b1, 0x80, 0xbf) || !continuation(b2, 0x80, 0xbf) {
                return Err(syntax("invalid UTF-8 continuation byte"));
            }
            let cp = ((lead as u32 & 0x0f) << 12) | ((b1 as u32 & 0x3f) << 6) | (b2 as u32 & 0x3f);
            Ok((cp, 3))
        }
        0xed => {
            let b1 = byte_at(1)?;
            let b2 = byte_at(2)?;
            if !continuation(b1, 0x80, 0x9f) || !continuation(b2, 0x80, 0xbf) {
                return Err(syntax("invalid UTF-8 continuation byte (surrogate range)"));
            }
            let cp = ((lead as u32 & 0x0f) << 12) | ((b1 as u32 & 0x3f) << 6) | (b2 as u32 & 0x3f);
            Ok((cp, 3))
        }
        0xf0 => {
            let b1 = byte_at(1)?;
            let b2 = byte_at(2)?;
            let b3 = byte_at(3)?;
            if !continuation(b1, 0x90, 0xbf)
                || !continuation(b2, 0x80, 0xbf)
                || !continuation(b3, 0x80, 0xbf)
            {
                return Err(syntax("invalid UTF-8 continuation byte"));
            }
            let cp = ((lead as u32 & 0x07) << 18)
                | ((b1 as u32 & 0x3f) << 12)
                | ((b2 as u32 & 0x3f) << 6)
                | (b3 as u32 & 0x3f);
            Ok((cp, 4))
        }
        0xf1..=0xf3 => {
            let b1 = byte_at(1)?;
            let b2 = byte_at(2)?;
            let b3 = byte_at(3)?;
            if !continuation(b1, 0x80, 0xbf)
                || !continuation(b2, 0x80, 0xbf)
                || !continuation(b3, 0x80, 0xbf)
            {
                return Err(syntax("invalid UTF-8 continuation byte"));
            }
            let cp = ((lead as u32 & 0x07) << 18)
                | ((b1 as u32 & 0x3f) << 12)
                | ((b2 as u32 & 0x3f) << 6)
                | (b3 as u32 & 0x3f);
            Ok((cp, 4))
        }
        0xf4 => {
            let b1 = byte_at(1)?;
            let b2 = byte_at(2)?;
            let b3 = byte_at(3)?;
            if !continuation(b1, 0x80, 0x8f)
                || !continuation(b2, 0x80, 0xbf)
                || !continuation(b3, 0x80, 0xbf)
            {
                return Err(syntax("invalid UTF-8 continuation byte"));
            }
            let cp = ((lead as u32 & 0x07) << 18)
                | ((b1 as u32 & 0x3f) << 12)
                | ((b2 as u32 & 0x3f) << 6)
                | (b3 as u32 & 0x3f);
            Ok((cp, 4))
        }
        _ => Err(syntax("invalid UTF-8 lead byte")),
    }
}

/// Encode `codepoint` as UTF-8 into `out`. Rejects surrogate halves
/// (`U+D800..=U+DFFF`) and codepoints above `U+10FFFF`, the two failure
/// modes `\u`/`\U` escapes can hit that a raw byte stream cannot.
pub fn encode_checked(codepoint: u32, at: Position, out: &mut Vec<u8>) -> Result<(), TomlError> {
    if (0xd800..=0xdfff).contains(&codepoint) {
        return Err(TomlError::CannotEncodeSurrogateHalf { at, codepoint });
    }
    if codepoint > 0x10ffff {
        return Err(TomlError::CodepointTooLarge { at, codepoint });
    }
    match char::from_u32(codepoint) {
        Some(c) => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            Ok(())
        }
        None => Err(TomlError::CodepointTooLarge { at, codepoint }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn ascii_one_byte() {
        assert_eq!(decode_one(b"a", 0, Forbidden::SINGLE_LINE, pos()).unwrap(), (b'a' as u32, 1));
    }

    #[test]
    fn two_byte_sequence() {
        let bytes = "é".as_bytes();
        let (cp, len) = decode_one(bytes, 0, Forbidden::SINGLE_LINE, pos()).unwrap();
        assert_eq!(len, 2);
        assert_eq!(char::from_u32(cp), Some('é'));
    }

    #[test]
    fn three_byte_sequence() {
        let bytes = "€".as_bytes();
        let (cp, len) = decode_one(bytes, 0, Forbidden::SINGLE_LINE, pos()).unwrap();
        assert_eq!(len, 3);
        assert_eq!(char::from_u32(cp), Some('€'));
    }

    #[test]
    fn four_byte_sequence() {
        let bytes = "𐍈".as_bytes();
        let (cp, len) = decode_one(bytes, 0, Forbidden::SINGLE_LINE, pos()).unwrap();
        assert_eq!(len, 4);
        assert_eq!(char::from_u32(cp), Some('𐍈'));
    }

    #[test]
    fn rejects_overlong_lead() {
        assert!(decode_one(&[0xc0, 0x80], 0, Forbidden::SINGLE_LINE, pos()).is_err());
    }

    #[test]
    fn rejects_lone_continuation_byte() {
        assert!(decode_one(&[0x80], 0, Forbidden::SINGLE_LINE, pos()).is_err());
    }

    #[test]
    fn rejects_bare_cr_in_single_line_context() {
        assert!(decode_one(b"\r", 0, Forbidden::SINGLE_LINE, pos()).is_err());
    }

    #[test]
    fn allows_bare_newline_in_multiline_context() {
        assert!(decode_one(b"\n", 0, Forbidden::MULTI_LINE, pos()).is_ok());
    }

    #[test]
    fn encode_checked_rejects_surrogate_half() {
        assert!(encode_checked(0xd800, pos(), &mut Vec::new()).is_err());
    }

    #[test]
    fn encode_checked_rejects_too_large() {
        assert!(encode_checked(0x110000, pos(), &mut Vec::new()).is_err());
    }

    #[test]
    fn encode_checked_round_trips() {
        let mut out = Vec::new();
        encode_checked('é' as u32, pos(), &mut out).unwrap();
        assert_eq!(out, "é".as_bytes());
    }
}
