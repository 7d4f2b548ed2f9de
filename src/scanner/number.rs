//! Number and datetime discrimination.
//!
//! TOML's grammar lets a bare `123` keep being a plausible prefix of an
//! integer, a float, or a datetime for several characters, so the scanner
//! reads the whole lexeme once, noting which structural hints it saw along
//! the way, and classifies at the end rather than committing early.

use crate::error::TomlError;
use crate::util::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Integer,
    Float,
    Datetime,
}

fn is_terminator(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'\t' | b'\r' | b'\n' | b'#' | b',' | b']' | b'}' | b'='
    )
}

/// Whether `bytes[i..]` begins with the shape of a local-time (`HH:...`) or
/// a full date (`YYYY-MM-DD...`), where the leading digit is allowed to be
/// `0` (`07:32:00`, `0001-01-01`) without tripping the decimal "no leading
/// zero" rule, which only governs plain integers/floats.
fn is_datetime_shaped(bytes: &[u8], i: usize) -> bool {
    let is_digit = |off: usize| bytes.get(i + off).is_some_and(u8::is_ascii_digit);
    if is_digit(1) && bytes.get(i + 2) == Some(&b':') {
        return true;
    }
    is_digit(1) && is_digit(2) && is_digit(3) && bytes.get(i + 4) == Some(&b'-') && bytes.get(i + 7) == Some(&b'-')
}

/// Whether a space at `bytes[space_at]` is acting as the TOML-permitted
/// date/time separator (spec.md §4.3: "Accepts `T`, `t`, or space as
/// date/time separator") rather than terminating the lexeme -- i.e. it's
/// immediately followed by a two-digit hour and a `:`.
fn looks_like_time_after_space(bytes: &[u8], space_at: usize) -> bool {
    bytes.get(space_at + 1).is_some_and(u8::is_ascii_digit)
        && bytes.get(space_at + 2).is_some_and(u8::is_ascii_digit)
        && bytes.get(space_at + 3) == Some(&b':')
}

/// Scan a number-or-datetime lexeme starting at `bytes[start]`, returning
/// its classification and the exclusive end offset.
///
/// This performs only the lexical classification and the "no leading zero"
/// shape check the scanner is responsible for; range/overflow validation of
/// the decoded value is the tree builder's job.
pub fn scan(bytes: &[u8], start: usize, at: Position) -> Result<(Classification, usize), TomlError> {
    let syntax = |message: &str| TomlError::SyntaxError {
        at,
        message: message.to_string(),
    };

    let mut i = start;
    let len = bytes.len();

    // Leading sign is only legal on decimal int/float, never on 0x/0o/0b.
    let signed = matches!(bytes.get(i), Some(b'+') | Some(b'-'));
    if signed {
        i += 1;
    }

    // inf / nan in any sign combination.
    if bytes[i..].starts_with(b"inf") {
        return Ok((Classification::Float, i + 3));
    }
    if bytes[i..].starts_with(b"nan") {
        return Ok((Classification::Float, i + 3));
    }

    // Based integers: 0x / 0o / 0b. Sign is forbidden here.
    if !signed && bytes.get(i) == Some(&b'0') {
        match bytes.get(i + 1) {
            Some(b'x') | Some(b'o') | Some(b'b') => {
                let mut j = i + 2;
                if j >= len || !is_based_digit(bytes[i + 1], bytes[j]) {
                    return Err(syntax("based integer has no digits"));
                }
                while j < len && (is_based_digit(bytes[i + 1], bytes[j]) || bytes[j] == b'_') {
                    j += 1;
                }
                return Ok((Classification::Integer, j));
            }
            _ => {}
        }
    }

    // Leading-zero rule: a bare `0` must be followed by a terminator, `.`,
    // `e`/`E`, or nothing at all -- never another digit. This only governs
    // plain decimal integers/floats; a lexeme shaped like a time (`07:...`)
    // or a date (`0001-01-01`) is left for the general scan below, whose
    // digit-run is allowed to start with `0` the way any datetime field is.
    if bytes.get(i) == Some(&b'0') && !(!signed && is_datetime_shaped(bytes, i)) {
        match bytes.get(i + 1) {
            None => return Ok((Classification::Integer, i + 1)),
            Some(b) if is_terminator(*b) => return Ok((Classification::Integer, i + 1)),
            Some(b'.') | Some(b'e') | Some(b'E') => {
                // fall through to the general scan below, which will see
                // the '.'/'e' and classify as float.
            }
            Some(b) if b.is_ascii_digit() => {
                return Err(syntax("leading zero not allowed in a number"));
            }
            Some(_) => return Ok((Classification::Integer, i + 1)),
        }
    }

    let digit_start = i;
    let mut saw_dot = false;
    let mut saw_exponent = false;
    let mut saw_colon = false;
    let mut saw_dash_in_body = false;

    while i < len {
        match bytes[i] {
            b'0'..=b'9' | b'_' => i += 1,
            b'.' if !saw_dot && !saw_colon => {
                saw_dot = true;
                i += 1;
            }
            b'e' | b'E' if !saw_exponent && !saw_colon => {
                saw_exponent = true;
                i += 1;
                if matches!(bytes.get(i), Some(b'+') | Some(b'-')) {
                    i += 1;
                }
            }
            b':' => {
                saw_colon = true;
                i += 1;
            }
            b'-' if i > digit_start => {
                // A `-` inside the body (not the leading sign already
                // consumed above) only makes sense as a date separator.
                saw_dash_in_body = true;
                i += 1;
            }
            b'T' | b't' | b'Z' | b'z' | b'+' if saw_dash_in_body || saw_colon => i += 1,
            b' ' if saw_dash_in_body && !saw_colon && looks_like_time_after_space(bytes, i) => {
                // The single space joining a full date to its time-of-day
                // (spec.md §4.3): consumed as a separator, not a terminator,
                // so the lexeme keeps growing into the time component.
                i += 1;
            }
            b if is_terminator(b) => break,
            _ => break,
        }
    }

    if saw_colon || saw_dash_in_body {
        return Ok((Classification::Datetime, i));
    }
    if saw_dot || saw_exponent {
        return Ok((Classification::Float, i));
    }
    Ok((Classification::Integer, i))
}

fn is_based_digit(base_marker: u8, b: u8) -> bool {
    match base_marker {
        b'x' => b.is_ascii_hexdigit(),
        b'o' => (b'0'..=b'7').contains(&b),
        b'b' => b == b'0' || b == b'1',
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn plain_integer() {
        let (c, end) = scan(b"123,", 0, pos()).unwrap();
        assert_eq!(c, Classification::Integer);
        assert_eq!(end, 3);
    }

    #[test]
    fn leading_zero_alone() {
        let (c, end) = scan(b"0\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Integer);
        assert_eq!(end, 1);
    }

    #[test]
    fn leading_zero_followed_by_digit_errors() {
        assert!(scan(b"007\n", 0, pos()).is_err());
    }

    #[test]
    fn hex_integer() {
        let (c, end) = scan(b"0xDEADbeef ", 0, pos()).unwrap();
        assert_eq!(c, Classification::Integer);
        assert_eq!(&b"0xDEADbeef "[..end], b"0xDEADbeef");
    }

    #[test]
    fn float_with_fraction() {
        let (c, _) = scan(b"3.14\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Float);
    }

    #[test]
    fn float_with_exponent() {
        let (c, _) = scan(b"1e10\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Float);
    }

    #[test]
    fn signed_inf_and_nan() {
        assert_eq!(scan(b"+inf,", 0, pos()).unwrap().0, Classification::Float);
        assert_eq!(scan(b"-nan,", 0, pos()).unwrap().0, Classification::Float);
        assert_eq!(scan(b"nan,", 0, pos()).unwrap().0, Classification::Float);
    }

    #[test]
    fn datetime_by_dash() {
        let (c, _) = scan(b"1979-05-27\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Datetime);
    }

    #[test]
    fn datetime_by_colon() {
        let (c, _) = scan(b"07:32:00\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Datetime);
    }

    #[test]
    fn local_time_with_single_digit_leading_hour_zero() {
        // Regression: the leading-zero-digit check must not fire on a time
        // lexeme just because its hour happens to start with `0`.
        for input in [&b"00:00:00\n"[..], &b"07:32:00\n"[..], &b"09:15:00\n"[..]] {
            let (c, _) = scan(input, 0, pos()).unwrap();
            assert_eq!(c, Classification::Datetime);
        }
    }

    #[test]
    fn offset_datetime_with_single_digit_leading_hour_zero() {
        let (c, end) = scan(b"09:15:00Z\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Datetime);
        assert_eq!(&b"09:15:00Z\n"[..end], b"09:15:00Z");
    }

    #[test]
    fn date_with_leading_zero_year_is_not_a_leading_zero_error() {
        let (c, end) = scan(b"0001-01-01\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Datetime);
        assert_eq!(&b"0001-01-01\n"[..end], b"0001-01-01");
    }

    #[test]
    fn space_separated_datetime_consumes_the_whole_lexeme() {
        let (c, end) = scan(b"1979-05-27 07:32:00\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Datetime);
        assert_eq!(&b"1979-05-27 07:32:00\n"[..end], b"1979-05-27 07:32:00");
    }

    #[test]
    fn bare_date_followed_by_a_comment_is_not_mistaken_for_a_space_separator() {
        let (c, end) = scan(b"1979-05-27 # a date\n", 0, pos()).unwrap();
        assert_eq!(c, Classification::Datetime);
        assert_eq!(&b"1979-05-27 # a date\n"[..end], b"1979-05-27");
    }
}
