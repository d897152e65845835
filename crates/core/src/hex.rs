//! Hex-dump program loader.
//!
//! Accepts free-form text of hexadecimal byte pairs separated by whitespace
//! or commas, e.g. `D5 F2 E0` or `D5F2E0`. A `;` starts a comment running to
//! the end of the line. An origin directive `*=$ADDR` (also `*=0xADDR`,
//! `*= ADDR`) moves the load address; bytes before the first directive load
//! at 0x000. Loading wraps at the end of ROM.

/// Program loading failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("cannot load while a program is active; reset first")]
    ProgramActive,
    #[error("line {line}: invalid byte '{token}'")]
    InvalidByte { line: usize, token: String },
    #[error("line {line}: invalid origin '{token}'")]
    InvalidOrigin { line: usize, token: String },
}

/// Parse a hex dump into `rom`.
///
/// Returns the number of bytes written.
pub fn parse_hex_dump(text: &str, rom: &mut [u8]) -> Result<usize, LoadError> {
    if rom.is_empty() {
        return Ok(0);
    }
    let mut addr = 0usize;
    let mut written = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split(';').next().unwrap_or("");
        let mut tokens = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty());

        while let Some(tok) = tokens.next() {
            if let Some(rest) = tok.strip_prefix("*=") {
                // `*=` may stand alone with the address in the next token
                let operand = if rest.is_empty() { tokens.next().unwrap_or("") } else { rest };
                let origin = parse_number(operand).ok_or_else(|| LoadError::InvalidOrigin {
                    line: line_no,
                    token: operand.to_string(),
                })?;
                addr = origin as usize % rom.len();
                log::debug!("origin 0x{:03X} (line {})", addr, line_no);
                continue;
            }

            let bytes = hex_token_to_bytes(tok).ok_or_else(|| LoadError::InvalidByte {
                line: line_no,
                token: tok.to_string(),
            })?;
            for b in bytes {
                rom[addr] = b;
                addr = (addr + 1) % rom.len();
                written += 1;
            }
        }
    }

    Ok(written)
}

/// Hex address with optional `$` or `0x` prefix.
fn parse_number(s: &str) -> Option<u32> {
    let digits = s
        .strip_prefix('$')
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Convert a run of hex character pairs to bytes.
fn hex_token_to_bytes(tok: &str) -> Option<Vec<u8>> {
    let digits = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")).unwrap_or(tok);
    let chars = digits.as_bytes();
    if chars.is_empty() || chars.len() % 2 != 0 {
        return None;
    }
    chars
        .chunks(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ROM_SIZE;

    #[test]
    fn test_parse_simple_dump() {
        let mut rom = vec![0u8; ROM_SIZE];
        let size = parse_hex_dump("D5 F2 E0\n", &mut rom).unwrap();
        assert_eq!(size, 3);
        assert_eq!(&rom[..3], &[0xD5, 0xF2, 0xE0]);
    }

    #[test]
    fn test_packed_pairs_and_commas() {
        let mut rom = vec![0u8; ROM_SIZE];
        let size = parse_hex_dump("2095,21E0 ; load and store\n", &mut rom).unwrap();
        assert_eq!(size, 4);
        assert_eq!(&rom[..4], &[0x20, 0x95, 0x21, 0xE0]);
    }

    #[test]
    fn test_origin_directives() {
        let mut rom = vec![0u8; ROM_SIZE];
        let text = "*=$100\nD1\n*= 0x200 D2\n*= $300\nD3";
        assert_eq!(parse_hex_dump(text, &mut rom).unwrap(), 3);
        assert_eq!(rom[0x100], 0xD1);
        assert_eq!(rom[0x200], 0xD2);
        assert_eq!(rom[0x300], 0xD3);
    }

    #[test]
    fn test_wraps_at_end_of_rom() {
        let mut rom = vec![0u8; ROM_SIZE];
        parse_hex_dump("*=$FFF AA BB", &mut rom).unwrap();
        assert_eq!(rom[0xFFF], 0xAA);
        assert_eq!(rom[0x000], 0xBB);
    }

    #[test]
    fn test_comment_only_is_empty() {
        let mut rom = vec![0u8; ROM_SIZE];
        assert_eq!(parse_hex_dump("; nothing here\n\n", &mut rom).unwrap(), 0);
    }

    #[test]
    fn test_invalid_byte() {
        let mut rom = vec![0u8; ROM_SIZE];
        let err = parse_hex_dump("D5\nZZ", &mut rom).unwrap_err();
        assert_eq!(err, LoadError::InvalidByte { line: 2, token: "ZZ".into() });
        assert!(parse_hex_dump("ABC", &mut rom).is_err());
    }

    #[test]
    fn test_invalid_origin() {
        let mut rom = vec![0u8; ROM_SIZE];
        let err = parse_hex_dump("*=$XYZ", &mut rom).unwrap_err();
        assert!(matches!(err, LoadError::InvalidOrigin { line: 1, .. }));
    }
}
