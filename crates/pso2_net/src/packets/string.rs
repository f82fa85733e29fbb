use widestring::{U16Str, U16String};

/// Decode a NUL padded UTF-16 field.
pub fn decode_fixed_string(units: &[u16]) -> String {
    let end = units.iter().position(|unit| *unit == 0).unwrap_or(units.len());
    U16Str::from_slice(&units[..end]).to_string_lossy()
}

/// Store `value` in a UTF-16 field, truncating it and padding the rest with NULs.
pub fn encode_fixed_string(value: &str, units: &mut [u16]) {
    let encoded = U16String::from_str(value);
    let len = encoded.len().min(units.len());
    units[..len].copy_from_slice(&encoded.as_slice()[..len]);
    units[len..].fill(0);
}

/// Encode a length prefixed UTF-16 string, with the length obfuscated the way the packet expects it.
pub fn encode_variable_string(value: &str, xor: u32, sub: u32) -> Vec<u8> {
    let units = U16String::from_str(value).into_vec();
    let count = units.len() as u32 + 1;

    let mut data = Vec::with_capacity(4 + count as usize * 2);
    data.extend_from_slice(&(xor ^ count.wrapping_add(sub)).to_le_bytes());
    for unit in units.iter().chain(&[0]) {
        data.extend_from_slice(&unit.to_le_bytes());
    }
    data
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fixed_fields() {
        let mut field = [0xFFFF; 6];
        encode_fixed_string("Ship01", &mut field);
        assert_eq!(decode_fixed_string(&field), "Ship01");

        encode_fixed_string("Ship", &mut field);
        assert_eq!(field[4..], [0, 0]);
        assert_eq!(decode_fixed_string(&field), "Ship");

        encode_fixed_string("much too long", &mut field);
        assert_eq!(decode_fixed_string(&field), "much t");
    }

    #[test]
    fn variable_string() {
        #[rustfmt::skip]
        let expected = [
            0x05, 0x00, 0x00, 0x00,
            0x41, 0x00, 0x42, 0x00,
            0x00, 0x00,
        ];
        assert_eq!(encode_variable_string("AB", 0, 2), expected);

        let obfuscated = encode_variable_string("AB", 0x7C, 0);
        assert_eq!(obfuscated[..4], (0x7Cu32 ^ 3).to_le_bytes());
    }
}
