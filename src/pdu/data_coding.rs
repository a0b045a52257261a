// ABOUTME: Text encodings selected by the TP-DCS octet and their user-data decoders
// ABOUTME: Unrecognised schemes fall back to a lowercase hex dump instead of failing

use std::fmt;

use super::gsm7;
use super::PduError;

/// Character encoding of a decoded message body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Ucs2,
    Gsm7Bit,
    Latin1,
    /// Body is the raw user data as lowercase hex
    Unknown,
}

impl TextEncoding {
    /// Classify a TP-DCS octet.
    pub fn from_dcs(dcs: u8) -> Self {
        if dcs == 0x08 {
            TextEncoding::Ucs2
        } else if dcs & 0x0C == 0x00 {
            TextEncoding::Gsm7Bit
        } else if dcs & 0x0C == 0x04 {
            TextEncoding::Latin1
        } else {
            TextEncoding::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Ucs2 => "UCS2",
            TextEncoding::Gsm7Bit => "GSM7BIT",
            TextEncoding::Latin1 => "LATIN1",
            TextEncoding::Unknown => "NULL",
        }
    }

    /// Decode user data.
    ///
    /// `udl` counts septets for GSM 7-bit, UCS-2 code units for UCS-2 and
    /// octets otherwise.
    pub fn decode(&self, udl: usize, user_data: &[u8]) -> Result<String, PduError> {
        match self {
            TextEncoding::Ucs2 => {
                let octets = &user_data[..(udl * 2).min(user_data.len())];
                if octets.len() % 2 != 0 {
                    return Err(PduError::InvalidUcs2);
                }
                let units = octets
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .collect::<Result<String, _>>()
                    .map_err(|_| PduError::InvalidUcs2)
            }
            TextEncoding::Gsm7Bit => {
                if user_data.len() < gsm7::packed_len(udl) {
                    return Err(PduError::Truncated { field: "user_data" });
                }
                Ok(gsm7::unpack(user_data, udl))
            }
            TextEncoding::Latin1 => Ok(user_data[..udl.min(user_data.len())]
                .iter()
                .map(|&b| char::from(b))
                .collect()),
            TextEncoding::Unknown => Ok(hex::encode(user_data)),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_dcs() {
        assert_eq!(TextEncoding::from_dcs(0x00), TextEncoding::Gsm7Bit);
        assert_eq!(TextEncoding::from_dcs(0x08), TextEncoding::Ucs2);
        assert_eq!(TextEncoding::from_dcs(0x04), TextEncoding::Latin1);
        assert_eq!(TextEncoding::from_dcs(0xF4), TextEncoding::Latin1);
        assert_eq!(TextEncoding::from_dcs(0x18), TextEncoding::Unknown);
        // Class bits alone keep the default alphabet
        assert_eq!(TextEncoding::from_dcs(0x10), TextEncoding::Gsm7Bit);
    }

    #[test]
    fn tags() {
        assert_eq!(TextEncoding::Ucs2.to_string(), "UCS2");
        assert_eq!(TextEncoding::Gsm7Bit.to_string(), "GSM7BIT");
        assert_eq!(TextEncoding::Latin1.to_string(), "LATIN1");
        assert_eq!(TextEncoding::Unknown.to_string(), "NULL");
    }

    #[test]
    fn ucs2_big_endian() {
        let text = TextEncoding::Ucs2.decode(4, &[0x6D, 0x4B, 0x8B, 0xD5]).unwrap();
        assert_eq!(text, "测试");
    }

    #[test]
    fn ucs2_length_counts_characters() {
        let text = TextEncoding::Ucs2.decode(2, &[0x67, 0xD1, 0x6D, 0x4B]).unwrap();
        assert_eq!(text, "柑测");

        let text = TextEncoding::Ucs2.decode(1, &[0x67, 0xD1, 0x6D, 0x4B]).unwrap();
        assert_eq!(text, "柑");
    }

    #[test]
    fn ucs2_rejects_lone_surrogate() {
        let err = TextEncoding::Ucs2.decode(2, &[0xD8, 0x00]).unwrap_err();
        assert!(matches!(err, PduError::InvalidUcs2));
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        let text = TextEncoding::Latin1.decode(3, &[0x48, 0xE9, 0x21]).unwrap();
        assert_eq!(text, "Hé!");
    }

    #[test]
    fn gsm7_short_user_data() {
        let err = TextEncoding::Gsm7Bit.decode(10, &[0xE8, 0x32]).unwrap_err();
        assert!(matches!(err, PduError::Truncated { field: "user_data" }));
    }

    #[test]
    fn unknown_is_hex_dump() {
        let text = TextEncoding::Unknown.decode(2, &[0xAB, 0x01]).unwrap();
        assert_eq!(text, "ab01");
    }
}
