// ABOUTME: Address type octet (TON/NPI) and semi-octet number decoding
// ABOUTME: Covers service-centre and originating addresses of SMS-DELIVER

use num_enum::TryFromPrimitive;
use std::fmt;

use super::gsm7;

/// Type of number, bits 6..4 of the address type octet.
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeOfNumber {
    Unknown = 0b000,
    International = 0b001,
    National = 0b010,
    NetworkSpecific = 0b011,
    SubscriberNumber = 0b100,
    Alphanumeric = 0b101,
    Abbreviated = 0b110,
    Reserved = 0b111,
}

/// Numbering plan identification, bits 3..0 of the address type octet.
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NumberingPlan {
    Unknown = 0b0000,
    Isdn = 0b0001,
    Data = 0b0011,
    Telex = 0b0100,
    ServiceCentreSpecific = 0b0101,
    ServiceCentreSpecific2 = 0b0110,
    National = 0b1000,
    Private = 0b1001,
    Ermes = 0b1010,
    Reserved = 0b1111,
}

/// Decoded address type octet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressType {
    pub raw: u8,
    pub type_of_number: TypeOfNumber,
    pub numbering_plan: Option<NumberingPlan>,
}

impl AddressType {
    /// The `0x91` octet: international ISDN number.
    pub const INTERNATIONAL: u8 = 0x91;

    pub fn from_octet(raw: u8) -> Self {
        let ton = (raw >> 4) & 0b111;
        Self {
            raw,
            // Three bits cover every variant
            type_of_number: TypeOfNumber::try_from(ton).unwrap_or(TypeOfNumber::Reserved),
            numbering_plan: NumberingPlan::try_from(raw & 0x0F).ok(),
        }
    }

    /// Whether the number is rendered with a leading `+`.
    pub fn is_international(&self) -> bool {
        self.raw == Self::INTERNATIONAL
    }

    pub fn is_alphanumeric(&self) -> bool {
        self.type_of_number == TypeOfNumber::Alphanumeric
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({:?})", self.raw, self.type_of_number)
    }
}

fn semi_octet_char(nibble: u8) -> char {
    match nibble {
        0..=9 => char::from(b'0' + nibble),
        0xA => '*',
        0xB => '#',
        0xC => 'a',
        0xD => 'b',
        0xE => 'c',
        _ => 'F',
    }
}

/// Decode swapped semi-octets, low nibble first.
///
/// At most `max_digits` characters are kept, then a single trailing `F`
/// filler is dropped.
pub fn decode_semi_octets(octets: &[u8], max_digits: usize) -> String {
    let mut digits: String = octets
        .iter()
        .flat_map(|octet| [octet & 0x0F, octet >> 4])
        .map(semi_octet_char)
        .take(max_digits)
        .collect();
    if digits.ends_with('F') {
        digits.pop();
    }
    digits
}

/// Render a decoded address body.
///
/// `semi_octets` is the useful length in semi-octets, as carried by the
/// originating address length field.
pub fn decode_address(address_type: AddressType, octets: &[u8], semi_octets: usize) -> String {
    if address_type.is_alphanumeric() {
        return gsm7::unpack(octets, semi_octets * 4 / 7);
    }

    let number = decode_semi_octets(octets, semi_octets);
    if address_type.is_international() {
        format!("+{number}")
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_octet() {
        let international = AddressType::from_octet(0x91);
        assert_eq!(international.type_of_number, TypeOfNumber::International);
        assert_eq!(international.numbering_plan, Some(NumberingPlan::Isdn));
        assert!(international.is_international());

        let alpha = AddressType::from_octet(0xD0);
        assert!(alpha.is_alphanumeric());
        assert!(!alpha.is_international());
    }

    #[test]
    fn swaps_nibbles_and_drops_filler() {
        let octets = [0x58, 0x92, 0x20, 0x67, 0x47, 0xF7];
        assert_eq!(decode_semi_octets(&octets, 12), "85290276747");
    }

    #[test]
    fn truncates_to_digit_count() {
        let octets = [0x18, 0x11, 0x54, 0x41, 0x91, 0x81, 0xF0];
        assert_eq!(decode_semi_octets(&octets, 13), "8111451419180");
    }

    #[test]
    fn maps_extended_semi_octets() {
        assert_eq!(decode_semi_octets(&[0xBA, 0xDC, 0xFE], 6), "*#abc");
    }

    #[test]
    fn national_number_has_no_plus() {
        let address_type = AddressType::from_octet(0x81);
        assert_eq!(decode_address(address_type, &[0x21, 0x43], 4), "1234");
    }

    #[test]
    fn alphanumeric_sender_is_unpacked() {
        // "hello" packed is E8329BFD06, 10 semi-octets used
        let address_type = AddressType::from_octet(0xD0);
        let octets = hex::decode("E8329BFD06").unwrap();
        assert_eq!(decode_address(address_type, &octets, 10), "hello");
    }
}
