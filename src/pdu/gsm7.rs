// ABOUTME: GSM 03.38 default alphabet and LSB-first septet unpacking
// ABOUTME: Extension table escapes (0x1B) are not interpreted

/// GSM 7-bit default alphabet, indexed by septet value.
pub const GSM7_TABLE: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '€', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Octets needed to hold `septets` packed septets.
pub fn packed_len(septets: usize) -> usize {
    (septets * 7).div_ceil(8)
}

/// Unpack `septets` characters from `data`.
///
/// Septet `i` starts at bit `7 * i`, least significant bit first. Callers
/// check that `data` holds at least [`packed_len`] octets; missing bits read
/// as zero.
pub fn unpack(data: &[u8], septets: usize) -> String {
    (0..septets)
        .map(|i| {
            let index = (i * 7) / 8;
            let shift = (i * 7) % 8;
            let low = data.get(index).copied().unwrap_or(0) >> shift;
            let high = if shift > 1 {
                data.get(index + 1).copied().unwrap_or(0) << (8 - shift)
            } else {
                0
            };
            GSM7_TABLE[usize::from((low | high) & 0x7F)]
        })
        .collect()
}
