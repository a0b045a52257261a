// ABOUTME: SMS-DELIVER PDU decoding from the hex form returned by +CMGR / +CMT
// ABOUTME: Yields service centre, sender, timestamp and text with its encoding tag

use bytes::{Buf, Bytes};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::bus::{Context, Module};
use crate::event::SmsReceived;

pub mod address;
pub mod data_coding;
pub mod gsm7;
pub mod timestamp;

pub use address::{AddressType, NumberingPlan, TypeOfNumber};
pub use data_coding::TextEncoding;
pub use timestamp::ServiceCentreTimestamp;

#[derive(Debug, Error)]
pub enum PduError {
    #[error("PDU is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("PDU truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("User data is not valid UCS-2")]
    InvalidUcs2,
}

/// Every field of a decoded SMS-DELIVER.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPdu {
    /// Service centre number, empty when the PDU carries none
    pub sca_number: String,
    pub sender: String,
    pub sender_type: AddressType,
    pub first_octet: u8,
    pub pid: u8,
    pub dcs: u8,
    pub timestamp: ServiceCentreTimestamp,
    pub encoding: TextEncoding,
    pub text: String,
}

impl From<DecodedPdu> for SmsReceived {
    fn from(pdu: DecodedPdu) -> Self {
        SmsReceived {
            sca_number: pdu.sca_number,
            sender: pdu.sender,
            text: pdu.text,
            encoding: pdu.encoding,
        }
    }
}

/// Decode an 8-bit integer
pub fn decode_u8(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, PduError> {
    if buf.remaining() < 1 {
        return Err(PduError::Truncated { field });
    }
    Ok(buf.get_u8())
}

/// Decode a fixed number of octets
pub fn decode_octets(buf: &mut Cursor<&[u8]>, len: usize, field: &'static str) -> Result<Bytes, PduError> {
    if buf.remaining() < len {
        return Err(PduError::Truncated { field });
    }
    Ok(buf.copy_to_bytes(len))
}

/// Decode a hex SMS-DELIVER PDU, service centre address first.
///
/// ```rust
/// let pdu = sms_modem::pdu::decode(
///     "07915892206747F7040D91181154419181F0000852900341933540046D4B8BD5",
/// )?;
/// assert_eq!(pdu.sca_number, "+85290276747");
/// assert_eq!(pdu.sender, "+8111451419180");
/// assert_eq!(pdu.text, "测试");
/// # Ok::<(), sms_modem::pdu::PduError>(())
/// ```
pub fn decode(pdu: &str) -> Result<DecodedPdu, PduError> {
    let raw = hex::decode(pdu.trim())?;
    let mut buf = Cursor::new(raw.as_slice());

    let sca_length = usize::from(decode_u8(&mut buf, "sca_length")?);
    let sca_number = if sca_length == 0 {
        String::new()
    } else {
        let sca_type = AddressType::from_octet(decode_u8(&mut buf, "sca_type")?);
        let digits = decode_octets(&mut buf, sca_length - 1, "sca_number")?;
        address::decode_address(sca_type, &digits, (sca_length - 1) * 2)
    };

    let first_octet = decode_u8(&mut buf, "first_octet")?;
    let sender_length = usize::from(decode_u8(&mut buf, "sender_length")?);
    let sender_type = AddressType::from_octet(decode_u8(&mut buf, "sender_type")?);
    let sender_digits = decode_octets(&mut buf, sender_length.div_ceil(2), "sender")?;
    let sender = address::decode_address(sender_type, &sender_digits, sender_length);

    let pid = decode_u8(&mut buf, "pid")?;
    let dcs = decode_u8(&mut buf, "dcs")?;

    let mut scts = [0u8; ServiceCentreTimestamp::SIZE];
    if buf.remaining() < scts.len() {
        return Err(PduError::Truncated { field: "timestamp" });
    }
    buf.copy_to_slice(&mut scts);
    let timestamp = ServiceCentreTimestamp::from_octets(scts);

    let udl = usize::from(decode_u8(&mut buf, "udl")?);
    let user_data = buf.chunk();

    let encoding = TextEncoding::from_dcs(dcs);
    debug!(dcs, %encoding, udl, "decoding user data");
    let text = encoding.decode(udl, user_data)?;

    Ok(DecodedPdu {
        sca_number,
        sender,
        sender_type,
        first_octet,
        pid,
        dcs,
        timestamp,
        encoding,
        text,
    })
}

/// Shareable decoder handle registered as `pdu.decode`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PduCodec;

impl PduCodec {
    pub fn decode(&self, pdu: &str) -> Result<DecodedPdu, PduError> {
        decode(pdu)
    }
}

/// Registers the `pdu` node.
pub struct PduModule;

impl Module for PduModule {
    fn name(&self) -> &str {
        "pdu"
    }

    fn apply(&self, ctx: &Arc<Context>) -> crate::Result<()> {
        let node = ctx.register_node("pdu")?;
        node.register_value("decode", PduCodec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "07915892206747F7040D91181154419181F0000852900341933540046D4B8BD5";

    #[test]
    fn decodes_sample_deliver() {
        let pdu = decode(SAMPLE).unwrap();

        assert_eq!(pdu.sca_number, "+85290276747");
        assert_eq!(pdu.sender, "+8111451419180");
        assert_eq!(pdu.first_octet, 0x04);
        assert_eq!(pdu.pid, 0x00);
        assert_eq!(pdu.dcs, 0x08);
        assert_eq!(pdu.encoding, TextEncoding::Ucs2);
        assert_eq!(pdu.text, "测试");
        assert_eq!(pdu.timestamp.to_string(), "25/09/30,14:39:53+04");
    }

    #[test]
    fn decoding_is_deterministic() {
        assert_eq!(decode(SAMPLE).unwrap(), decode(SAMPLE).unwrap());
        assert_eq!(decode(SAMPLE).unwrap(), decode(&SAMPLE.to_lowercase()).unwrap());
    }

    #[test]
    fn gsm7_without_service_centre() {
        let pdu = decode("00040B911316325476F80000993092516195800AE8329BFD4697D9EC37").unwrap();

        assert_eq!(pdu.sca_number, "");
        assert_eq!(pdu.sender, "+31612345678");
        assert_eq!(pdu.encoding, TextEncoding::Gsm7Bit);
        assert_eq!(pdu.text, "hellohello");
    }

    #[test]
    fn ucs2_length_is_in_characters() {
        let pdu = decode("00040B911316325476F80008993092516195800267D16D4B").unwrap();
        assert_eq!(pdu.encoding, TextEncoding::Ucs2);
        assert_eq!(pdu.text, "柑测");
    }

    #[test]
    fn latin1_body() {
        let pdu = decode("00040B911316325476F80004993092516195800548656C6C6F").unwrap();
        assert_eq!(pdu.encoding, TextEncoding::Latin1);
        assert_eq!(pdu.text, "Hello");
    }

    #[test]
    fn unknown_scheme_is_hex() {
        let pdu = decode("00040B911316325476F80018993092516195800348656C").unwrap();
        assert_eq!(pdu.encoding, TextEncoding::Unknown);
        assert_eq!(pdu.text, "48656c");
    }

    #[test]
    fn national_sender_has_no_plus() {
        let pdu = decode("0004048121430004993092516195800548656C6C6F").unwrap();
        assert_eq!(pdu.sender, "1234");
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(decode("07ZZ"), Err(PduError::InvalidHex(_))));
        assert!(matches!(decode("079"), Err(PduError::InvalidHex(_))));
    }

    #[test]
    fn reports_truncated_field() {
        assert!(matches!(decode(""), Err(PduError::Truncated { field: "sca_length" })));
        assert!(matches!(decode("0791589220"), Err(PduError::Truncated { field: "sca_number" })));
        assert!(matches!(
            decode("00040B911316325476F80000993092"),
            Err(PduError::Truncated { field: "timestamp" })
        ));
    }

    #[test]
    fn converts_into_event() {
        let event: SmsReceived = decode(SAMPLE).unwrap().into();
        assert_eq!(event.sender, "+8111451419180");
        assert_eq!(event.encoding, TextEncoding::Ucs2);
    }

    #[test]
    fn module_registers_decoder() {
        let ctx = Context::new();
        ctx.add_module(PduModule).unwrap();

        let codec = ctx.get_value::<PduCodec>("pdu.decode").unwrap();
        assert_eq!(codec.decode(SAMPLE).unwrap().text, "测试");
    }
}
