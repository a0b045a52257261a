// ABOUTME: TP-SCTS service-centre timestamp: seven swapped semi-octets plus a quarter-hour zone
// ABOUTME: Rendered in the modem clock format yy/MM/dd,hh:mm:ss±zz

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::fmt;

/// Timestamp as carried in an SMS-DELIVER.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceCentreTimestamp {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Offset from UTC in quarter hours
    pub zone_quarters: i8,
}

fn swapped_bcd(octet: u8) -> u8 {
    (octet & 0x0F) * 10 + (octet >> 4)
}

impl ServiceCentreTimestamp {
    pub const SIZE: usize = 7;

    pub fn from_octets(octets: [u8; Self::SIZE]) -> Self {
        let zone = octets[6];
        // Sign lives in bit 3 of the first semi-octet
        let magnitude = ((zone & 0x07) * 10 + (zone >> 4)) as i8;
        let zone_quarters = if zone & 0x08 != 0 { -magnitude } else { magnitude };

        Self {
            year: swapped_bcd(octets[0]),
            month: swapped_bcd(octets[1]),
            day: swapped_bcd(octets[2]),
            hour: swapped_bcd(octets[3]),
            minute: swapped_bcd(octets[4]),
            second: swapped_bcd(octets[5]),
            zone_quarters,
        }
    }

    /// Calendar time, `None` when a field is out of range.
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(i32::from(self.zone_quarters) * 15 * 60)?;
        NaiveDate::from_ymd_opt(2000 + i32::from(self.year), self.month.into(), self.day.into())?
            .and_hms_opt(self.hour.into(), self.minute.into(), self.second.into())?
            .and_local_timezone(offset)
            .single()
    }
}

impl fmt::Display for ServiceCentreTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:02},{:02}:{:02}:{:02}{}{:02}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            if self.zone_quarters < 0 { '-' } else { '+' },
            self.zone_quarters.unsigned_abs()
        )
    }
}
