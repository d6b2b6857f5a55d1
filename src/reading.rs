//! # Sensor payload decoding.
//!
//! Each notification carries one fixed 5-byte record:
//!
//! ```text
//!  byte:  0    1    2    3    4
//!        [T lo T hi][ H ][V lo V hi]
//!
//!  T: u16 LE, hundredths of a degree
//!  H: u8, percent relative humidity
//!  V: u16 LE, millivolts
//! ```

use std::fmt;

use crate::error::ProtocolError;

/// Fixed payload length in bytes.
pub const PAYLOAD_LEN: usize = 5;

/// One decoded sensor record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Degrees, two decimal places.
    pub temperature: f64,
    /// Relative humidity, whole percent.
    pub humidity: f64,
    /// Battery voltage in volts.
    pub voltage: f64,
}

impl Reading {
    /// Battery charge derived from [`Reading::voltage`].
    pub fn battery_percent(&self) -> f64 {
        battery_percent(self.voltage)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "temperature={:.2} humidity={:.0} voltage={:.3}",
            self.temperature, self.humidity, self.voltage
        )
    }
}

/// Decodes a notification payload.
///
/// # Example
/// ```
/// use radiovisor::reading::decode;
///
/// let r = decode(&[0xE8, 0x03, 0x32, 0x88, 0x13]).unwrap();
/// assert_eq!((r.temperature, r.humidity, r.voltage), (10.0, 50.0, 5.0));
/// ```
pub fn decode(payload: &[u8]) -> Result<Reading, ProtocolError> {
    let &[t0, t1, h, v0, v1] = payload else {
        return Err(ProtocolError::InvalidLength {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    };

    Ok(Reading {
        temperature: f64::from(u16::from_le_bytes([t0, t1])) / 100.0,
        humidity: f64::from(h),
        voltage: f64::from(u16::from_le_bytes([v0, v1])) / 1000.0,
    })
}

/// Maps battery voltage to a charge percentage.
///
/// 2.1 V is 0 %, 3.1 V and above is 100 %. Clamped above, not below.
/// Rounded to two decimal places.
pub fn battery_percent(voltage: f64) -> f64 {
    (((voltage - 2.1) * 100.0).min(100.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_payload() {
        let r = decode(&[0xE8, 0x03, 0x32, 0x88, 0x13]).unwrap();
        assert_eq!(r.temperature, 10.0);
        assert_eq!(r.humidity, 50.0);
        assert_eq!(r.voltage, 5.0);
    }

    #[test]
    fn keeps_two_decimal_temperature() {
        // 0x0929 = 2345 → 23.45
        let r = decode(&[0x29, 0x09, 0x2D, 0x0C, 0x0B]).unwrap();
        assert_eq!(r.temperature, 23.45);
        assert_eq!(r.humidity, 45.0);
        assert_eq!(r.voltage, 2.828);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            decode(&[0xE8, 0x03, 0x32, 0x88]),
            Err(ProtocolError::InvalidLength {
                expected: 5,
                actual: 4
            })
        );
        assert!(decode(&[0; 6]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn battery_percent_bounds() {
        assert_eq!(battery_percent(2.1), 0.0);
        assert_eq!(battery_percent(3.1), 100.0);
        assert_eq!(battery_percent(3.5), 100.0);
        assert_eq!(battery_percent(2.6), 50.0);
    }

    #[test]
    fn battery_percent_not_clamped_below() {
        assert!(battery_percent(2.0) < 0.0);
    }
}
