use crate::types::{Mass, Measurement, MeasurementStatus};
use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

/// Frame size in bytes
pub const FRAME_SIZE: usize = 11;

/// Leading byte of every measurement frame
pub const FRAME_SENTINEL: u8 = 0xCF;

/// Wire resolution of impedance (deci-ohms per ohm)
pub const IMPEDANCE_SCALE: f64 = 10.0;

/// Wire resolution of weight (centi-kilograms per kilogram)
pub const WEIGHT_SCALE: f64 = 100.0;

/// Field view of an 11-byte measurement frame before unit scaling
///
/// Layout (little-endian):
///
/// | offset | size | field                      |
/// |--------|------|----------------------------|
/// | 0      | 1    | sentinel `0xCF`            |
/// | 1      | 2    | impedance, deci-ohms       |
/// | 3      | 2    | weight, centi-kilograms    |
/// | 5      | 4    | reserved                   |
/// | 9      | 1    | status code                |
/// | 10     | 1    | checksum (not validated)   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    /// Impedance in deci-ohms
    pub impedance_deci_ohms: u16,
    /// Weight in centi-kilograms
    pub weight_centi_kg: u16,
    /// Unknown bytes, carried through untouched
    pub reserved: [u8; 4],
    /// Status code
    pub status_code: u8,
    /// Trailing checksum byte as sent by the scale
    pub checksum: u8,
}

impl RawFrame {
    /// Split a buffer into frame fields
    ///
    /// Returns `None` unless the buffer is exactly [`FRAME_SIZE`] bytes long and
    /// starts with [`FRAME_SENTINEL`].
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != FRAME_SIZE {
            return None;
        }

        let mut buf = data;
        if buf.get_u8() != FRAME_SENTINEL {
            return None;
        }

        let impedance_deci_ohms = buf.get_u16_le();
        let weight_centi_kg = buf.get_u16_le();
        let mut reserved = [0u8; 4];
        buf.copy_to_slice(&mut reserved);
        let status_code = buf.get_u8();
        let checksum = buf.get_u8();

        Some(Self {
            impedance_deci_ohms,
            weight_centi_kg,
            reserved,
            status_code,
            checksum,
        })
    }

    /// Serialize back to wire bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut buf = BytesMut::with_capacity(FRAME_SIZE);
        buf.put_u8(FRAME_SENTINEL);
        buf.put_u16_le(self.impedance_deci_ohms);
        buf.put_u16_le(self.weight_centi_kg);
        buf.put_slice(&self.reserved);
        buf.put_u8(self.status_code);
        buf.put_u8(self.checksum);

        let mut bytes = [0u8; FRAME_SIZE];
        bytes.copy_from_slice(&buf);
        bytes
    }

    /// Byte-sum of the first ten bytes modulo 256
    ///
    /// The scale's checksum algorithm is unknown; this is a guess used only for
    /// diagnostics and never to reject a frame.
    #[must_use]
    pub fn checksum_hint(&self) -> u8 {
        self.to_bytes()[..FRAME_SIZE - 1]
            .iter()
            .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
    }

    /// Scale the fields into a [`Measurement`]
    #[must_use]
    pub fn measurement(&self) -> Measurement {
        Measurement::new(
            Mass::kilograms(f64::from(self.weight_centi_kg) / WEIGHT_SCALE),
            f64::from(self.impedance_deci_ohms) / IMPEDANCE_SCALE,
            MeasurementStatus::from(self.status_code),
        )
    }
}

/// Decode a measurement frame
///
/// Frames of the wrong length or with the wrong sentinel are not ours and yield
/// `None`. The checksum byte is never validated.
#[must_use]
pub fn decode(data: &[u8]) -> Option<Measurement> {
    let frame = RawFrame::parse(data)?;

    if frame.checksum != frame.checksum_hint() {
        trace!(
            "Frame checksum {:02X} differs from byte-sum {:02X}: {:02X?}",
            frame.checksum,
            frame.checksum_hint(),
            data
        );
    }

    Some(frame.measurement())
}

/// Encode a measurement into a synthetic frame
///
/// Values are rounded to wire precision and saturated to the 16-bit field range.
/// Reserved bytes are zero and the checksum byte carries [`RawFrame::checksum_hint`].
#[must_use]
pub fn encode(measurement: &Measurement) -> [u8; FRAME_SIZE] {
    let mut frame = RawFrame {
        impedance_deci_ohms: to_wire(measurement.impedance * IMPEDANCE_SCALE),
        weight_centi_kg: to_wire(measurement.weight.as_kilograms() * WEIGHT_SCALE),
        reserved: [0; 4],
        status_code: measurement.status.into(),
        checksum: 0,
    };
    frame.checksum = frame.checksum_hint();
    frame.to_bytes()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_wire(value: f64) -> u16 {
    value.round().clamp(0.0, f64::from(u16::MAX)) as u16
}
