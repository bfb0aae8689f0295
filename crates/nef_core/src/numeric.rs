//! Fixed-point numeric substrate.
//!
//! Every signal value, weight and coefficient is a Q16.16 [`Fixed`]. On the
//! wire a value travels as its raw 32-bit pattern.

use fixed::types::I16F16;

/// Signed Q16.16 fixed-point scalar.
pub type Fixed = I16F16;

/// Reinterpret a fixed-point value as a packet payload word.
#[inline]
pub fn encode_payload(value: Fixed) -> u32 {
    value.to_bits() as u32
}

/// Reinterpret a packet payload word as a fixed-point value.
#[inline]
pub fn decode_payload(payload: u32) -> Fixed {
    Fixed::from_bits(payload as i32)
}

/// Mask applied to a raw accumulator cell; all ones keeps the running sum.
#[inline]
pub fn mask_bits(value: Fixed, mask: u32) -> Fixed {
    Fixed::from_bits((value.to_bits() as u32 & mask) as i32)
}

/// Read a 15-bit unsigned sample as a fraction in [0, 1).
#[inline]
pub fn fraction_from_u15(sample: u32) -> Fixed {
    // 15 fractional bits widened to 16
    Fixed::from_bits(((sample & 0x7fff) << 1) as i32)
}

/// Decay constant of a first-order low-pass filter, `exp(-dt / tau)`.
///
/// A non-positive `tau` means "no filtering": the decay is zero and the
/// filtered value equals the accumulated input each tick.
pub fn lowpass_decay(tau: f64, dt: f64) -> f64 {
    if tau <= 0.0 {
        0.0
    } else {
        libm::exp(-dt / tau)
    }
}

/// Refractory period expressed in whole ticks.
pub fn t_ref_steps(tau_ref: f64, dt: f64) -> u32 {
    if dt <= 0.0 || tau_ref <= 0.0 {
        return 0;
    }
    libm::round(tau_ref / dt) as u32
}

/// Convert a `1 / tau_rc` encoding to the canonical `dt / tau_rc`.
pub fn dt_over_tau_rc_from_one_over(one_over_tau_rc: f64, dt: f64) -> f64 {
    one_over_tau_rc * dt
}

/// Serialise fixed-point fields as floats so configuration files stay readable.
pub mod serde_fixed {
    use super::Fixed;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fixed, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(raw)
            .ok_or_else(|| D::Error::custom("value not representable as Q16.16"))
    }
}

/// As [`serde_fixed`], for optional fields.
pub mod serde_fixed_opt {
    use super::Fixed;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_num::<f64>()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Fixed>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(raw) => Fixed::checked_from_num(raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom("value not representable as Q16.16")),
            None => Ok(None),
        }
    }
}

/// As [`serde_fixed`], for vectors.
pub mod serde_fixed_vec {
    use super::Fixed;
    use alloc::vec::Vec;
    use serde::de::Error;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[Fixed], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&v.to_num::<f64>())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Fixed>, D::Error> {
        let raw = Vec::<f64>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|x| {
                Fixed::checked_from_num(x)
                    .ok_or_else(|| D::Error::custom("value not representable as Q16.16"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        for x in [0.0, 1.0, -1.0, 0.5, -0.25, 123.456, -32768.0] {
            let v = Fixed::from_num(x);
            assert_eq!(decode_payload(encode_payload(v)), v);
        }
        assert_eq!(decode_payload(encode_payload(Fixed::MAX)), Fixed::MAX);
        assert_eq!(decode_payload(encode_payload(Fixed::MIN)), Fixed::MIN);
    }

    #[test]
    fn test_payload_is_raw_bits() {
        assert_eq!(encode_payload(Fixed::ONE), 0x0001_0000);
        assert_eq!(encode_payload(Fixed::from_num(-1)), 0xFFFF_0000);
        assert_eq!(decode_payload(0x0000_8000), Fixed::from_num(0.5));
    }

    #[test]
    fn test_fraction_from_u15() {
        assert_eq!(fraction_from_u15(0), Fixed::ZERO);
        assert_eq!(fraction_from_u15(0x4000), Fixed::from_num(0.5));
        // Upper bits are ignored
        assert_eq!(fraction_from_u15(0xB400), Fixed::from_num(0.40625));
        assert!(fraction_from_u15(0x7fff) < Fixed::ONE);
    }

    #[test]
    fn test_mask_bits() {
        let v = Fixed::from_num(3.25);
        assert_eq!(mask_bits(v, u32::MAX), v);
        assert_eq!(mask_bits(v, 0), Fixed::ZERO);
    }

    #[test]
    fn test_host_side_constants() {
        assert_eq!(lowpass_decay(0.0, 0.001), 0.0);
        let d = lowpass_decay(0.005, 0.001);
        assert!((d - libm::exp(-0.2)).abs() < 1e-12);
        assert_eq!(t_ref_steps(0.002, 0.001), 2);
        assert_eq!(t_ref_steps(0.002, 0.0), 0);
        assert!((dt_over_tau_rc_from_one_over(50.0, 0.001) - 0.05).abs() < 1e-12);
    }
}
