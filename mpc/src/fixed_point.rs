use ndarray::{ArrayD, ArrayViewD};

use crate::{
    error::{MpcError, Result},
    rings::Ring,
};

/// Conversion between reals and fixed-point ring elements: x -> round(x * 2^precision).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPointCodec {
    precision: u32,
}

impl FixedPointCodec {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Number of fractional bits.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Value of one unit in the last place.
    pub fn resolution(&self) -> f64 {
        (-(self.precision as f64)).exp2()
    }

    /// Largest encodable magnitude for ring R (exclusive).
    /// This also bounds every intermediate result in real terms: a product, or a sum of
    /// products such as a matmul entry, carries 2·precision fractional bits before truncation
    /// and stays below 2^(SAFE_BITS-1) only while its real magnitude stays below this value.
    /// Encoding checks single values only; bounding accumulated results is up to the caller.
    pub fn max_magnitude<R: Ring>(&self) -> f64 {
        let bits = R::SAFE_BITS as i32 - 1 - 2 * self.precision as i32;
        (bits as f64).exp2()
    }

    pub fn encode<R: Ring>(&self, value: f64) -> Result<R> {
        let scaled = (value * (self.precision as f64).exp2()).round();
        let limit = ((R::SAFE_BITS as i32 - 1 - self.precision as i32) as f64).exp2();
        if !scaled.is_finite() || scaled.abs() >= limit {
            return Err(MpcError::EncodingOverflow {
                value,
                precision: self.precision,
            });
        }
        Ok(R::from_i128(scaled as i128))
    }

    pub fn decode<R: Ring>(&self, value: R) -> f64 {
        value.to_i128() as f64 * self.resolution()
    }

    pub fn encode_array<R: Ring>(&self, values: ArrayViewD<f64>) -> Result<ArrayD<R>> {
        let encoded = values
            .iter()
            .map(|&x| self.encode(x))
            .collect::<Result<Vec<_>>>()?;
        let len = encoded.len();
        ArrayD::from_shape_vec(values.raw_dim(), encoded)
            .map_err(|_| MpcError::shape_mismatch("encode_array", values.shape(), &[len]))
    }

    pub fn decode_array<R: Ring>(&self, values: ArrayViewD<R>) -> ArrayD<f64> {
        values.mapv(|x| self.decode(x))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::rings::{Z128, Z64};

    #[test]
    fn test_encode_exact() {
        let codec = FixedPointCodec::new(16);
        assert_eq!(codec.encode::<Z64>(3.5).unwrap(), Z64(229376));
        assert_eq!(codec.encode::<Z64>(-2.25).unwrap(), Z64::from_i64(-147456));
        assert_eq!(codec.encode::<Z64>(0.0).unwrap(), Z64(0));
    }

    #[test]
    fn test_roundtrip_within_one_unit() {
        let codec = FixedPointCodec::new(16);
        for value in [3.14159, -7.777, 0.000001, -0.5, 12345.678, -32767.9] {
            let decoded = codec.decode(codec.encode::<Z64>(value).unwrap());
            assert!((decoded - value).abs() <= codec.resolution());
            let decoded = codec.decode(codec.encode::<Z128>(value).unwrap());
            assert!((decoded - value).abs() <= codec.resolution());
        }
    }

    #[test]
    fn test_negative_values_wrap_to_top_of_ring() {
        let codec = FixedPointCodec::new(8);
        let encoded = codec.encode::<Z64>(-1.0).unwrap();
        assert_eq!(encoded, Z64(u64::MAX - 255));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let codec = FixedPointCodec::new(16);
        assert_eq!(codec.max_magnitude::<Z64>(), 32768.0);
        assert!(matches!(
            codec.encode::<Z64>(40000.0),
            Err(MpcError::EncodingOverflow { .. })
        ));
        assert!(codec.encode::<Z128>(40000.0).is_ok());
        assert!(codec.encode::<Z64>(f64::NAN).is_err());
        assert!(codec.encode::<Z64>(f64::INFINITY).is_err());
    }

    #[test]
    fn test_product_bound() {
        let codec = FixedPointCodec::new(16);
        let safe = 1i128 << (Z64::SAFE_BITS - 1);
        let product = codec.encode::<Z64>(100.0).unwrap() * codec.encode::<Z64>(300.0).unwrap();
        assert!(product.to_i128().abs() < safe);
        let product = codec.encode::<Z64>(200.0).unwrap() * codec.encode::<Z64>(300.0).unwrap();
        assert!(product.to_i128().abs() >= safe);
    }

    #[test]
    fn test_arrays() {
        let codec = FixedPointCodec::new(10);
        let values = array![[1.0, -2.5], [0.125, 100.0]].into_dyn();
        let encoded = codec.encode_array::<Z64>(values.view()).unwrap();
        assert_eq!(encoded.shape(), &[2, 2]);
        assert_eq!(codec.decode_array(encoded.view()), values);
    }
}
