use bytes::{BufMut, Bytes, BytesMut};

/// Packs samples into the canonical wire frame: each i16 as two bytes,
/// least-significant first, in sample order. The result is shared
/// read-only by every broadcaster of one dispatch.
pub fn encode_frame(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(sample);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_little_endian_in_order() {
        let encoded = encode_frame(&[0x1234, -2, 0]);
        assert_eq!(&encoded[..], &[0x34, 0x12, 0xFE, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn length_is_two_bytes_per_sample() {
        assert_eq!(encode_frame(&[0; 1024]).len(), 2048);
        assert!(encode_frame(&[]).is_empty());
    }
}
