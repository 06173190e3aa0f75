use bytes::{BufMut, Bytes, BytesMut};

pub const WAV_HEADER_LEN: usize = 44;

/// Chunk sizes are not known in advance for a live stream; players treat
/// the all-ones placeholder as "read until the connection closes".
const UNKNOWN_SIZE: u32 = 0xFFFF_FFFF;

/// Builds the one-time streaming WAV header sent before any audio bytes:
/// RIFF/WAVE markers, a 16-byte PCM format sub-chunk, and a `data`
/// sub-chunk header with placeholder sizes. No trailing chunk ever follows.
pub fn streaming_wav_header(sample_rate: u32, channels: u16) -> Bytes {
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN);
    buf.put_slice(b"RIFF");
    buf.put_u32_le(UNKNOWN_SIZE);
    buf.put_slice(b"WAVE");

    buf.put_slice(b"fmt ");
    buf.put_u32_le(16); // PCM format sub-chunk size
    buf.put_u16_le(1); // format code: uncompressed PCM
    buf.put_u16_le(channels);
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(byte_rate);
    buf.put_u16_le(block_align);
    buf.put_u16_le(bits_per_sample);

    buf.put_slice(b"data");
    buf.put_u32_le(UNKNOWN_SIZE);

    buf.freeze()
}
