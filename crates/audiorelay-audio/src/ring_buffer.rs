use rtrb::{Consumer, Producer, RingBuffer};

/// SPSC sample buffer between the device callback and the capture pump.
pub struct AudioRingBuffer {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl AudioRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        (
            AudioProducer {
                inner: self.producer,
            },
            AudioConsumer {
                inner: self.consumer,
            },
        )
    }
}

pub struct AudioProducer {
    inner: Producer<i16>,
}

impl AudioProducer {
    /// Writes as many samples as currently fit, returning the count written.
    /// Called from the real-time device callback, so it never blocks.
    pub fn write(&mut self, samples: &[i16]) -> usize {
        let n = samples.len().min(self.inner.slots());
        if n == 0 {
            return 0;
        }
        match self.inner.write_chunk_uninit(n) {
            Ok(chunk) => chunk.fill_from_iter(samples[..n].iter().copied()),
            Err(_) => 0,
        }
    }
}

pub struct AudioConsumer {
    inner: Consumer<i16>,
}

impl AudioConsumer {
    /// Number of samples ready to read.
    pub fn slots(&self) -> usize {
        self.inner.slots()
    }

    /// Fills `out` completely, or reads nothing and returns false.
    pub fn read_exact(&mut self, out: &mut [i16]) -> bool {
        let chunk = match self.inner.read_chunk(out.len()) {
            Ok(chunk) => chunk,
            Err(_) => return false,
        };
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..].copy_from_slice(second);
        chunk.commit_all();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trip() {
        let (mut prod, mut cons) = AudioRingBuffer::new(16).split();
        let samples = [1i16, -2, 3, -4];
        assert_eq!(prod.write(&samples), 4);
        assert_eq!(cons.slots(), 4);

        let mut out = [0i16; 4];
        assert!(cons.read_exact(&mut out));
        assert_eq!(out, samples);
        assert_eq!(cons.slots(), 0);
    }

    #[test]
    fn read_exact_fails_short_of_a_frame() {
        let (mut prod, mut cons) = AudioRingBuffer::new(16).split();
        prod.write(&[1, 2, 3]);
        let mut out = [0i16; 4];
        assert!(!cons.read_exact(&mut out));
        // The partial data is still there for a later, larger read.
        assert_eq!(cons.slots(), 3);
    }

    #[test]
    fn write_is_bounded_by_capacity() {
        let (mut prod, _cons) = AudioRingBuffer::new(4).split();
        assert_eq!(prod.write(&[0i16; 10]), 4);
        assert_eq!(prod.write(&[0i16; 10]), 0);
    }

    #[test]
    fn wrap_around_preserves_order() {
        let (mut prod, mut cons) = AudioRingBuffer::new(4).split();
        prod.write(&[1, 2, 3]);
        let mut out = [0i16; 2];
        assert!(cons.read_exact(&mut out));
        assert_eq!(out, [1, 2]);

        // This write wraps past the end of the buffer.
        prod.write(&[4, 5, 6]);
        let mut out = [0i16; 4];
        assert!(cons.read_exact(&mut out));
        assert_eq!(out, [3, 4, 5, 6]);
    }
}
