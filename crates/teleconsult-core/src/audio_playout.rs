use std::collections::VecDeque;
use std::sync::Mutex;

/// Sample rate remote audio is decoded at.
pub const PLAYOUT_SAMPLE_RATE: u32 = 48_000;
/// Remote audio is mixed down to mono.
pub const PLAYOUT_CHANNELS: u32 = 1;

/// Bounded FIFO of decoded remote audio (i16 PCM) awaiting the speaker.
///
/// Every subscribed remote audio track pushes into the same buffer; the
/// shell's audio output pulls from it. When the consumer falls behind the
/// oldest samples are dropped so latency never exceeds the capacity.
pub struct AudioPlayoutBuffer {
    samples: Mutex<VecDeque<i16>>,
    capacity: usize,
}

impl AudioPlayoutBuffer {
    /// Buffer holding up to two seconds of playout audio.
    pub fn new() -> Self {
        Self::with_capacity((PLAYOUT_SAMPLE_RATE * PLAYOUT_CHANNELS * 2) as usize)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples waiting to be played.
    pub fn buffered(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn push_samples(&self, input: &[i16]) {
        let mut samples = self.samples.lock().unwrap();
        // Only the newest `capacity` samples of a large push can survive.
        let input = &input[input.len().saturating_sub(self.capacity)..];
        let overflow = (samples.len() + input.len()).saturating_sub(self.capacity);
        samples.drain(..overflow);
        samples.extend(input.iter().copied());
    }

    /// Fill `out` from the buffer, padding with silence.
    ///
    /// Returns how many real samples were written.
    pub fn pull_samples(&self, out: &mut [i16]) -> usize {
        let mut samples = self.samples.lock().unwrap();
        let available = samples.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(samples.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0);
        available
    }

    pub fn clear(&self) {
        self.samples.lock().unwrap().clear();
    }
}

impl Default for AudioPlayoutBuffer {
    fn default() -> Self {
        Self::new()
    }
}
