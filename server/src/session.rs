use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Hands out session keys for accepted registrations.
///
/// The upper half of each key is a counter advanced per key, the lower half
/// is random. Keys are unique until the counter wraps; collisions after that
/// are not detected.
#[derive(Debug)]
pub struct SessionKeys {
    rng: StdRng,
    counter: u32,
    current: u64,
}

impl SessionKeys {
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let counter = rng.gen();

        Self {
            rng,
            counter,
            current: 0,
        }
    }

    pub fn next_key(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(1);
        self.current = (u64::from(self.counter) << 32) | u64::from(self.rng.gen::<u32>());
        self.current
    }

    /// The key most recently handed out, 0 before the first one
    pub fn current(&self) -> u64 {
        self.current
    }
}
