use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

/// Produces unique, randomly suffixed branch labels.
///
/// Seeding the generator makes the whole assembly output reproducible.
#[derive(Debug)]
pub struct LabelGenerator {
    rng: StdRng,
    issued: FxHashSet<String>,
}

impl LabelGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            issued: FxHashSet::default(),
        }
    }

    pub fn fresh(&mut self, prefix: &str) -> String {
        loop {
            let label = format!("{prefix}_{:08x}", self.rng.random::<u32>());
            if self.issued.insert(label.clone()) {
                return label;
            }
        }
    }

    /// Keeps `label` from ever being issued, e.g. for function names.
    pub fn reserve(&mut self, label: &str) {
        self.issued.insert(label.to_string());
    }

    /// Byte handed to the target's random generator at startup.
    pub fn seed_byte(&mut self) -> u8 {
        self.rng.random()
    }
}
