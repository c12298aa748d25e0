use crate::emotion::{ProbabilityVector, EMOTION_COUNT, PERCENT_TOTAL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEED_DOMINANT_MIN: f64 = 60.0;
const SEED_DOMINANT_MAX: f64 = 90.0;
const SEED_OTHER_MAX: f64 = 10.0;
const DRIFT: f64 = 7.5;

/// One step of the simulated emotion trajectory.
///
/// With no previous vector (or an all-zero one) a random category is seeded
/// as dominant with a raw weight in `[60, 90)` against `[0, 10)` for the
/// others, and the seed is rescaled to sum 100. Otherwise every value drifts
/// by up to ±7.5 points, is clamped to `[0, 100]` and the vector is rescaled
/// to sum 100.
pub fn simulate_step<R: Rng + ?Sized>(
    previous: Option<&ProbabilityVector>,
    rng: &mut R,
) -> ProbabilityVector {
    match previous {
        Some(prev) if !prev.is_all_zero() => drift(prev, rng),
        _ => seed(rng),
    }
}

fn seed<R: Rng + ?Sized>(rng: &mut R) -> ProbabilityVector {
    let dominant = rng.random_range(0..EMOTION_COUNT);
    let mut values = [0.0; EMOTION_COUNT];
    for (i, v) in values.iter_mut().enumerate() {
        *v = if i == dominant {
            rng.random_range(SEED_DOMINANT_MIN..SEED_DOMINANT_MAX)
        } else {
            rng.random_range(0.0..SEED_OTHER_MAX)
        };
    }
    ProbabilityVector::normalized(values)
}

fn drift<R: Rng + ?Sized>(prev: &ProbabilityVector, rng: &mut R) -> ProbabilityVector {
    let mut values = *prev.values();
    for v in values.iter_mut() {
        let change = rng.random_range(-DRIFT..DRIFT);
        *v = (*v + change).clamp(0.0, PERCENT_TOTAL);
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return ProbabilityVector::uniform();
    }
    ProbabilityVector::from_values(values.map(|v| v / total * PERCENT_TOTAL))
}

/// Stateless apart from its random source: the trajectory is carried by the
/// vector the caller feeds back in.
pub struct EmotionSimulator {
    rng: StdRng,
}

impl EmotionSimulator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn step(&mut self, previous: Option<&ProbabilityVector>) -> ProbabilityVector {
        simulate_step(previous, &mut self.rng)
    }
}

impl Default for EmotionSimulator {
    fn default() -> Self {
        Self::new()
    }
}
