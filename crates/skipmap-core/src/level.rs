use rand::RngCore;

/// Draws node heights from a truncated geometric distribution.
///
/// Starting at level 1, each draw from the random source that is divisible by
/// `branching` promotes the node one more level. The first non-divisible draw
/// stops the walk, and so does reaching `max_level`. With `branching == 2`
/// this gives `P(height = h) = 2^-h` for `h < max_level`.
pub(crate) struct LevelGenerator<R> {
    rng: R,
    max_level: usize,
    branching: u32,
}

impl<R: RngCore> LevelGenerator<R> {
    pub(crate) fn new(rng: R, max_level: usize, branching: u32) -> Self {
        debug_assert!(max_level >= 1);
        debug_assert!(branching >= 2);
        LevelGenerator {
            rng,
            max_level,
            branching,
        }
    }

    pub(crate) fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < self.max_level && self.rng.next_u32() % self.branching == 0 {
            level += 1;
        }
        level
    }
}
