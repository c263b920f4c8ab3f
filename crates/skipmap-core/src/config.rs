use crate::{Error, Result};

/// Upper bound accepted for `max_level`. A branching factor of 2 would need
/// more than 2^64 elements before this level is expected to be reached.
pub const MAX_LEVEL_LIMIT: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Highest level index any node may reach. Node heights fall in
    /// `1..=max_level`, and the header carries `max_level + 1` links.
    pub max_level: usize,
    /// Reciprocal of the promotion probability. `2` gives the classic
    /// coin-flip distribution.
    pub branching: u32,
    /// Fixed seed for the default random source. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_level: 16,
            branching: 2,
            seed: None,
        }
    }
}

impl Config {
    pub fn new(max_level: usize) -> Self {
        Config {
            max_level,
            ..Default::default()
        }
    }

    pub fn with_branching(mut self, branching: u32) -> Self {
        self.branching = branching;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_level < 1 {
            return Err(Error::InvalidConfig(
                "max_level must be at least 1".to_string(),
            ));
        }

        if self.max_level > MAX_LEVEL_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max_level must not exceed {}",
                MAX_LEVEL_LIMIT
            )));
        }

        if self.branching < 2 {
            return Err(Error::InvalidConfig(
                "branching must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}
