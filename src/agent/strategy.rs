//! Pluggable stand-ins for real work
//!
//! [`Attempt`] decides how long a simulated unit takes and whether it
//! succeeds; [`ItemSource`] produces the discovered items. The random
//! versions are the defaults, the scripted ones make tests deterministic.

use crate::item::WorkItem;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Result of one processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Simulated processing of one item
pub trait Attempt: Send {
    /// How long the unit takes before it completes
    fn delay(&mut self, item: &WorkItem) -> Duration;

    /// Whether the unit succeeded, decided at completion time
    fn attempt(&mut self, item: &WorkItem) -> Outcome;
}

/// Producer of discovered items
pub trait ItemSource: Send {
    fn discover(&mut self) -> Vec<WorkItem>;
}

/// Build an RNG from an optional seed, offset per stream
pub fn seeded_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_os_rng(),
    }
}

/// Uniform random delay in `[0, max_delay)` and success with probability `success_rate`
#[derive(Debug)]
pub struct RandomAttempt {
    rng: StdRng,
    max_delay: Duration,
    success_rate: f64,
}

impl RandomAttempt {
    pub fn new(rng: StdRng, max_delay: Duration, success_rate: f64) -> Self {
        Self {
            rng,
            max_delay,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl Attempt for RandomAttempt {
    fn delay(&mut self, _item: &WorkItem) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.random_range(0..max_ms))
    }

    fn attempt(&mut self, _item: &WorkItem) -> Outcome {
        if self.rng.random::<f64>() < self.success_rate {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Fixed delay with the outcome decided by a closure
pub struct ScriptedAttempt<F> {
    delay: Duration,
    decide: F,
}

impl<F> ScriptedAttempt<F>
where
    F: FnMut(&WorkItem) -> Outcome + Send,
{
    pub fn new(delay: Duration, decide: F) -> Self {
        Self { delay, decide }
    }
}

impl<F> Attempt for ScriptedAttempt<F>
where
    F: FnMut(&WorkItem) -> Outcome + Send,
{
    fn delay(&mut self, _item: &WorkItem) -> Duration {
        self.delay
    }

    fn attempt(&mut self, item: &WorkItem) -> Outcome {
        (self.decide)(item)
    }
}

/// Random items: up to `max_items` of them, five lowercase letters, a small integer, now
#[derive(Debug)]
pub struct RandomSource {
    rng: StdRng,
    max_items: usize,
}

impl RandomSource {
    pub fn new(rng: StdRng, max_items: usize) -> Self {
        Self { rng, max_items }
    }

    fn random_name(&mut self) -> String {
        (0..5)
            .map(|_| char::from(b'a' + self.rng.random_range(0..26u8)))
            .collect()
    }
}

impl ItemSource for RandomSource {
    fn discover(&mut self) -> Vec<WorkItem> {
        let count = (self.rng.random::<f64>() * self.max_items as f64).floor() as usize;
        let now = Utc::now();
        (0..count)
            .map(|_| {
                let foo = self.random_name();
                let bar = (self.rng.random::<f64>() * 100.0).floor() as i64;
                WorkItem::new(foo, bar, now)
            })
            .collect()
    }
}

/// Always discovers the same items
#[derive(Debug, Clone, Default)]
pub struct FixedSource {
    items: Vec<WorkItem>,
}

impl FixedSource {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self { items }
    }
}

impl ItemSource for FixedSource {
    fn discover(&mut self) -> Vec<WorkItem> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_attempt_bounds() {
        let mut attempt =
            RandomAttempt::new(seeded_rng(Some(7), 0), Duration::from_millis(50), 0.5);
        let item = WorkItem::new("a", 1, Utc::now());

        for _ in 0..200 {
            assert!(attempt.delay(&item) < Duration::from_millis(50));
        }
    }

    #[test]
    fn test_success_rate_extremes() {
        let item = WorkItem::new("a", 1, Utc::now());
        let mut always = RandomAttempt::new(seeded_rng(Some(1), 0), Duration::ZERO, 1.0);
        let mut never = RandomAttempt::new(seeded_rng(Some(1), 0), Duration::ZERO, 0.0);

        for _ in 0..100 {
            assert_eq!(always.attempt(&item), Outcome::Success);
            assert_eq!(never.attempt(&item), Outcome::Failure);
        }
        assert_eq!(always.delay(&item), Duration::ZERO);
    }

    #[test]
    fn test_random_source_shape() {
        let mut source = RandomSource::new(seeded_rng(Some(42), 0), 50);
        let items = source.discover();

        assert!(items.len() < 50);
        for item in &items {
            assert_eq!(item.foo.len(), 5);
            assert!(item.foo.chars().all(|c| c.is_ascii_lowercase()));
            assert!((0..100).contains(&item.bar));
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = RandomSource::new(seeded_rng(Some(9), 3), 100).discover();
        let b = RandomSource::new(seeded_rng(Some(9), 3), 100).discover();
        let names_a: Vec<_> = a.iter().map(|i| &i.foo).collect();
        let names_b: Vec<_> = b.iter().map(|i| &i.foo).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn test_scripted_attempt() {
        let mut attempt = ScriptedAttempt::new(Duration::from_millis(5), |item: &WorkItem| {
            if item.bar % 2 == 0 {
                Outcome::Success
            } else {
                Outcome::Failure
            }
        });
        let now = Utc::now();
        assert_eq!(attempt.attempt(&WorkItem::new("a", 2, now)), Outcome::Success);
        assert_eq!(attempt.attempt(&WorkItem::new("a", 3, now)), Outcome::Failure);
        assert_eq!(attempt.delay(&WorkItem::new("a", 3, now)), Duration::from_millis(5));
    }
}
