//! Deterministic random distributions for unit tests of the simulation.

#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::cell::Cell;

use rand::distributions::Distribution;

/// This distribution produces values between 0 and `N - 1` by requesting the `next_u32` from the
/// random number generator and applying `mod N` operation on it.
///
/// This is meant for testing, e.g., together with `rand::rngs::mock::StepRng` it can produce
/// predictable values that can be used in unit tests.
pub struct WrappingEchoDistribution<T> {
    size: T,
}

impl<T> WrappingEchoDistribution<T> {
    /// Constructs a new distribution generating values between 0 and `size - 1`.
    pub fn new(size: T) -> Self {
        Self { size }
    }
}

impl<T> Distribution<T> for WrappingEchoDistribution<T>
where
    T: std::convert::TryFrom<u32> + std::ops::Rem<T, Output = T> + Copy,
    <T as std::convert::TryFrom<u32>>::Error: std::fmt::Debug,
{
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> T {
        T::try_from(rng.next_u32()).unwrap() % self.size
    }
}

/// Always returns the same value, ignoring the random number generator.
pub struct ConstantDistribution<T>(T);

impl<T> ConstantDistribution<T> {
    /// Constructs a distribution that always yields `value`.
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: Copy> Distribution<T> for ConstantDistribution<T> {
    fn sample<R: rand::Rng + ?Sized>(&self, _: &mut R) -> T {
        self.0
    }
}

/// Cycles through a fixed list of values, ignoring the random number generator.
///
/// Handy for scripting, e.g., consecutive service times.
pub struct SequenceDistribution<T> {
    values: Vec<T>,
    next: Cell<usize>,
}

impl<T> SequenceDistribution<T> {
    /// Constructs a distribution that yields `values` in order, starting over after the last one.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty.
    pub fn new(values: Vec<T>) -> Self {
        assert!(!values.is_empty(), "sequence must not be empty");
        Self {
            values,
            next: Cell::new(0),
        }
    }
}

impl<T: Copy> Distribution<T> for SequenceDistribution<T> {
    fn sample<R: rand::Rng + ?Sized>(&self, _: &mut R) -> T {
        let idx = self.next.get();
        self.next.set((idx + 1) % self.values.len());
        self.values[idx]
    }
}
