/// Source of the bounded random draws behind store selection.
///
/// Plug in a scripted implementation to make selection deterministic in
/// tests.
///
/// # Example
/// ```
/// use segseq::RandSource;
///
/// struct FixedRand;
/// impl RandSource for FixedRand {
///     fn below(&self, upper: u64) -> u64 {
///         upper - 1
///     }
/// }
///
/// let rng = FixedRand;
/// assert_eq!(rng.below(30), 29);
/// ```
pub trait RandSource {
    /// Returns a uniformly distributed integer in `[0, upper)`. Callers never
    /// pass `upper == 0`.
    fn below(&self, upper: u64) -> u64;
}
