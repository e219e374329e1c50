//! Module `util` implement utility types shared across modules.

mod spinlock;

pub use spinlock::Spinlock;

#[cfg(test)]
pub(crate) fn small_rng_from_seed(seed: u128) -> rand::rngs::SmallRng {
    use rand::SeedableRng;

    let mut seed_bytes = <rand::rngs::SmallRng as SeedableRng>::Seed::default();
    let src = seed.to_le_bytes();
    let n = src.len().min(seed_bytes.as_mut().len());
    seed_bytes.as_mut()[..n].copy_from_slice(&src[..n]);
    rand::rngs::SmallRng::from_seed(seed_bytes)
}
