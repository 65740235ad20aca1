use rand::distr::Alphanumeric;
use rand::Rng;

/// `len` characters drawn uniformly from `[A-Za-z0-9]`.
pub fn random_alphanumeric<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A dotted quad with every octet drawn independently from `0..=254`.
///
/// Only shaped like an address, nothing guarantees it is routable.
pub fn random_dotted_quad<R: Rng>(rng: &mut R) -> String {
    let [a, b, c, d]: [u8; 4] = std::array::from_fn(|_| rng.random_range(0..255));
    format!("{a}.{b}.{c}.{d}")
}
