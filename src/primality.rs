/// Outcome of testing a single integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Prime(u64),
    NotPrime,
}

impl Verdict {
    pub fn prime(self) -> Option<u64> {
        match self {
            Verdict::Prime(x) => Some(x),
            Verdict::NotPrime => None,
        }
    }

    pub fn is_prime(self) -> bool {
        matches!(self, Verdict::Prime(_))
    }
}

/// Trial division by odd integers up to `isqrt(x) + 1` (exclusive).
pub fn check(x: u64) -> Verdict {
    if x < 2 {
        return Verdict::NotPrime;
    }
    if x == 2 {
        return Verdict::Prime(x);
    }
    if x % 2 == 0 {
        return Verdict::NotPrime;
    }

    let limit = isqrt(x) + 1;
    let mut i = 3;
    while i < limit {
        if x % i == 0 {
            return Verdict::NotPrime;
        }
        i += 2;
    }

    Verdict::Prime(x)
}

/// Exact floor(sqrt(x)), corrected after the f64 estimate.
fn isqrt(x: u64) -> u64 {
    let mut r = (x as f64).sqrt() as u64;
    while r.checked_mul(r).map_or(true, |sq| sq > x) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).is_some_and(|sq| sq <= x) {
        r += 1;
    }
    r
}
