//! Just-intonation pitch material.
//!
//! The tonality diamond of odd limit `n` is every ratio `a/b` with `a` and
//! `b` odd and at most `n`, folded into a single octave. For limit 5:
//!
//! ```text
//! 1/1  6/5  5/4  4/3  3/2  8/5  5/3
//! ```

/// Pitch ratios of the tonality diamond, octave-reduced to `[1, 2)` and
/// sorted ascending. Duplicates (e.g. 3/3) appear once.
pub fn tonality_diamond(odd_limit: u32) -> Vec<f64> {
    let odds: Vec<u64> = (1..=odd_limit.max(1) as u64).step_by(2).collect();
    let mut ratios: Vec<(u64, u64)> = Vec::new();
    
    for &num in &odds {
        for &den in &odds {
            let ratio = octave_reduce(num, den);
            if !ratios.contains(&ratio) {
                ratios.push(ratio);
            }
        }
    }
    
    let mut pitches: Vec<f64> = ratios
        .into_iter()
        .map(|(num, den)| num as f64 / den as f64)
        .collect();
    pitches.sort_by(|a, b| a.total_cmp(b));
    pitches
}

/// Folds `num/den` into `[1, 2)` and reduces it to lowest terms.
fn octave_reduce(mut num: u64, mut den: u64) -> (u64, u64) {
    while num >= den * 2 {
        den *= 2;
    }
    while num < den {
        num *= 2;
    }
    let divisor = gcd(num, den);
    (num / divisor, den / divisor)
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
