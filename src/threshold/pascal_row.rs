//! Log-space binomial coefficients: row `n` of Pascal's triangle, i.e.
//! `ln(C(n, i))` for `i` in `0..=n`, computed by the multiplicative
//! recurrence `C(n, i) = C(n, i-1) * (n+1-i)/i` so nothing overflows even
//! for large `n`.

pub fn pascal_row(n: usize) -> Vec<f64> {
    let mut result = vec![0.0f64; n + 1];
    for i in 1..=n {
        result[i] = result[i - 1] + ((n + 1 - i) as f64 / i as f64).ln();
    }
    result
}
