use crate::error::{Error, Result};

/// Clamp, but for f64. f64 has no "Ord" trait.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn clampf64(mut x: f64, min: f64, max: f64) -> f64 {
    // Due to the way NaNs work, using a simple if-else or even min & max, does result in sub-optimal
    // assembly code. Using a mutable variable in this way with this if-else construction generates
    // good assembly.
    if !(x > min) {
        x = min;
    }
    if !(x < max) {
        x = max;
    }
    x
}

/// Check that `p` is a probability vector summing to one within `tol`.
/// `what` names the distribution in the error and is only evaluated on failure.
pub fn check_distribution<F>(p: &[f64], tol: f64, what: F) -> Result<()>
where
    F: Fn() -> String,
{
    if let Some(x) = p.iter().find(|x| !x.is_finite() || **x < 0.0) {
        return Err(Error::model_invalid(format!(
            "{} contains a bad probability {}",
            what(),
            x
        )));
    }
    let sum: f64 = p.iter().sum();
    if (sum - 1.0).abs() > tol {
        return Err(Error::model_invalid(format!(
            "{} sums to {} instead of 1",
            what(),
            sum
        )));
    }
    Ok(())
}
