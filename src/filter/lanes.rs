/// A vector of V 16-bit words, processed in lockstep.
/// Plain arrays with fixed trip counts, which the compiler turns into SIMD instructions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Lanes<const V: usize>(pub [i16; V]);

impl<const V: usize> Lanes<V> {
    #[inline]
    pub fn splat(x: i16) -> Self {
        Self([x; V])
    }

    /// Lane-wise saturating addition.
    #[inline]
    pub fn adds(self, other: Self) -> Self {
        let mut out = self.0;
        for (a, b) in out.iter_mut().zip(other.0.iter()) {
            *a = a.saturating_add(*b);
        }
        Self(out)
    }

    /// Lane-wise maximum.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        let mut out = self.0;
        for (a, &b) in out.iter_mut().zip(other.0.iter()) {
            if b > *a {
                *a = b;
            }
        }
        Self(out)
    }

    /// Move every word one lane up, `fill` enters lane 0 and the last lane drops off.
    #[inline]
    pub fn rightshift(self, fill: i16) -> Self {
        let mut out = [fill; V];
        out[1..].copy_from_slice(&self.0[..V - 1]);
        Self(out)
    }

    /// Horizontal maximum.
    #[inline]
    pub fn hmax(self) -> i16 {
        self.0.iter().copied().max().unwrap_or(i16::MIN)
    }

    /// Whether any lane of `self` is strictly greater than the same lane of `other`.
    #[inline]
    pub fn any_gt(self, other: Self) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a > b)
    }
}
