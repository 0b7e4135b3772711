/// Min-max scaling outcome for one element of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalized {
    /// Position of the value between the column min (0.0) and max (1.0).
    Scaled(f64),
    /// The column has no spread, so it cannot tell rows apart.
    NoSignal,
    /// The input value itself was undefined.
    Missing,
}

/// Scales each defined value to `(v - min) / (max - min)`. Undefined values
/// are skipped for min/max and come back as `Missing` in place.
pub fn min_max(column: &[Option<f64>]) -> Vec<Normalized> {
    let defined = || column.iter().flatten().copied().filter(|v| v.is_finite());

    let range = defined().fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    });

    column
        .iter()
        .map(|value| match (value.filter(|v| v.is_finite()), range) {
            (None, _) => Normalized::Missing,
            (Some(v), Some((lo, hi))) if hi > lo => Normalized::Scaled((v - lo) / (hi - lo)),
            (Some(_), _) => Normalized::NoSignal,
        })
        .collect()
}
