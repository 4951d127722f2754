use crate::models::Document;

/// Rescale raw scores into `norm_score = score / max_score`, in place and without reordering.
///
/// A non-positive maximum (including all zeros) yields `norm_score = 0` everywhere.
pub fn normalize_scores(docs: &mut [Document]) {
    if docs.is_empty() {
        return;
    }
    let max_score = docs
        .iter()
        .map(|d| d.score)
        .fold(f64::NEG_INFINITY, f64::max);

    if max_score <= 0.0 || max_score.abs() < f64::EPSILON {
        for doc in docs.iter_mut() {
            doc.norm_score = Some(0.0);
        }
    } else {
        for doc in docs.iter_mut() {
            doc.norm_score = Some(doc.score / max_score);
        }
    }
}
