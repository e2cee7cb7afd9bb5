pub mod author;
pub mod engagement;
pub mod keyword;
pub mod media;
pub mod text_classifier;
pub mod text_length;

/// `ln(1 + count)`
pub(crate) fn log_scale(count: u64) -> f64 {
    (count as f64).ln_1p()
}
