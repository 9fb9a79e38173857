//! Inference module: preprocessing and the classifier adapter
//!
//! - `preprocess`: encoded image bytes -> `[1, 3, H, W]` tensor in `[0, 1]`
//! - `classifier`: the `Classifier` capability and its Burn implementation

pub mod classifier;
pub mod preprocess;

// Re-export main types for convenience
pub use classifier::{
    construct_classifier, save_full_model, save_weights, BurnClassifier, BurnLoader, Classifier,
    ClassifierLoader,
};
pub use preprocess::{decode_base64_image, preprocess, preprocess_image, ImageTensor};
