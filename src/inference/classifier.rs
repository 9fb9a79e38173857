//! Classifier Adapter
//!
//! Wraps a trained Burn model behind the uniform [`Classifier::predict`]
//! capability. Two construction paths exist:
//!
//! - **Full model**: a [`ClassifierArchive`] file holding the architecture
//!   hyper-parameters together with the weights.
//! - **Architecture + weights**: the reference architecture is rebuilt from the
//!   crop's [`ModelSpec`] and a plain weights record is loaded into it.
//!
//! Both paths go through [`construct_classifier`], the single factory keyed on
//! [`ConstructionMode`].

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use burn::{
    module::Module,
    record::{CompactRecorder, FileRecorder, Record, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};
use tracing::debug;

use super::preprocess::ImageTensor;
use crate::backend::{default_device, InferenceBackend};
use crate::model::cnn::{
    shape_mismatch, ReferenceClassifier, ReferenceClassifierConfig, ReferenceClassifierRecord,
    MIN_INPUT_SIDE,
};
use crate::model::config::{ConstructionMode, ImageSize, ModelSpec};
use crate::model::INPUT_CHANNELS;
use crate::utils::error::{DiagnosisError, Result};

/// A trained model mapping an input tensor to a probability distribution
///
/// Implementations must be callable from several request threads at once.
pub trait Classifier: Send + Sync {
    /// Per-class scores summing to 1, in `class_labels` order
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;

    /// Output dimensionality, when the model can report it
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

/// Builds classifiers from model specs
///
/// The registry only talks to this trait, so tests can substitute fakes.
pub trait ClassifierLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn Classifier>>;
}

/// Full model file: architecture hyper-parameters stored next to the weights
#[derive(Record)]
pub struct ClassifierArchive<B: Backend> {
    pub num_classes: usize,
    pub input_width: usize,
    pub input_height: usize,
    pub base_filters: usize,
    pub model: ReferenceClassifierRecord<B>,
}

/// Burn-backed classifier
///
/// Calls to `predict` are serialized through a mutex: one model runs one
/// forward pass at a time, different crops run in parallel.
pub struct BurnClassifier<B: Backend> {
    model: Mutex<ReferenceClassifier<B>>,
    device: B::Device,
    input_size: ImageSize,
    num_classes: usize,
}

impl<B: Backend> std::fmt::Debug for BurnClassifier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnClassifier")
            .field("input_size", &self.input_size)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

fn load_error(path: &Path, reason: impl Into<String>) -> DiagnosisError {
    DiagnosisError::Load {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn save_error(path: &Path, err: impl std::fmt::Debug) -> DiagnosisError {
    DiagnosisError::Io(std::io::Error::other(format!(
        "failed to write model file {}: {:?}",
        path.display(),
        err
    )))
}

/// Existence and extension checks shared by both construction paths
///
/// Burn's file recorders replace the extension, so anything but `.mpk` would
/// silently load a different file than the one configured.
fn check_model_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(load_error(path, "file does not exist"));
    }
    let extension = model_file_extension();
    if path.extension().and_then(|e| e.to_str()) != Some(extension) {
        return Err(load_error(
            path,
            format!("model files must use the .{} extension", extension),
        ));
    }
    Ok(())
}

/// Reject inputs the four pooling stages would shrink to nothing
fn check_input_size(path: &Path, width: usize, height: usize) -> Result<()> {
    if width < MIN_INPUT_SIDE || height < MIN_INPUT_SIDE {
        return Err(load_error(
            path,
            format!(
                "input size {}x{} is below the {}x{} minimum of the reference architecture",
                width, height, MIN_INPUT_SIDE, MIN_INPUT_SIDE
            ),
        ));
    }
    Ok(())
}

/// Fail unless `model` has exactly the parameter shapes `config` produces
fn verify_architecture<B: Backend>(
    path: &Path,
    model: &ReferenceClassifier<B>,
    config: &ReferenceClassifierConfig,
    device: &B::Device,
) -> Result<()> {
    let expected = config.init::<B>(device).parameter_shapes();
    match shape_mismatch(&expected, &model.parameter_shapes()) {
        Some(reason) => Err(load_error(path, reason)),
        None => Ok(()),
    }
}

impl<B: Backend> BurnClassifier<B> {
    fn from_model(model: ReferenceClassifier<B>, input_size: ImageSize, device: B::Device) -> Self {
        let num_classes = model.num_classes();
        Self {
            model: Mutex::new(model),
            device,
            input_size,
            num_classes,
        }
    }

    /// Load a complete model archive
    pub fn construct_from_full_model(path: &Path, device: &B::Device) -> Result<Self> {
        check_model_file(path)?;

        let recorder = CompactRecorder::new();
        let archive: ClassifierArchive<B> =
            Recorder::<B>::load(&recorder, path.to_path_buf(), device)
                .map_err(|e| load_error(path, format!("{:?}", e)))?;

        if archive.num_classes == 0 {
            return Err(load_error(path, "archive declares no output classes"));
        }
        check_input_size(path, archive.input_width, archive.input_height)?;

        let config = ReferenceClassifierConfig::new(
            archive.num_classes,
            archive.input_width,
            archive.input_height,
        )
        .with_base_filters(archive.base_filters);

        let model = config.init::<B>(device).load_record(archive.model);
        verify_architecture(path, &model, &config, device)?;

        let input_size = ImageSize::new(archive.input_width as u32, archive.input_height as u32);
        debug!(
            "Loaded full model from {:?} ({} classes, input {})",
            path, archive.num_classes, input_size
        );

        Ok(Self::from_model(model, input_size, device.clone()))
    }

    /// Rebuild the reference architecture and load weights into it
    pub fn construct_from_weights(
        path: &Path,
        input_size: ImageSize,
        num_classes: usize,
        device: &B::Device,
    ) -> Result<Self> {
        check_model_file(path)?;
        if num_classes == 0 {
            return Err(load_error(path, "num_classes must be positive"));
        }
        check_input_size(path, input_size.width as usize, input_size.height as usize)?;

        let config = ReferenceClassifierConfig::new(
            num_classes,
            input_size.width as usize,
            input_size.height as usize,
        );

        let recorder = CompactRecorder::new();
        let model = config
            .init::<B>(device)
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| load_error(path, format!("{:?}", e)))?;
        verify_architecture(path, &model, &config, device)?;

        debug!(
            "Loaded weights from {:?} into reference architecture ({} classes, input {})",
            path, num_classes, input_size
        );

        Ok(Self::from_model(model, input_size, device.clone()))
    }

    /// Input size this classifier was built for
    pub fn input_size(&self) -> ImageSize {
        self.input_size
    }
}

impl<B: Backend> Classifier for BurnClassifier<B> {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let expected = [
            1,
            INPUT_CHANNELS,
            self.input_size.height as usize,
            self.input_size.width as usize,
        ];
        if input.shape() != expected {
            return Err(DiagnosisError::Inference(format!(
                "input shape {:?} does not match expected {:?}",
                input.shape(),
                expected
            )));
        }

        let tensor = Tensor::<B, 4>::from_data(
            TensorData::new(input.data().to_vec(), input.shape()),
            &self.device,
        );

        // A panic in an earlier forward pass leaves the weights untouched
        let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let output = model.forward_softmax(tensor);
        drop(model);

        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| DiagnosisError::Inference(format!("failed to read scores: {:?}", e)))
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }
}

/// Single factory for both construction paths
pub fn construct_classifier<B: Backend>(
    spec: &ModelSpec,
    device: &B::Device,
) -> Result<BurnClassifier<B>> {
    match spec.construction_mode {
        ConstructionMode::FullModel => {
            let classifier = BurnClassifier::construct_from_full_model(&spec.source_path, device)?;
            if classifier.input_size() != spec.input_size {
                return Err(load_error(
                    &spec.source_path,
                    format!(
                        "archive expects input {}, configuration says {}",
                        classifier.input_size(),
                        spec.input_size
                    ),
                ));
            }
            Ok(classifier)
        }
        ConstructionMode::ArchitecturePlusWeights => BurnClassifier::construct_from_weights(
            &spec.source_path,
            spec.input_size,
            spec.num_classes(),
            device,
        ),
    }
}

/// Loader used in production: Burn models on the default inference backend
#[derive(Debug, Default, Clone, Copy)]
pub struct BurnLoader;

impl ClassifierLoader for BurnLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn Classifier>> {
        let device = default_device();
        let classifier = construct_classifier::<InferenceBackend>(spec, &device)?;
        Ok(Box::new(classifier))
    }
}

/// Save a model's weights in the format `construct_from_weights` reads
pub fn save_weights<B: Backend>(model: ReferenceClassifier<B>, path: &Path) -> Result<()> {
    let recorder = CompactRecorder::new();
    model
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| save_error(path, e))
}

/// Save a model together with its architecture as a full model archive
pub fn save_full_model<B: Backend>(
    model: ReferenceClassifier<B>,
    config: &ReferenceClassifierConfig,
    path: &Path,
) -> Result<()> {
    let archive = ClassifierArchive::<B> {
        num_classes: config.num_classes,
        input_width: config.input_width,
        input_height: config.input_height,
        base_filters: config.base_filters,
        model: model.into_record(),
    };

    let recorder = CompactRecorder::new();
    Recorder::<B>::record(&recorder, archive, path.to_path_buf())
        .map_err(|e| save_error(path, e))?;
    Ok(())
}

/// File extension Burn appends to model files
pub fn model_file_extension() -> &'static str {
    <CompactRecorder as FileRecorder<InferenceBackend>>::file_extension()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use std::path::PathBuf;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    const SIZE: ImageSize = ImageSize {
        width: 32,
        height: 32,
    };

    fn write_weights(dir: &TempDir, name: &str, num_classes: usize) -> PathBuf {
        let device = Default::default();
        let config = ReferenceClassifierConfig::new(num_classes, 32, 32);
        let path = dir.path().join(format!("{}.mpk", name));
        save_weights(config.init::<TestBackend>(&device), &path).unwrap();
        path
    }

    fn blank_input() -> ImageTensor {
        ImageTensor::new(vec![0.5; 3 * 32 * 32], [1, 3, 32, 32]).unwrap()
    }

    #[test]
    fn test_weights_roundtrip_predicts_distribution() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "potato", 3);
        assert!(path.exists());

        let device = Default::default();
        let classifier =
            BurnClassifier::<TestBackend>::construct_from_weights(&path, SIZE, 3, &device)
                .unwrap();

        let scores = classifier.predict(&blank_input()).unwrap();
        assert_eq!(scores.len(), 3);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(classifier.num_classes(), Some(3));
    }

    #[test]
    fn test_wrong_num_classes_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "mango", 3);

        let device = Default::default();
        let err = BurnClassifier::<TestBackend>::construct_from_weights(&path, SIZE, 8, &device)
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::Load { .. }));
        assert!(err.to_string().contains("head.weight"));
    }

    #[test]
    fn test_corrupt_and_missing_files_are_load_errors() {
        let dir = TempDir::new().unwrap();
        let corrupt = dir.path().join("corrupt.mpk");
        std::fs::write(&corrupt, b"not a msgpack record").unwrap();

        let device = Default::default();
        let err = BurnClassifier::<TestBackend>::construct_from_weights(&corrupt, SIZE, 3, &device)
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::Load { .. }));

        let err = BurnClassifier::<TestBackend>::construct_from_full_model(&corrupt, &device)
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::Load { .. }));

        let missing = dir.path().join("missing.mpk");
        let err = BurnClassifier::<TestBackend>::construct_from_weights(&missing, SIZE, 3, &device)
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::Load { .. }));
    }

    #[test]
    fn test_full_model_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wheat_full.mpk");

        let device = Default::default();
        let config = ReferenceClassifierConfig::new(3, 32, 32).with_base_filters(8);
        save_full_model(config.init::<TestBackend>(&device), &config, &path).unwrap();

        let classifier =
            BurnClassifier::<TestBackend>::construct_from_full_model(&path, &device).unwrap();
        assert_eq!(classifier.input_size(), SIZE);
        assert_eq!(classifier.num_classes(), Some(3));

        let scores = classifier.predict(&blank_input()).unwrap();
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn test_input_below_minimum_is_load_error() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();

        let weights = write_weights(&dir, "potato", 3);
        let err = BurnClassifier::<TestBackend>::construct_from_weights(
            &weights,
            ImageSize::new(8, 8),
            3,
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, DiagnosisError::Load { .. }));
        assert!(err.to_string().contains("8x8"));

        // One side at the minimum, the other below it
        assert!(BurnClassifier::<TestBackend>::construct_from_weights(
            &weights,
            ImageSize::new(16, 15),
            3,
            &device,
        )
        .is_err());

        let archive = dir.path().join("tiny_full.mpk");
        let config = ReferenceClassifierConfig::new(3, 8, 8).with_base_filters(4);
        save_full_model(config.init::<TestBackend>(&device), &config, &archive).unwrap();
        let err = BurnClassifier::<TestBackend>::construct_from_full_model(&archive, &device)
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::Load { .. }));
    }

    #[test]
    fn test_factory_dispatches_on_construction_mode() {
        let dir = TempDir::new().unwrap();
        let weights = write_weights(&dir, "potato", 3);
        let device = Default::default();

        let spec = ModelSpec::weights("potato", &weights, &["Early Blight", "Late Blight", "Healthy"])
            .with_input_size(SIZE);
        assert!(construct_classifier::<TestBackend>(&spec, &device).is_ok());

        // A weights file is not a full model archive
        let as_full = ModelSpec {
            construction_mode: ConstructionMode::FullModel,
            ..spec
        };
        assert!(construct_classifier::<TestBackend>(&as_full, &device).is_err());
    }

    #[test]
    fn test_predict_rejects_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "potato", 3);
        let device = Default::default();
        let classifier =
            BurnClassifier::<TestBackend>::construct_from_weights(&path, SIZE, 3, &device)
                .unwrap();

        let wrong = ImageTensor::new(vec![0.0; 3 * 16 * 16], [1, 3, 16, 16]).unwrap();
        let err = classifier.predict(&wrong).unwrap_err();
        assert!(matches!(err, DiagnosisError::Inference(_)));
    }
}
