//! Reference CNN Architecture for Crop Disease Classification
//!
//! The fixed architecture that separately-shipped weight files are loaded into:
//! a convolutional backbone, global average pooling and a dense softmax head
//! sized to the crop's class count. A weights file only loads correctly into
//! the exact same layer layout it was exported from.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the reference classifier
#[derive(Config, Debug)]
pub struct ReferenceClassifierConfig {
    /// Number of output classes (length of the crop's label list)
    pub num_classes: usize,

    /// Input image width in pixels
    pub input_width: usize,

    /// Input image height in pixels
    pub input_height: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "32")]
    pub base_filters: usize,
}

impl ReferenceClassifierConfig {
    /// Initialize a model with freshly initialized weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> ReferenceClassifier<B> {
        ReferenceClassifier::new(self, device)
    }
}

/// Number of conv blocks in the backbone, each halving height and width
pub const NUM_CONV_BLOCKS: u32 = 4;

/// Smallest input side that still leaves one pixel after the last pool
pub const MIN_INPUT_SIDE: usize = 1 << NUM_CONV_BLOCKS;

/// Conv2d, BatchNorm, ReLU and a 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }

    fn parameter_shapes(&self, prefix: &str, shapes: &mut Vec<(String, Vec<usize>)>) {
        shapes.push((
            format!("{}.conv.weight", prefix),
            self.conv.weight.val().dims().to_vec(),
        ));
        if let Some(bias) = &self.conv.bias {
            shapes.push((format!("{}.conv.bias", prefix), bias.val().dims().to_vec()));
        }
        shapes.push((
            format!("{}.bn.gamma", prefix),
            self.bn.gamma.val().dims().to_vec(),
        ));
        shapes.push((
            format!("{}.bn.beta", prefix),
            self.bn.beta.val().dims().to_vec(),
        ));
    }
}

/// Crop disease classifier
///
/// Architecture:
/// - 4 convolutional blocks (3 -> 32 -> 64 -> 128 -> 256 filters), each halving
///   the spatial resolution
/// - Global average pooling
/// - Dense head producing one logit per class, softmax at inference
#[derive(Module, Debug)]
pub struct ReferenceClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub head: Linear<B>,
}

impl<B: Backend> ReferenceClassifier<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &ReferenceClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        Self {
            conv1: ConvBlock::new(config.in_channels, base, device),
            conv2: ConvBlock::new(base, base * 2, device),
            conv3: ConvBlock::new(base * 2, base * 4, device),
            conv4: ConvBlock::new(base * 4, base * 8, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(base * 8, config.num_classes).init(device),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.head.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    /// Number of output classes, read from the head's weight shape
    pub fn num_classes(&self) -> usize {
        self.head.weight.val().dims()[1]
    }

    /// Named shapes of every trainable parameter, in layer order
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = Vec::new();
        self.conv1.parameter_shapes("conv1", &mut shapes);
        self.conv2.parameter_shapes("conv2", &mut shapes);
        self.conv3.parameter_shapes("conv3", &mut shapes);
        self.conv4.parameter_shapes("conv4", &mut shapes);
        shapes.push((
            "head.weight".to_string(),
            self.head.weight.val().dims().to_vec(),
        ));
        if let Some(bias) = &self.head.bias {
            shapes.push(("head.bias".to_string(), bias.val().dims().to_vec()));
        }
        shapes
    }
}

/// Compare two parameter shape listings, describing the first disagreement
pub fn shape_mismatch(
    expected: &[(String, Vec<usize>)],
    actual: &[(String, Vec<usize>)],
) -> Option<String> {
    if expected.len() != actual.len() {
        return Some(format!(
            "expected {} parameter tensors, found {}",
            expected.len(),
            actual.len()
        ));
    }

    expected
        .iter()
        .zip(actual)
        .find(|((_, want), (_, got))| want != got)
        .map(|((name, want), (_, got))| {
            format!("parameter '{}' has shape {:?}, expected {:?}", name, got, want)
        })
}
