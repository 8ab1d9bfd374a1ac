//! Chest X-ray classification: an image is resized and normalized, labelled
//! `PNEUMONIA` or `NORMAL` by a pre-trained ONNX model, and drawn with a
//! class-colored border and the diagnosis text.

pub mod classifier;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod render;
pub mod shell;
pub mod transformer;

pub use classifier::{argmax, Classifier, ClassifierAdapter, TractClassifier};
pub use config::{
    ChannelOrder, ClassEntry, ClassSet, DiagnosisConfig, HexColor, ImageSize, RenderConfig,
    ScaleRule, TensorLayout, DEFAULT_MODEL_PATH,
};
pub use diagnosis::Diagnosis;
pub use error::{DiagnosisError, Result};
pub use pipeline::{DiagnosisPipeline, InputTensor, Preprocessor, RenderedDiagnosis};
pub use render::ResultRenderer;
pub use shell::{
    DisplaySurface, FileSurface, InteractiveShell, ShellEffect, ShellState, SingleShot,
    SingleShotState, UserIntent,
};
