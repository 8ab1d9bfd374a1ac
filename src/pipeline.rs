use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::{tract_ndarray, Tensor};

use crate::classifier::{Classifier, ClassifierAdapter, TractClassifier};
use crate::config::{ChannelOrder, DiagnosisConfig, ImageSize, ScaleRule, TensorLayout};
use crate::diagnosis::Diagnosis;
use crate::error::{DiagnosisError, Result};
use crate::loader;
use crate::render::ResultRenderer;
use crate::transformer::{
    GenericTransform, ImageTransform, ImageTransformResult, Normalization, ResizeRgbImage,
    SwapChannels, ToArray, ToTensor, Transpose,
};

/// Model input: a single-image batch of normalized samples.
#[derive(Debug, Clone)]
pub struct InputTensor(Tensor);

impl InputTensor {
    pub fn zeros(shape: &[usize]) -> Self {
        InputTensor(tract_ndarray::ArrayD::<f32>::zeros(shape).into())
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn values(&self) -> Result<&[f32]> {
        self.0
            .as_slice::<f32>()
            .map_err(|e| DiagnosisError::Preprocessing(format!("{e:#}")))
    }

    pub fn into_inner(self) -> Tensor {
        self.0
    }
}

/// Resize and normalize steps applied to every image before inference.
pub struct Preprocessor {
    steps: Vec<ImageTransform>,
    input_shape: Vec<usize>,
}

impl Preprocessor {
    pub fn new(image_size: ImageSize, channel_order: ChannelOrder, layout: TensorLayout) -> Self {
        let mut steps: Vec<ImageTransform> =
            vec![ResizeRgbImage::new(image_size, FilterType::Triangle).into()];
        if channel_order == ChannelOrder::Bgr {
            steps.push(SwapChannels {}.into());
        }
        steps.push(ToArray {}.into());
        steps.push(Normalization::signed_unit().into());
        let input_shape = match layout {
            TensorLayout::Nhwc => vec![1, image_size.height, image_size.width, 3],
            TensorLayout::Nchw => {
                steps.push(Transpose::channels_first().into());
                vec![1, 3, image_size.height, image_size.width]
            }
        };
        steps.push(ToTensor {}.into());
        Preprocessor { steps, input_shape }
    }

    pub fn from_config(config: &DiagnosisConfig) -> Self {
        Preprocessor::new(config.input_size, config.channel_order, config.layout)
    }

    /// Shape of every tensor this preprocessor produces.
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn preprocess(&self, image: &RgbImage) -> Result<InputTensor> {
        let mut result = ImageTransformResult::RgbImage(image.clone());

        for step in &self.steps {
            result = step
                .transform(result)
                .map_err(|e| DiagnosisError::Preprocessing(e.to_string()))?;
            log::trace!("Shape after step: {:?}", result.shape());
        }

        match result {
            ImageTransformResult::Tensor(t) if t.shape() == self.input_shape.as_slice() => {
                Ok(InputTensor(t))
            }
            ImageTransformResult::Tensor(t) => Err(DiagnosisError::Preprocessing(format!(
                "expected tensor shape {:?}, got {:?}",
                self.input_shape,
                t.shape()
            ))),
            _ => Err(DiagnosisError::Preprocessing(
                "Should be converted to tensor already".to_string(),
            )),
        }
    }
}

/// A diagnosis together with the annotated image shown to the user.
#[derive(Clone, Debug)]
pub struct RenderedDiagnosis {
    pub diagnosis: Diagnosis,
    pub image: RgbImage,
}

/// Loader, preprocessor, classifier and renderer wired together around an
/// injected model.
pub struct DiagnosisPipeline<C> {
    preprocessor: Preprocessor,
    adapter: ClassifierAdapter<C>,
    renderer: ResultRenderer,
}

impl DiagnosisPipeline<TractClassifier> {
    /// Loads the configured ONNX model. Fails if the file is missing or unreadable.
    pub fn from_config(config: &DiagnosisConfig) -> Result<Self> {
        let preprocessor = Preprocessor::from_config(config);
        let model = TractClassifier::load(&config.model_path, preprocessor.input_shape())?;
        Ok(DiagnosisPipeline::with_preprocessor(config, preprocessor, model))
    }
}

impl<C: Classifier> DiagnosisPipeline<C> {
    pub fn new(config: &DiagnosisConfig, model: C) -> Self {
        DiagnosisPipeline::with_preprocessor(config, Preprocessor::from_config(config), model)
    }

    /// Like [`DiagnosisPipeline::new`] but with an explicit renderer, e.g. one without a font.
    pub fn with_renderer(config: &DiagnosisConfig, model: C, renderer: ResultRenderer) -> Self {
        DiagnosisPipeline {
            preprocessor: Preprocessor::from_config(config),
            adapter: ClassifierAdapter::new(model, config.classes.clone()),
            renderer,
        }
    }

    fn with_preprocessor(config: &DiagnosisConfig, preprocessor: Preprocessor, model: C) -> Self {
        DiagnosisPipeline {
            preprocessor,
            adapter: ClassifierAdapter::new(model, config.classes.clone()),
            renderer: ResultRenderer::new(config.classes.clone(), config.render.clone()),
        }
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn adapter(&self) -> &ClassifierAdapter<C> {
        &self.adapter
    }

    pub fn renderer(&self) -> &ResultRenderer {
        &self.renderer
    }

    pub fn diagnose(&self, image: &RgbImage) -> Result<Diagnosis> {
        let tensor = self.preprocessor.preprocess(image)?;
        self.adapter.classify(tensor)
    }

    /// Runs every stage for one file.
    pub fn run(&self, path: &Path, rule: ScaleRule) -> Result<RenderedDiagnosis> {
        let image = loader::load(path)?;
        let diagnosis = self.diagnose(&image)?;
        log::info!(
            "{}: {} ({:.2}%)",
            path.display(),
            diagnosis.label,
            diagnosis.confidence * 100.0
        );
        let image = self.renderer.render(&image, &diagnosis, rule);
        Ok(RenderedDiagnosis { diagnosis, image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn default_preprocessor() -> Preprocessor {
        Preprocessor::from_config(&DiagnosisConfig::default())
    }

    #[test]
    fn black_image_becomes_all_minus_one() {
        let image = RgbImage::new(224, 224);
        let tensor = default_preprocessor().preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor.values().unwrap().iter().all(|&v| v == -1.0));
    }

    #[test]
    fn white_image_normalizes_to_one() {
        let image = RgbImage::from_pixel(64, 48, Rgb([255, 255, 255]));
        let tensor = default_preprocessor().preprocess(&image).unwrap();
        assert!(tensor
            .values()
            .unwrap()
            .iter()
            .all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn any_image_maps_into_unit_range() {
        let image = RgbImage::from_fn(517, 311, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        });
        let tensor = default_preprocessor().preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor
            .values()
            .unwrap()
            .iter()
            .all(|&v| (-1.0..=1.0).contains(&v)));
    }

    #[test]
    fn mid_gray_is_near_zero() {
        let image = RgbImage::from_pixel(10, 10, Rgb([128, 127, 128]));
        let tensor = default_preprocessor().preprocess(&image).unwrap();
        let values = tensor.values().unwrap();
        assert!((values[0] - (128.0 / 127.5 - 1.0)).abs() < 1e-6);
        assert!((values[1] - (127.0 / 127.5 - 1.0)).abs() < 1e-6);
    }

    #[test]
    fn channels_first_layout_and_bgr_order() {
        let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        let preprocessor = Preprocessor::new(ImageSize::default(), ChannelOrder::Bgr, TensorLayout::Nchw);
        assert_eq!(preprocessor.input_shape(), &[1, 3, 224, 224]);
        let tensor = preprocessor.preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let values = tensor.values().unwrap();
        let plane = 224 * 224;
        // red ends up in the last plane once channels are swapped
        assert_eq!(values[0], -1.0);
        assert!((values[2 * plane] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_image_is_a_preprocessing_error() {
        let image = RgbImage::new(0, 0);
        assert!(matches!(
            default_preprocessor().preprocess(&image),
            Err(DiagnosisError::Preprocessing(_))
        ));
    }
}
