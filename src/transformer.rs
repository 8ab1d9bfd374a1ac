use enum_dispatch::enum_dispatch;
use image::imageops::{resize, FilterType};
use image::RgbImage;
use tract_onnx::prelude::{tract_ndarray, tract_ndarray::Array4, Tensor};
use tract_onnx::tract_core::ndarray::Array;

use crate::config::ImageSize;

#[enum_dispatch]
#[derive(Clone, Debug)]
pub enum ImageTransform {
    ResizeRgbImage(ResizeRgbImage),
    SwapChannels(SwapChannels),
    ToArray(ToArray),
    Normalization(Normalization),
    Transpose(Transpose),
    ToTensor(ToTensor),
}

#[enum_dispatch(ImageTransform)]
pub trait GenericTransform {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str>;
}

/// Resizes to an exact size. Aspect ratio is not kept.
#[derive(Clone, Debug)]
pub struct ResizeRgbImage {
    image_size: ImageSize,
    filter: FilterType,
}

impl ResizeRgbImage {
    pub fn new(image_size: ImageSize, filter: FilterType) -> Self {
        ResizeRgbImage { image_size, filter }
    }
}

impl GenericTransform for ResizeRgbImage {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbImage(image) => {
                if image.width() == 0 || image.height() == 0 {
                    return Err("Cannot resize an empty image");
                }
                Ok(resize(
                    &image,
                    self.image_size.width as u32,
                    self.image_size.height as u32,
                    self.filter,
                )
                .into())
            }
            ImageTransformResult::Tensor(_) => Err("Image resize not implemented for Tensor"),
            ImageTransformResult::Array4(_) => Err("Image resize not implemented for Array4"),
        }
    }
}

/// Swaps the red and blue channels, for models trained on BGR input.
#[derive(Clone, Debug)]
pub struct SwapChannels {}

impl GenericTransform for SwapChannels {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbImage(mut image) => {
                for pixel in image.pixels_mut() {
                    pixel.0.swap(0, 2);
                }
                Ok(image.into())
            }
            _ => Err("Channel swap is only implemented for RgbImage"),
        }
    }
}

/// Converts an image to a `(1, height, width, 3)` array of raw sample values.
#[derive(Clone, Debug)]
pub struct ToArray {}

impl GenericTransform for ToArray {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbImage(image) => {
                let (width, height) = image.dimensions();
                let arr = tract_ndarray::Array4::from_shape_fn(
                    (1_usize, height as usize, width as usize, 3_usize),
                    |(_, y, x, c)| image[(x as u32, y as u32)][c] as f32,
                );
                Ok(ImageTransformResult::Array4(arr))
            }
            ImageTransformResult::Tensor(_) => Err("ToArray expects an image, not a Tensor"),
            // already an array
            ImageTransformResult::Array4(arr4) => Ok(ImageTransformResult::Array4(arr4)),
        }
    }
}

/// Per-channel `value / div - sub` on an NHWC array.
#[derive(Clone, Debug)]
pub struct Normalization {
    div: [f32; 3],
    sub: [f32; 3],
}

impl Normalization {
    pub fn new(div: [f32; 3], sub: [f32; 3]) -> Self {
        Normalization { div, sub }
    }

    /// Maps `0..=255` onto `-1..=1`.
    pub fn signed_unit() -> Self {
        Normalization::new([127.5; 3], [1.0; 3])
    }
}

impl GenericTransform for Normalization {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::Array4(arr) => {
                if arr.shape()[3] != 3 {
                    return Err("Normalization expects a channels-last array with 3 channels");
                }
                let div = Array::from_shape_vec((1, 1, 1, 3), self.div.to_vec())
                    .map_err(|_| "Wrong conversion to array")?;
                let sub = Array::from_shape_vec((1, 1, 1, 3), self.sub.to_vec())
                    .map_err(|_| "Wrong conversion to array")?;
                Ok(ImageTransformResult::Array4(arr / &div - &sub))
            }
            ImageTransformResult::RgbImage(_) => Err("Normalization not implemented for RgbImage"),
            ImageTransformResult::Tensor(_) => Err("Normalization not implemented for Tensor"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Transpose {
    axes: [usize; 4],
}

impl Transpose {
    pub fn new(axes: [usize; 4]) -> Self {
        Transpose { axes }
    }

    /// NHWC to NCHW.
    pub fn channels_first() -> Self {
        Transpose::new([0, 3, 1, 2])
    }
}

impl GenericTransform for Transpose {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbImage(_) => Err("Transpose not implemented for RgbImage"),
            ImageTransformResult::Array4(arr) => {
                let arr = arr.permuted_axes(self.axes).as_standard_layout().into_owned();
                Ok(ImageTransformResult::Array4(arr))
            }
            ImageTransformResult::Tensor(_) => Err("Transpose not implemented for Tensor"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ToTensor {}

impl GenericTransform for ToTensor {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbImage(_) => Err("Convert the image to an array first"),
            // already a tensor
            ImageTransformResult::Tensor(tensor) => Ok(ImageTransformResult::Tensor(tensor)),
            ImageTransformResult::Array4(arr4) => Ok(ImageTransformResult::Tensor(arr4.into())),
        }
    }
}

pub enum ImageTransformResult {
    RgbImage(RgbImage),
    Array4(Array4<f32>),
    Tensor(Tensor),
}

impl ImageTransformResult {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ImageTransformResult::RgbImage(image) => {
                let (width, height) = image.dimensions();
                vec![height as usize, width as usize, 3]
            }
            ImageTransformResult::Array4(array) => array.shape().to_vec(),
            ImageTransformResult::Tensor(tensor) => tensor.shape().to_vec(),
        }
    }
}

impl From<RgbImage> for ImageTransformResult {
    fn from(rgb_image: RgbImage) -> Self {
        ImageTransformResult::RgbImage(rgb_image)
    }
}

impl From<Tensor> for ImageTransformResult {
    fn from(tensor: Tensor) -> Self {
        ImageTransformResult::Tensor(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn array_of(result: ImageTransformResult) -> Array4<f32> {
        match result {
            ImageTransformResult::Array4(arr) => arr,
            _ => panic!("expected an Array4"),
        }
    }

    #[test]
    fn resize_ignores_aspect_ratio() {
        let image = RgbImage::from_pixel(300, 100, Rgb([1, 2, 3]));
        let step = ResizeRgbImage::new(ImageSize::default(), FilterType::Triangle);
        let resized = step.transform(image.into()).unwrap();
        assert_eq!(resized.shape(), vec![224, 224, 3]);
    }

    #[test]
    fn to_array_is_channels_last() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([7, 8, 9]));
        let arr = array_of(ToArray {}.transform(image.into()).unwrap());
        assert_eq!(arr.shape(), &[1, 1, 2, 3]);
        assert_eq!(arr[[0, 0, 1, 0]], 7.0);
        assert_eq!(arr[[0, 0, 1, 2]], 9.0);
    }

    #[test]
    fn signed_unit_normalization_endpoints() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([0, 0, 0]));
        image.put_pixel(1, 0, Rgb([255, 255, 255]));
        let arr = array_of(ToArray {}.transform(image.into()).unwrap());
        let arr = array_of(
            Normalization::signed_unit()
                .transform(ImageTransformResult::Array4(arr))
                .unwrap(),
        );
        assert_eq!(arr[[0, 0, 0, 1]], -1.0);
        assert!((arr[[0, 0, 1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn swap_channels_reverses_red_and_blue() {
        let image = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        let step = SwapChannels {};
        match step.transform(image.into()).unwrap() {
            ImageTransformResult::RgbImage(image) => assert_eq!(image.get_pixel(0, 0), &Rgb([3, 2, 1])),
            _ => panic!("expected an RgbImage"),
        }
    }

    #[test]
    fn channels_first_transpose() {
        let image = RgbImage::from_pixel(4, 2, Rgb([5, 6, 7]));
        let arr = array_of(ToArray {}.transform(image.into()).unwrap());
        let arr = array_of(
            Transpose::channels_first()
                .transform(ImageTransformResult::Array4(arr))
                .unwrap(),
        );
        assert_eq!(arr.shape(), &[1, 3, 2, 4]);
        assert_eq!(arr[[0, 2, 1, 3]], 7.0);
    }

    #[test]
    fn steps_reject_wrong_input_kind() {
        let image = RgbImage::new(1, 1);
        assert!(Normalization::signed_unit().transform(image.clone().into()).is_err());
        assert!(ToTensor {}.transform(image.into()).is_err());
    }

    #[test]
    fn array_steps_reject_a_finished_tensor() {
        let tensor = || ImageTransformResult::from(Tensor::zero::<f32>(&[1, 2, 2, 3]).unwrap());
        assert!(ToArray {}.transform(tensor()).is_err());
        assert!(Transpose::channels_first().transform(tensor()).is_err());
        assert!(Normalization::signed_unit().transform(tensor()).is_err());
    }
}
