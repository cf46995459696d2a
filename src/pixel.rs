//! Pixel decoding and reduction to something displayable.

use dicom::core::Tag;
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use dicom_dictionary_std::tags;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use tracing::{debug, warn};

use crate::extractor::DicomObject;

/// Decoded, rescaled pixel data of one file.
///
/// Single frames have shape `(rows, columns)` or `(rows, columns, samples)`,
/// multi-frame files carry a leading frame axis.
pub type Image = ArrayD<f32>;

/// Decode the pixel payload of `object` and apply its rescale slope and
/// intercept.
///
/// Returns `None` if the file has no pixel data or it cannot be decoded.
pub fn decode_image(object: &DicomObject) -> Option<Image> {
    let raw = decode_raw(object)?;
    let (slope, intercept) = rescale_parameters(object);
    Some(rescale(raw, slope, intercept))
}

/// Decode the stored pixel values without any modality transform.
pub fn decode_raw(object: &DicomObject) -> Option<Image> {
    let decoded = match object.decode_pixel_data() {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!("No decodable pixel data: {}", err);
            return None;
        }
    };

    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let array = match decoded.to_ndarray_with_options::<f32>(&options) {
        Ok(array) => array,
        Err(err) => {
            debug!("Pixel data conversion failed: {}", err);
            return None;
        }
    };

    // (frames, rows, columns, samples) with unit frame and sample axes dropped
    let (frames, rows, columns, samples) = array.dim();
    let mut shape = Vec::with_capacity(4);
    if frames > 1 {
        shape.push(frames);
    }
    shape.extend([rows, columns]);
    if samples > 1 {
        shape.push(samples);
    }

    match array
        .as_standard_layout()
        .into_owned()
        .into_dyn()
        .into_shape_with_order(IxDyn(&shape))
    {
        Ok(image) => Some(image),
        Err(err) => {
            debug!("Unexpected pixel array layout: {}", err);
            None
        }
    }
}

/// Rescale slope and intercept of `object`.
///
/// Missing, non-numeric and zero slopes default to 1, missing or non-numeric
/// intercepts to 0.
pub fn rescale_parameters(object: &DicomObject) -> (f32, f32) {
    let numeric = |tag: Tag| {
        object
            .element(tag)
            .ok()
            .and_then(|element| element.to_float64().ok())
            .filter(|value| value.is_finite())
    };

    let slope = numeric(tags::RESCALE_SLOPE)
        .filter(|slope| *slope != 0.0)
        .unwrap_or(1.0);
    let intercept = numeric(tags::RESCALE_INTERCEPT).unwrap_or(0.0);

    (slope as f32, intercept as f32)
}

/// Apply the linear transform `slope * raw + intercept` to every value.
pub fn rescale(raw: Image, slope: f32, intercept: f32) -> Image {
    if slope == 1.0 && intercept == 0.0 {
        return raw;
    }
    raw.mapv_into(|value| value.mul_add(slope, intercept))
}

fn is_channel_axis(shape: &[usize]) -> bool {
    shape.len() > 2 && matches!(shape[shape.len() - 1], 1 | 3 | 4)
}

/// Select a displayable 2D gray, RGB or RGBA plane from an array of any rank.
///
/// Arrays of rank 2 or lower, and rank 3 arrays with a trailing channel axis
/// of 1, 3 or 4, are returned as they are. Otherwise the middle index is
/// taken along every leading axis that is not height, width or channels.
pub fn to_display_plane(image: ArrayViewD<'_, f32>) -> ArrayViewD<'_, f32> {
    let shape = image.shape().to_vec();
    let ndim = shape.len();
    let color = is_channel_axis(&shape);

    if ndim <= 2 || (ndim == 3 && color) {
        if ndim < 2 {
            warn!("Image has unusual shape {:?}, attempting to visualise", shape);
        }
        return image;
    }

    if ndim == 3 {
        warn!("Image is volume with shape {:?}, using mid-slice", shape);
    } else if ndim == 4 && color {
        warn!("Image is RGB(A) volume with shape {:?}, using mid-slice", shape);
    } else {
        warn!("Image is unknown volume with shape {:?}, using mid-slices", shape);
    }

    let keep = if color { 3 } else { 2 };
    let mut plane = image;
    for &len in &shape[..ndim - keep] {
        plane = plane.index_axis_move(Axis(0), len / 2);
    }
    plane
}

/// Convert a display plane to an 8-bit image, normalising the value range
/// to 0..=255.
///
/// Rank 0 and 1 arrays are shown as a single row. Returns `None` for shapes
/// that [`to_display_plane`] would not produce.
pub fn to_display_image(plane: &ArrayViewD<'_, f32>) -> Option<DynamicImage> {
    let (height, width, channels) = match *plane.shape() {
        [] => (1, 1, 1),
        [len] => (1, len, 1),
        [rows, columns] => (rows, columns, 1),
        [rows, columns, samples] if matches!(samples, 1 | 3 | 4) => (rows, columns, samples),
        _ => return None,
    };

    let (min, max) = plane
        .iter()
        .filter(|value| value.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    let normalize = |value: f32| -> u8 {
        if !value.is_finite() || span <= 0.0 {
            0
        } else {
            (((value - min) / span) * 255.0).clamp(0.0, 255.0) as u8
        }
    };

    let pixels: Vec<u8> = plane.iter().map(|&v| normalize(v)).collect();
    let (width, height) = (width as u32, height as u32);

    match channels {
        1 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8),
        3 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8),
        _ => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8),
    }
}
