//! Single-channel conversion: the `Loaded -> Converted` step.
//!
//! Reduces the loaded image to one channel. Besides plain luminance the
//! step can pick an RGB channel or an HSV component, which helps when the
//! features differ from the background mostly in hue or saturation.
//! HSV values follow the 8-bit convention: hue is halved to fit `0..180`,
//! saturation and value span `0..=255`.

use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::types::{DynamicImage, GrayImage, StepError};

/// Registered name of the converter.
pub const NAME: &str = "greyscale";

/// Conversion options, in the order they are offered.
pub const CONVERSIONS: [&str; 7] = [
    "Grey",
    "Hue",
    "Saturation",
    "Value",
    "Red channel",
    "Green channel",
    "Blue channel",
];

/// The greyscale converter step.
#[must_use]
pub fn step() -> ProcessStep {
    ProcessStep::new(
        NAME,
        StepFunction::Convert(greyscale),
        ParameterSet::from_distinct(vec![
            Parameter::choice("conversion", &CONVERSIONS).with_description("channel to keep"),
            Parameter::boolean("invert", false).with_description("invert the result"),
        ]),
    )
}

/// Convert `image` to the selected channel.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if `conversion` or `invert` is
/// missing, or [`StepError::Other`] for an unknown conversion.
pub fn greyscale(image: &DynamicImage, params: &ParameterSet) -> Result<DynamicImage, StepError> {
    let mut gray = match params.text("conversion")? {
        "Grey" => image.to_luma8(),
        "Red channel" => rgb_channel(image, 0),
        "Green channel" => rgb_channel(image, 1),
        "Blue channel" => rgb_channel(image, 2),
        "Hue" => hsv_channel(image, Hsv::Hue),
        "Saturation" => hsv_channel(image, Hsv::Saturation),
        "Value" => hsv_channel(image, Hsv::Value),
        other => return Err(StepError::Other(format!("unknown conversion `{other}`"))),
    };
    if params.bool("invert")? {
        image::imageops::invert(&mut gray);
    }
    Ok(DynamicImage::ImageLuma8(gray))
}

fn rgb_channel(image: &DynamicImage, index: usize) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        image::Luma([rgb.get_pixel(x, y).0[index]])
    })
}

#[derive(Clone, Copy)]
enum Hsv {
    Hue,
    Saturation,
    Value,
}

fn hsv_channel(image: &DynamicImage, component: Hsv) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        image::Luma([hsv_component(r, g, b, component)])
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsv_component(r: u8, g: u8, b: u8, component: Hsv) -> u8 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f64::from(max - min);
    match component {
        Hsv::Value => max,
        Hsv::Saturation => {
            if max == 0 {
                0
            } else {
                (255.0 * delta / f64::from(max)).round() as u8
            }
        }
        Hsv::Hue => {
            if max == min {
                return 0;
            }
            let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
            let degrees = if max == r {
                60.0 * (gf - bf) / delta
            } else if max == g {
                120.0 + 60.0 * (bf - rf) / delta
            } else {
                240.0 + 60.0 * (rf - gf) / delta
            };
            let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
            ((degrees / 2.0).round() as u8).min(179)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pixel(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(1, 1, image::Rgb([r, g, b])))
    }

    fn run(image: &DynamicImage, conversion: &str, invert: bool) -> u8 {
        let mut step = step();
        step.set_parameter("conversion", conversion).unwrap();
        step.set_parameter("invert", invert).unwrap();
        greyscale(image, step.parameters())
            .unwrap()
            .to_luma8()
            .get_pixel(0, 0)
            .0[0]
    }

    #[test]
    fn default_channel_is_grey() {
        let step = step();
        assert_eq!(step.parameters().text("conversion").unwrap(), "Grey");
        let out = greyscale(&pixel(255, 255, 255), step.parameters()).unwrap();
        assert_eq!(out.to_luma8().get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn rgb_channels() {
        let img = pixel(10, 20, 30);
        assert_eq!(run(&img, "Red channel", false), 10);
        assert_eq!(run(&img, "Green channel", false), 20);
        assert_eq!(run(&img, "Blue channel", false), 30);
        assert_eq!(run(&img, "Blue channel", true), 225);
    }

    #[test]
    fn hsv_components() {
        assert_eq!(run(&pixel(255, 0, 0), "Hue", false), 0);
        assert_eq!(run(&pixel(0, 255, 0), "Hue", false), 60);
        assert_eq!(run(&pixel(0, 0, 255), "Hue", false), 120);
        assert_eq!(run(&pixel(255, 0, 0), "Saturation", false), 255);
        assert_eq!(run(&pixel(100, 100, 100), "Saturation", false), 0);
        assert_eq!(run(&pixel(10, 200, 30), "Value", false), 200);
    }

    #[test]
    fn unknown_conversion_is_rejected() {
        let mut step = step();
        assert!(step.set_parameter("conversion", "Alpha").is_err());
    }
}
