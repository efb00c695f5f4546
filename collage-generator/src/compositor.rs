use std::io::Cursor;

use image::{
    DynamicImage, ImageFormat, Rgba, RgbaImage,
    imageops::{self, FilterType},
};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use rand::Rng;

use crate::{error::CollageError, event::BoundingBox};

/// Width and height of a freshly created collage.
pub const CANVAS_SIZE: u32 = 2048;

/// Key of the collage in the output bucket.
pub const CANVAS_KEY: &str = "collage.png";

/// Bounds of a pasted region's width, relative to the shorter side of the canvas.
const MIN_SIZE_RATIO: f64 = 0.1;
const MAX_SIZE_RATIO: f64 = 0.3;

const MAX_ROTATION_DEGREES: f32 = 20.0;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

pub fn blank_canvas() -> RgbaImage {
    RgbaImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, TRANSPARENT)
}

/// A bounding box resolved to pixels of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Scale `bounding_box` to an `image_width` x `image_height` image, truncating toward zero.
    ///
    /// The rectangle is clamped to the image. A box whose values are not finite
    /// numbers in `[0, 1]`, or which covers no whole pixel, is rejected.
    pub fn resolve(
        bounding_box: &BoundingBox,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, CollageError> {
        let BoundingBox {
            top,
            left,
            width,
            height,
        } = *bounding_box;

        for (name, value) in [
            ("Top", top),
            ("Left", left),
            ("Width", width),
            ("Height", height),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CollageError::InvalidBoundingBox(format!(
                    "{name} is {value}, expected a value in [0, 1]"
                )));
            }
        }

        let crop_left = (left * image_width as f64) as u32;
        let crop_top = (top * image_height as f64) as u32;
        let crop_width =
            ((width * image_width as f64) as u32).min(image_width.saturating_sub(crop_left));
        let crop_height =
            ((height * image_height as f64) as u32).min(image_height.saturating_sub(crop_top));

        if crop_width == 0 || crop_height == 0 {
            return Err(CollageError::EmptyCrop {
                width: crop_width,
                height: crop_height,
            });
        }

        Ok(Self {
            left: crop_left,
            top: crop_top,
            width: crop_width,
            height: crop_height,
        })
    }
}

/// Where and how a cropped region lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Counter-clockwise rotation in degrees.
    pub angle: f32,
}

impl Placement {
    /// Draw a random size, position and rotation for `crop` on a canvas.
    ///
    /// The width is drawn between 10% and 30% of the shorter canvas side and the
    /// height follows the crop's aspect ratio. A crop too tall for the canvas at
    /// that width is scaled down to the canvas height. The region always lies
    /// entirely within the canvas.
    pub fn sample(
        canvas_width: u32,
        canvas_height: u32,
        crop: &CropRect,
        rng: &mut impl Rng,
    ) -> Self {
        let short_side = canvas_width.min(canvas_height) as f64;
        let min_size = ((short_side * MIN_SIZE_RATIO) as u32).max(1);
        let max_size = ((short_side * MAX_SIZE_RATIO) as u32).max(min_size);
        let aspect_ratio = crop.height as f64 / crop.width as f64;

        let mut width = rng.random_range(min_size..=max_size);
        let mut height = (width as f64 * aspect_ratio) as u32;

        if height > canvas_height {
            height = canvas_height;
            width = (canvas_height as f64 / aspect_ratio) as u32;
        }

        let width = width.min(canvas_width).max(1);
        let height = height.max(1);

        let x = rng.random_range(0..=canvas_width - width);
        let y = rng.random_range(0..=canvas_height - height);
        let angle = rng.random_range(-MAX_ROTATION_DEGREES..=MAX_ROTATION_DEGREES);

        Self {
            x,
            y,
            width,
            height,
            angle,
        }
    }
}

fn expanded_extent(extent: f32) -> u32 {
    // absorb the float noise of sin/cos at right angles
    ((extent - 1e-3).ceil() as u32).max(1)
}

/// Rotate counter-clockwise around the center, growing the image to fit the rotated content.
///
/// Uncovered corners are fully transparent.
pub fn rotate_expanded(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let (width, height) = (image.width() as f32, image.height() as f32);
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());

    let out_width = expanded_extent(width * cos + height * sin);
    let out_height = expanded_extent(width * sin + height * cos);

    let projection = Projection::translate(out_width as f32 / 2.0, out_height as f32 / 2.0)
        * Projection::rotate(-theta)
        * Projection::translate(-width / 2.0, -height / 2.0);

    let mut rotated = RgbaImage::from_pixel(out_width, out_height, TRANSPARENT);
    warp_into(
        image,
        &projection,
        Interpolation::Nearest,
        TRANSPARENT,
        &mut rotated,
    );

    rotated
}

/// Crop the detected object out of `source`, transform it at random and alpha-blend it onto `canvas`.
pub fn composite(
    canvas: &mut RgbaImage,
    source: &DynamicImage,
    bounding_box: &BoundingBox,
    rng: &mut impl Rng,
) -> Result<Placement, CollageError> {
    let crop = CropRect::resolve(bounding_box, source.width(), source.height())?;
    let placement = Placement::sample(canvas.width(), canvas.height(), &crop, rng);

    let region = source
        .crop_imm(crop.left, crop.top, crop.width, crop.height)
        .to_rgba8();
    let region = rotate_expanded(&region, placement.angle);
    let region = imageops::resize(
        &region,
        placement.width,
        placement.height,
        FilterType::Lanczos3,
    );

    imageops::overlay(canvas, &region, placement.x as i64, placement.y as i64);

    Ok(placement)
}

pub fn decode_canvas(bytes: &[u8]) -> Result<RgbaImage, CollageError> {
    Ok(image::load_from_memory(bytes)?.into_rgba8())
}

pub fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, CollageError> {
    let mut buf = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn opaque_source(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 30, 30]),
        ))
    }

    fn bbox(top: f64, left: f64, width: f64, height: f64) -> BoundingBox {
        BoundingBox {
            top,
            left,
            width,
            height,
        }
    }

    #[test]
    fn blank_canvas_is_transparent() {
        let canvas = blank_canvas();

        assert_eq!(canvas.dimensions(), (2048, 2048));
        assert!(canvas.pixels().all(|pixel| pixel[3] == 0));
    }

    #[test]
    fn resolves_bounding_box_by_truncation() {
        let crop = CropRect::resolve(&bbox(0.1, 0.25, 0.5, 0.333), 200, 100).unwrap();

        assert_eq!(
            crop,
            CropRect {
                left: 50,
                top: 10,
                width: 100,
                height: 33
            }
        );
    }

    #[test]
    fn clamps_crop_to_source() {
        let crop = CropRect::resolve(&bbox(0.5, 0.8, 0.5, 0.75), 100, 100).unwrap();

        assert_eq!(crop.width, 20);
        assert_eq!(crop.height, 50);
    }

    #[test]
    fn zero_width_is_rejected() {
        let error = CropRect::resolve(&bbox(0.0, 0.0, 0.0, 0.5), 100, 100).unwrap_err();

        assert!(matches!(
            error,
            CollageError::EmptyCrop {
                width: 0,
                height: 50
            }
        ));
        assert!(error.is_invalid_input());
    }

    #[test]
    fn sub_pixel_box_is_rejected() {
        let error = CropRect::resolve(&bbox(0.0, 0.0, 0.001, 0.5), 100, 100).unwrap_err();

        assert!(matches!(error, CollageError::EmptyCrop { width: 0, .. }));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for bounding_box in [
            bbox(-0.1, 0.0, 0.5, 0.5),
            bbox(0.0, 1.5, 0.5, 0.5),
            bbox(0.0, 0.0, f64::NAN, 0.5),
            bbox(0.0, 0.0, 0.5, f64::INFINITY),
        ] {
            assert!(matches!(
                CropRect::resolve(&bounding_box, 100, 100),
                Err(CollageError::InvalidBoundingBox(_))
            ));
        }
    }

    #[test]
    fn placement_fits_canvas_and_keeps_aspect_ratio() {
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 300,
            height: 200,
        };

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let placement = Placement::sample(2048, 2048, &crop, &mut rng);

            assert!((204..=614).contains(&placement.width), "{placement:?}");
            assert_eq!(
                placement.height,
                (placement.width as f64 * (200.0 / 300.0)) as u32
            );
            assert!(placement.x + placement.width <= 2048);
            assert!(placement.y + placement.height <= 2048);
            assert!((-20.0..=20.0).contains(&placement.angle));
        }
    }

    #[test]
    fn tall_crop_is_scaled_to_canvas_height() {
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 10,
            height: 1000,
        };

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let placement = Placement::sample(2048, 2048, &crop, &mut rng);

            assert!(placement.height <= 2048);
            assert!(placement.width >= 1);
            assert!(placement.y + placement.height <= 2048);
            assert!(placement.x + placement.width <= 2048);
        }
    }

    #[test]
    fn very_wide_crop_keeps_a_visible_row() {
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 5000,
            height: 1,
        };
        let placement = Placement::sample(2048, 2048, &crop, &mut StdRng::seed_from_u64(3));

        assert_eq!(placement.height, 1);
    }

    #[test]
    fn rotation_expands_bounds() {
        let image = RgbaImage::from_pixel(100, 50, Rgba([255, 255, 255, 255]));

        assert_eq!(rotate_expanded(&image, 0.0).dimensions(), (100, 50));
        assert_eq!(rotate_expanded(&image, 90.0).dimensions(), (50, 100));

        let rotated = rotate_expanded(&image, 20.0);
        assert_eq!(rotated.dimensions(), (112, 82));
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
        assert_eq!(rotated.get_pixel(111, 81)[3], 0);
        assert_eq!(rotated.get_pixel(56, 41)[3], 255);
    }

    #[test]
    fn positive_angles_turn_counter_clockwise() {
        // 40x20, opaque only in its top-left 10x10 corner
        let red = Rgba([255, 0, 0, 255]);
        let mut image = RgbaImage::from_pixel(40, 20, TRANSPARENT);
        for y in 0..10 {
            for x in 0..10 {
                image.put_pixel(x, y, red);
            }
        }

        let left = rotate_expanded(&image, 90.0);
        assert_eq!(left.dimensions(), (20, 40));
        assert_eq!(*left.get_pixel(4, 35), red);
        assert_eq!(left.get_pixel(4, 4)[3], 0);
        assert_eq!(left.get_pixel(15, 4)[3], 0);
        assert_eq!(left.get_pixel(15, 35)[3], 0);

        let right = rotate_expanded(&image, -90.0);
        assert_eq!(right.dimensions(), (20, 40));
        assert_eq!(*right.get_pixel(15, 4), red);
        assert_eq!(right.get_pixel(4, 35)[3], 0);
        assert_eq!(right.get_pixel(4, 4)[3], 0);
    }

    #[test]
    fn composite_on_blank_canvas_adds_one_region() {
        let mut canvas = blank_canvas();
        let mut rng = StdRng::seed_from_u64(11);

        let placement = composite(
            &mut canvas,
            &opaque_source(120, 80),
            &BoundingBox::FULL,
            &mut rng,
        )
        .unwrap();

        assert!((204..=614).contains(&placement.width));
        assert_eq!(placement.height, (placement.width as f64 * (80.0 / 120.0)) as u32);

        let mut painted = 0u64;
        for (x, y, pixel) in canvas.enumerate_pixels() {
            if pixel[3] > 0 {
                painted += 1;
                assert!(x >= placement.x && x < placement.x + placement.width);
                assert!(y >= placement.y && y < placement.y + placement.height);
            }
        }

        assert!(painted > 0);
        assert!(painted <= placement.width as u64 * placement.height as u64);

        let center = canvas.get_pixel(
            placement.x + placement.width / 2,
            placement.y + placement.height / 2,
        );
        assert!(center[3] > 0);
    }

    #[test]
    fn transparent_region_leaves_canvas_untouched() {
        let background = Rgba([10, 20, 200, 255]);
        let mut canvas = RgbaImage::from_pixel(400, 400, background);
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, TRANSPARENT));

        composite(
            &mut canvas,
            &source,
            &BoundingBox::FULL,
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();

        assert!(canvas.pixels().all(|pixel| *pixel == background));
    }

    #[test]
    fn same_seed_reproduces_the_collage() {
        let source = opaque_source(64, 48);
        let bounding_box = bbox(0.25, 0.25, 0.5, 0.5);

        let mut first = blank_canvas();
        let mut second = blank_canvas();
        let first_placement = composite(
            &mut first,
            &source,
            &bounding_box,
            &mut StdRng::seed_from_u64(99),
        )
        .unwrap();
        let second_placement = composite(
            &mut second,
            &source,
            &bounding_box,
            &mut StdRng::seed_from_u64(99),
        )
        .unwrap();

        assert_eq!(first_placement, second_placement);
        assert!(first == second);
    }

    #[test]
    fn different_seeds_place_differently() {
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 64,
            height: 48,
        };

        let first = Placement::sample(2048, 2048, &crop, &mut StdRng::seed_from_u64(1));
        let second = Placement::sample(2048, 2048, &crop, &mut StdRng::seed_from_u64(2));

        assert_ne!(first, second);
    }

    #[test]
    fn png_encoding_is_lossless() {
        let mut canvas = blank_canvas();
        composite(
            &mut canvas,
            &opaque_source(30, 30),
            &BoundingBox::FULL,
            &mut StdRng::seed_from_u64(8),
        )
        .unwrap();

        let decoded = decode_canvas(&encode_png(&canvas).unwrap()).unwrap();

        assert!(decoded == canvas);
    }
}
