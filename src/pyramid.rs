use crate::image::downscale;
use image::GrayImage;
use log::*;

/// One level of the image pyramid.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Index of the layer, 0 being the input image.
    pub level: usize,
    /// Multiply layer coordinates by this to get input image coordinates.
    pub scale: u32,
    pub image: GrayImage,
}

/// Build an image pyramid by repeated downscaling.
///
/// At most `num_layers` layers are produced. Construction stops as soon as the
/// next layer would be narrower or shorter than `min_size`, since no descriptor
/// patch could fit in it.
pub fn build(image: &GrayImage, num_layers: usize, factor: u32, min_size: u32) -> Vec<Layer> {
    let mut layers = vec![Layer {
        level: 0,
        scale: 1,
        image: image.clone(),
    }];
    while layers.len() < num_layers {
        let previous = &layers[layers.len() - 1];
        let (width, height) = previous.image.dimensions();
        if width / factor < min_size || height / factor < min_size {
            debug!(
                "Stopping pyramid at {} layers, next layer would be {}x{}.",
                layers.len(),
                width / factor,
                height / factor
            );
            break;
        }
        let next = Layer {
            level: previous.level + 1,
            scale: previous.scale * factor,
            image: downscale(&previous.image, factor),
        };
        trace!(
            "Built pyramid layer {} of size {}x{}.",
            next.level,
            next.image.width(),
            next.image.height()
        );
        layers.push(next);
    }
    layers
}
