use crate::brief::Descriptor;

/// A point of interest in an image.
///
/// Coordinates are integer pixels of the full resolution image, +x facing right
/// and +y facing down from the top left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: u32,
    pub y: u32,
    /// The orientation angle in radians, 0 when orientation is disabled.
    pub angle: f32,
    /// The pyramid layer in which the keypoint was detected.
    pub layer: usize,
    /// The magnitude of response from the corner detector.
    pub response: u32,
}

/// Keypoints of one image together with their descriptors.
///
/// `descriptors()[i]` always describes `keypoints()[i]`, and the order is the
/// extraction order: by pyramid layer, then by scan position within the layer.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    keypoints: Vec<KeyPoint>,
    descriptors: Vec<Descriptor>,
    descriptor_bits: usize,
}

impl ExtractionResult {
    /// Pair up keypoints with their descriptors.
    ///
    /// # Panics
    /// If the two vectors differ in length.
    pub fn new(
        keypoints: Vec<KeyPoint>,
        descriptors: Vec<Descriptor>,
        descriptor_bits: usize,
    ) -> Self {
        assert_eq!(
            keypoints.len(),
            descriptors.len(),
            "every keypoint needs exactly one descriptor"
        );
        Self {
            keypoints,
            descriptors,
            descriptor_bits,
        }
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Number of meaningful bits in every descriptor.
    pub fn descriptor_bits(&self) -> usize {
        self.descriptor_bits
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyPoint, &Descriptor)> + '_ {
        self.keypoints.iter().zip(self.descriptors.iter())
    }

    pub fn into_parts(self) -> (Vec<KeyPoint>, Vec<Descriptor>) {
        (self.keypoints, self.descriptors)
    }
}
