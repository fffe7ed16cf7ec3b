use image::GrayImage;

/// Offsets `(dx, dy)` of every pixel inside a disc of the given radius.
pub fn disc(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx * dx + dy * dy <= r * r)
        .collect()
}

/// Dominant orientation of a patch by the intensity centroid method.
///
/// The angle in radians points from the patch center to the center of mass of
/// the intensities in `disc`. The disc must lie inside the image. A perfectly
/// flat patch yields 0.
pub fn intensity_centroid(image: &GrayImage, x: u32, y: u32, disc: &[(i32, i32)]) -> f32 {
    let width = image.width() as i32;
    let data = image.as_raw();
    let (x, y) = (x as i32, y as i32);
    let (mut m10, mut m01) = (0i64, 0i64);
    for &(dx, dy) in disc {
        let v = i64::from(data[((y + dy) * width + x + dx) as usize]);
        m10 += i64::from(dx) * v;
        m01 += i64::from(dy) * v;
    }
    (m01 as f32).atan2(m10 as f32)
}
