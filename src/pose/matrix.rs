/// 4x4 identity, column-major
pub const IDENTITY_POSE: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Build a column-major head pose from a position and an `[x, y, z, w]`
/// orientation quaternion: `translation(position) * rotation(orientation)`.
///
/// The quaternion is normalized first; a zero quaternion yields no rotation.
pub fn pose_matrix(position: [f32; 3], orientation: [f32; 4]) -> [f32; 16] {
    let [x, y, z, w] = orientation;
    let norm = (x * x + y * y + z * z + w * w).sqrt();

    let mut m = IDENTITY_POSE;
    if norm > f32::EPSILON {
        let (x, y, z, w) = (x / norm, y / norm, z / norm, w / norm);

        m[0] = 1.0 - 2.0 * (y * y + z * z);
        m[1] = 2.0 * (x * y + z * w);
        m[2] = 2.0 * (x * z - y * w);

        m[4] = 2.0 * (x * y - z * w);
        m[5] = 1.0 - 2.0 * (x * x + z * z);
        m[6] = 2.0 * (y * z + x * w);

        m[8] = 2.0 * (x * z + y * w);
        m[9] = 2.0 * (y * z - x * w);
        m[10] = 1.0 - 2.0 * (x * x + y * y);
    }

    m[12] = position[0];
    m[13] = position[1];
    m[14] = position[2];
    m
}
