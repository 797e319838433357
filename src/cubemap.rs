//! Cubemap face assembly (spec §6, bit-exact).
//!
//! Faces arrive indexed 0..5 as +X, -X, -Y, +Y, +Z, -Z (Shadertoy's source
//! convention). wgpu's cubemap layer order is +X, -X, +Y, -Y, +Z, -Z, so the
//! Y faces must be swapped before upload. No vertical flip is applied.

/// Reorders six source-convention face images into wgpu cubemap layer order.
/// `faces[i]` must be indexed exactly as the doc comment describes.
pub fn reorder_faces_for_upload<T: Clone>(faces: [T; 6]) -> [T; 6] {
    let [px, nx, ny, py, pz, nz] = faces;
    [px, nx, py, ny, pz, nz]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_positive_and_negative_y() {
        let faces = ["+x", "-x", "-y", "+y", "+z", "-z"];
        let reordered = reorder_faces_for_upload(faces);
        assert_eq!(reordered, ["+x", "-x", "+y", "-y", "+z", "-z"]);
    }
}
