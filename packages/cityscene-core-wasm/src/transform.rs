use serde::{Deserialize, Serialize};

/// Maps absolute projected coordinates onto scene-local units around a fixed
/// map center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalTransform {
    pub center: [f64; 2],
    pub scale: f64,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            // EPSG:3587 position of Karlsruhe, the dataset the viewer ships with
            center: [935570.0651499415, 6276230.15514086],
            scale: 10.0,
        }
    }
}

impl LocalTransform {
    pub fn new(center: [f64; 2], scale: f64) -> Self {
        Self { center, scale }
    }

    pub fn to_local(&self, x: f64, y: f64) -> [f64; 2] {
        [
            (x - self.center[0]) / self.scale,
            (y - self.center[1]) / self.scale,
        ]
    }

    pub fn to_world(&self, x: f64, y: f64) -> [f64; 2] {
        [
            x * self.scale + self.center[0],
            y * self.scale + self.center[1],
        ]
    }

    /// Heights share the planar scale.
    pub fn depth(&self, height: f64) -> f64 {
        height / self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projects_point_relative_to_center() {
        let t = LocalTransform::new([935570.065, 6276230.155], 10.0);
        let p = t.to_local(935580.065, 6276240.155);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-6);

        let back = t.to_world(p[0], p[1]);
        assert_relative_eq!(back[0], 935580.065, epsilon = 1e-6);
        assert_relative_eq!(back[1], 6276240.155, epsilon = 1e-6);
    }

    #[test]
    fn depth_is_height_over_scale() {
        let t = LocalTransform::new([0.0, 0.0], 10.0);
        assert_relative_eq!(t.depth(50.0), 5.0);
    }
}
