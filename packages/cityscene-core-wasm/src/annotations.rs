use crate::camera::PerspectiveCamera;
use crate::config::AnnotationConfig;
use crate::models::Color;

/// Colored line segments, two vertices per segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineGeometry {
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
}

impl LineGeometry {
    pub fn segment_count(&self) -> usize {
        self.positions.len() / 6
    }

    fn push_segment(&mut self, from: [f32; 3], to: [f32; 3], color: Color) {
        self.positions.extend_from_slice(&from);
        self.positions.extend_from_slice(&to);
        for _ in 0..2 {
            self.colors.extend_from_slice(&color.to_array());
        }
    }
}

/// X/Y/Z axes from the origin, drawn red, green and blue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxesHelper {
    pub size: f32,
}

impl AxesHelper {
    pub fn new(size: f32) -> Self {
        Self { size }
    }

    pub fn geometry(&self) -> LineGeometry {
        let s = self.size;
        let mut lines = LineGeometry::default();
        lines.push_segment([0.0; 3], [s, 0.0, 0.0], Color::from_hex(0xff0000));
        lines.push_segment([0.0; 3], [0.0, s, 0.0], Color::from_hex(0x00ff00));
        lines.push_segment([0.0; 3], [0.0, 0.0, s], Color::from_hex(0x0000ff));
        lines
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub position: [f64; 3],
}

impl From<&AnnotationConfig> for TextLabel {
    fn from(config: &AnnotationConfig) -> Self {
        Self {
            text: config.text.clone(),
            position: config.position,
        }
    }
}

impl TextLabel {
    /// Pixel position (origin top-left), or `None` when the label is behind the
    /// camera or outside the depth range.
    pub fn screen_position(&self, camera: &PerspectiveCamera, width: f64, height: f64) -> Option<[f64; 2]> {
        let ndc = camera.project(self.position)?;
        if !(-1.0..=1.0).contains(&ndc[2]) {
            return None;
        }
        Some([(ndc[0] + 1.0) * 0.5 * width, (1.0 - ndc[1]) * 0.5 * height])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use approx::assert_relative_eq;

    #[test]
    fn axes_have_three_colored_segments() {
        let lines = AxesHelper::new(10.0).geometry();
        assert_eq!(lines.segment_count(), 3);
        assert_eq!(lines.colors.len(), lines.positions.len());
        // y axis tip
        assert_eq!(&lines.positions[9..12], &[0.0, 10.0, 0.0]);
        assert_eq!(&lines.colors[6..9], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn label_at_target_sits_in_the_middle_of_the_viewport() {
        let camera = PerspectiveCamera::from_config(&CameraConfig::default(), 800.0 / 600.0);
        let label = TextLabel {
            text: "origin".to_string(),
            position: [0.0, 0.0, 0.0],
        };
        let [x, y] = label.screen_position(&camera, 800.0, 600.0).unwrap();
        assert_relative_eq!(x, 400.0, epsilon = 1e-6);
        assert_relative_eq!(y, 300.0, epsilon = 1e-6);

        let up = TextLabel {
            text: "up".to_string(),
            position: [0.0, 5.0, 0.0],
        };
        let [_, y_up] = up.screen_position(&camera, 800.0, 600.0).unwrap();
        assert!(y_up < 300.0);
    }

    #[test]
    fn label_behind_camera_is_hidden() {
        let camera = PerspectiveCamera::from_config(&CameraConfig::default(), 1.0);
        let label = TextLabel {
            text: "hidden".to_string(),
            position: [50.0, 50.0, 50.0],
        };
        assert!(label.screen_position(&camera, 100.0, 100.0).is_none());
    }
}
