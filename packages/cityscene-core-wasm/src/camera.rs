use nalgebra::{Matrix4, Perspective3, Point3, Vector3, Vector4};

use crate::config::{CameraConfig, ControlsConfig};

const POLAR_EPS: f64 = 1e-6;

/// Perspective camera with an OpenGL-style clip space (z in [-1, 1]). The GPU
/// renderer converts to its own depth range.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_deg: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    pub position: Point3<f64>,
    pub target: Point3<f64>,
    pub up: Vector3<f64>,
    projection: Matrix4<f64>,
}

impl PerspectiveCamera {
    pub fn new(fov_deg: f64, aspect: f64, near: f64, far: f64) -> Self {
        let mut camera = Self {
            fov_deg,
            aspect,
            near,
            far,
            position: Point3::new(0.0, 0.0, 1.0),
            target: Point3::origin(),
            up: Vector3::y(),
            projection: Matrix4::identity(),
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn from_config(config: &CameraConfig, aspect: f64) -> Self {
        let mut camera = Self::new(config.fov, aspect, config.near, config.far);
        let [x, y, z] = config.position;
        camera.position = Point3::new(x, y, z);
        let [tx, ty, tz] = config.target;
        camera.look_at(Point3::new(tx, ty, tz));
        camera
    }

    pub fn look_at(&mut self, target: Point3<f64>) {
        self.target = target;
    }

    pub fn set_aspect(&mut self, aspect: f64) {
        self.aspect = aspect;
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        let aspect = if self.aspect.is_finite() && self.aspect > 0.0 {
            self.aspect
        } else {
            1.0
        };
        self.projection =
            Perspective3::new(aspect, self.fov_deg.to_radians(), self.near, self.far).to_homogeneous();
    }

    pub fn projection_matrix(&self) -> &Matrix4<f64> {
        &self.projection
    }

    pub fn view_matrix(&self) -> Matrix4<f64> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    pub fn view_projection(&self) -> Matrix4<f64> {
        self.projection * self.view_matrix()
    }

    pub fn distance_to_target(&self) -> f64 {
        (self.position - self.target).norm()
    }

    /// World position to normalized device coordinates. `None` when the point is
    /// behind the camera.
    pub fn project(&self, world: [f64; 3]) -> Option<[f64; 3]> {
        let clip = self.view_projection() * Vector4::new(world[0], world[1], world[2], 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        Some([clip.x / clip.w, clip.y / clip.w, clip.z / clip.w])
    }
}

/// Orbit-style controls: drag to rotate around the target, secondary drag to
/// pan, wheel to dolly. Input is accumulated and applied in `update`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Point3<f64>,
    pub enabled: bool,
    pub rotate_speed: f64,
    pub zoom_speed: f64,
    pub pan_speed: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    pub damping: f64,
    delta_theta: f64,
    delta_phi: f64,
    scale: f64,
    pan_offset: Vector3<f64>,
}

impl OrbitControls {
    pub fn new(config: &ControlsConfig, target: Point3<f64>) -> Self {
        Self {
            target,
            enabled: true,
            rotate_speed: config.rotate_speed,
            zoom_speed: config.zoom_speed,
            pan_speed: config.pan_speed,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            damping: config.damping.clamp(0.0, 0.99),
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vector3::zeros(),
        }
    }

    /// Pointer delta in pixels; a drag across the full viewport height is one turn.
    pub fn rotate(&mut self, dx_px: f64, dy_px: f64, viewport_height: f64) {
        if !self.enabled || viewport_height <= 0.0 {
            return;
        }
        let turn = 2.0 * std::f64::consts::PI * self.rotate_speed / viewport_height;
        self.delta_theta -= dx_px * turn;
        self.delta_phi -= dy_px * turn;
    }

    /// Pointer delta in pixels, converted so the target tracks the cursor.
    pub fn pan(&mut self, dx_px: f64, dy_px: f64, viewport_height: f64, camera: &PerspectiveCamera) {
        if !self.enabled || viewport_height <= 0.0 {
            return;
        }
        let view_height = 2.0 * camera.distance_to_target() * (camera.fov_deg.to_radians() * 0.5).tan();
        let units_per_px = view_height / viewport_height * self.pan_speed;

        let forward = (camera.target - camera.position).normalize();
        let right = forward.cross(&camera.up).normalize();
        let up = right.cross(&forward);
        self.pan_offset += right * (-dx_px * units_per_px) + up * (dy_px * units_per_px);
    }

    /// Wheel delta; positive moves away from the target.
    pub fn zoom(&mut self, wheel_delta_y: f64) {
        if !self.enabled || wheel_delta_y == 0.0 {
            return;
        }
        let step = 0.95f64.powf(self.zoom_speed);
        if wheel_delta_y > 0.0 {
            self.scale /= step;
        } else {
            self.scale *= step;
        }
    }

    /// Apply pending input to the camera. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - self.target;
        let mut radius = offset.norm();
        let (mut theta, mut phi) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, std::f64::consts::FRAC_PI_2)
        };

        theta += self.delta_theta;
        phi = (phi + self.delta_phi).clamp(POLAR_EPS, std::f64::consts::PI - POLAR_EPS);
        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset;

        let new_offset = Vector3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );
        let new_position = self.target + new_offset;
        let moved = (new_position - camera.position).norm() > 1e-9 || camera.target != self.target;

        camera.position = new_position;
        camera.look_at(self.target);

        if self.damping > 0.0 {
            self.delta_theta *= self.damping;
            self.delta_phi *= self.damping;
            self.pan_offset *= self.damping;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vector3::zeros();
        }
        self.scale = 1.0;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::from_config(&CameraConfig::default(), 16.0 / 9.0)
    }

    #[test]
    fn set_aspect_updates_projection() {
        let mut cam = camera();
        let before = *cam.projection_matrix();
        cam.set_aspect(2.0);
        assert_relative_eq!(cam.aspect, 2.0);
        assert_ne!(before, *cam.projection_matrix());
        // x scale is f / aspect
        let f = 1.0 / (60f64.to_radians() / 2.0).tan();
        assert_relative_eq!(cam.projection_matrix()[(0, 0)], f / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn target_projects_to_screen_center() {
        let cam = camera();
        let ndc = cam.project([0.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(ndc[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(ndc[1], 0.0, epsilon = 1e-9);
        assert!(cam.project([40.0, 40.0, 40.0]).is_none());
    }

    #[test]
    fn rotation_keeps_distance() {
        let mut cam = camera();
        let mut controls = OrbitControls::new(&ControlsConfig::default(), Point3::origin());
        let distance = cam.distance_to_target();
        controls.rotate(120.0, 40.0, 800.0);
        assert!(controls.update(&mut cam));
        assert_relative_eq!(cam.distance_to_target(), distance, epsilon = 1e-9);
        assert!(!controls.update(&mut cam));
    }

    #[test]
    fn polar_angle_stays_off_the_pole() {
        let mut cam = camera();
        let mut controls = OrbitControls::new(&ControlsConfig::default(), Point3::origin());
        controls.rotate(0.0, 10_000.0, 100.0);
        controls.update(&mut cam);
        assert!(cam.position.y.abs() < cam.distance_to_target());
    }

    #[test]
    fn zoom_is_clamped() {
        let mut cam = camera();
        let config = ControlsConfig {
            min_distance: 10.0,
            max_distance: 50.0,
            ..ControlsConfig::default()
        };
        let mut controls = OrbitControls::new(&config, Point3::origin());
        for _ in 0..100 {
            controls.zoom(-1.0);
        }
        controls.update(&mut cam);
        assert_relative_eq!(cam.distance_to_target(), 10.0, epsilon = 1e-9);
        for _ in 0..100 {
            controls.zoom(1.0);
        }
        controls.update(&mut cam);
        assert_relative_eq!(cam.distance_to_target(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn pan_moves_target_and_camera_together() {
        let mut cam = camera();
        let mut controls = OrbitControls::new(&ControlsConfig::default(), Point3::origin());
        let offset_before = cam.position - cam.target;
        controls.pan(50.0, 0.0, 600.0, &cam);
        controls.update(&mut cam);
        assert!(controls.target != Point3::origin());
        assert_eq!(cam.target, controls.target);
        assert_relative_eq!((cam.position - cam.target).norm(), offset_before.norm(), epsilon = 1e-9);
    }

    #[test]
    fn disabled_controls_ignore_input() {
        let mut cam = camera();
        let mut controls = OrbitControls::new(&ControlsConfig::default(), Point3::origin());
        controls.enabled = false;
        let before = cam.position;
        controls.rotate(100.0, 100.0, 500.0);
        controls.zoom(1.0);
        controls.update(&mut cam);
        assert_relative_eq!((cam.position - before).norm(), 0.0, epsilon = 1e-9);
    }
}
