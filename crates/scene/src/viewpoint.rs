use glam::{Mat4, Vec3};
use std::f32::consts::PI;

/// Minimum squared sine between the view direction and `up`.
const PARALLEL_EPSILON: f32 = 1e-6;

/// Errors from deriving viewpoint matrices.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ViewpointError {
    #[error("invalid viewport dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("invalid aspect ratio {0}")]
    InvalidAspect(f32),
    #[error("field of view {0} rad is outside (0, pi)")]
    InvalidFieldOfView(f32),
    #[error("invalid clip range: near={near}, far={far}")]
    InvalidClipRange { near: f32, far: f32 },
    #[error("degenerate camera: eye, center and up do not define a view")]
    DegenerateCamera,
}

/// Inputs for a viewpoint, minus the viewport size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewpointSettings {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
}

impl Default for ViewpointSettings {
    fn default() -> Self {
        Self {
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 10.0,
            eye: Vec3::new(3.0, 3.0, 3.0),
            center: Vec3::ZERO,
            up: Vec3::Z,
        }
    }
}

impl ViewpointSettings {
    pub fn derive(&self, width: u32, height: u32) -> Result<Viewpoint, ViewpointError> {
        Viewpoint::derive(
            width,
            height,
            self.fov_y,
            self.near,
            self.far,
            self.eye,
            self.center,
            self.up,
        )
    }
}

/// Projection and camera matrices together with the inputs they came from.
///
/// Fields are only reachable through setters that recompute both matrices,
/// so a `Viewpoint` never carries stale derived state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    eye: Vec3,
    center: Vec3,
    up: Vec3,
    projection: Mat4,
    camera: Mat4,
}

impl Viewpoint {
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        width: u32,
        height: u32,
        fov_y: f32,
        near: f32,
        far: f32,
        eye: Vec3,
        center: Vec3,
        up: Vec3,
    ) -> Result<Self, ViewpointError> {
        if width == 0 || height == 0 {
            return Err(ViewpointError::InvalidDimensions { width, height });
        }
        let aspect = width as f32 / height as f32;
        Self::from_parts(fov_y, aspect, near, far, eye, center, up)
    }

    fn from_parts(
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
        eye: Vec3,
        center: Vec3,
        up: Vec3,
    ) -> Result<Self, ViewpointError> {
        let projection = projection_matrix(fov_y, aspect, near, far)?;
        let camera = camera_matrix(eye, center, up)?;
        Ok(Self {
            fov_y,
            aspect,
            near,
            far,
            eye,
            center,
            up,
            projection,
            camera,
        })
    }

    fn rebuild(&mut self, next: Result<Self, ViewpointError>) -> Result<(), ViewpointError> {
        *self = next?;
        Ok(())
    }

    pub fn set_fov_y(&mut self, fov_y: f32) -> Result<(), ViewpointError> {
        let v = *self;
        self.rebuild(Self::from_parts(fov_y, v.aspect, v.near, v.far, v.eye, v.center, v.up))
    }

    pub fn set_aspect(&mut self, aspect: f32) -> Result<(), ViewpointError> {
        let v = *self;
        self.rebuild(Self::from_parts(v.fov_y, aspect, v.near, v.far, v.eye, v.center, v.up))
    }

    pub fn set_clip(&mut self, near: f32, far: f32) -> Result<(), ViewpointError> {
        let v = *self;
        self.rebuild(Self::from_parts(v.fov_y, v.aspect, near, far, v.eye, v.center, v.up))
    }

    pub fn set_eye(&mut self, eye: Vec3) -> Result<(), ViewpointError> {
        let v = *self;
        self.rebuild(Self::from_parts(v.fov_y, v.aspect, v.near, v.far, eye, v.center, v.up))
    }

    pub fn set_center(&mut self, center: Vec3) -> Result<(), ViewpointError> {
        let v = *self;
        self.rebuild(Self::from_parts(v.fov_y, v.aspect, v.near, v.far, v.eye, center, v.up))
    }

    pub fn set_up(&mut self, up: Vec3) -> Result<(), ViewpointError> {
        let v = *self;
        self.rebuild(Self::from_parts(v.fov_y, v.aspect, v.near, v.far, v.eye, v.center, up))
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// View space to clip space (right-handed, depth in [0, 1]).
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// World space to view space.
    pub fn camera(&self) -> Mat4 {
        self.camera
    }
}

/// Right-handed perspective projection with a zero-to-one depth range.
pub fn projection_matrix(
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
) -> Result<Mat4, ViewpointError> {
    if !(fov_y.is_finite() && fov_y > 0.0 && fov_y < PI) {
        return Err(ViewpointError::InvalidFieldOfView(fov_y));
    }
    if !(aspect.is_finite() && aspect > 0.0) {
        return Err(ViewpointError::InvalidAspect(aspect));
    }
    if !(near.is_finite() && far.is_finite() && near > 0.0 && far > near) {
        return Err(ViewpointError::InvalidClipRange { near, far });
    }
    Ok(Mat4::perspective_rh(fov_y, aspect, near, far))
}

/// Right-handed look-at from `eye` toward `center`.
pub fn camera_matrix(eye: Vec3, center: Vec3, up: Vec3) -> Result<Mat4, ViewpointError> {
    if !(eye.is_finite() && center.is_finite() && up.is_finite()) {
        return Err(ViewpointError::DegenerateCamera);
    }
    let (Some(forward), Some(up_dir)) = ((center - eye).try_normalize(), up.try_normalize())
    else {
        return Err(ViewpointError::DegenerateCamera);
    };
    if forward.cross(up_dir).length_squared() < PARALLEL_EPSILON {
        return Err(ViewpointError::DegenerateCamera);
    }
    Ok(Mat4::look_at_rh(eye, center, up))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_finite(m: &Mat4) -> bool {
        m.to_cols_array().iter().all(|v| v.is_finite())
    }

    #[test]
    fn default_settings_derive() {
        let vp = ViewpointSettings::default().derive(800, 600).unwrap();
        assert!((vp.aspect() - 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(vp.eye(), Vec3::new(3.0, 3.0, 3.0));
        assert!(is_finite(&vp.projection()));
        assert!(is_finite(&vp.camera()));
    }

    #[test]
    fn projection_is_finite_and_invertible_over_grid() {
        let sizes = [(1, 1), (800, 600), (600, 800), (1920, 1080), (3, 4096)];
        let fovs = [0.01, 0.5, 45.0_f32.to_radians(), 2.0, 3.1];
        let clips = [(0.01, 0.02), (0.1, 10.0), (1.0, 1000.0), (0.5, 5.0e4)];

        for (w, h) in sizes {
            for fov in fovs {
                for (near, far) in clips {
                    let aspect = w as f32 / h as f32;
                    let m = projection_matrix(fov, aspect, near, far).unwrap();
                    assert!(is_finite(&m), "{w}x{h} fov={fov} near={near} far={far}");
                    let det = m.determinant();
                    assert!(det.is_finite() && det != 0.0);
                    assert!(is_finite(&m.inverse()));
                }
            }
        }
    }

    #[test]
    fn invalid_clip_ranges_are_rejected() {
        for (near, far) in [(0.0, 10.0), (-1.0, 10.0), (5.0, 5.0), (5.0, 1.0), (0.1, f32::NAN)] {
            let err = projection_matrix(1.0, 1.0, near, far).unwrap_err();
            assert!(matches!(err, ViewpointError::InvalidClipRange { .. }));
        }
    }

    #[test]
    fn invalid_fov_and_dimensions_are_rejected() {
        assert!(matches!(
            projection_matrix(0.0, 1.0, 0.1, 10.0),
            Err(ViewpointError::InvalidFieldOfView(_))
        ));
        assert!(matches!(
            projection_matrix(PI, 1.0, 0.1, 10.0),
            Err(ViewpointError::InvalidFieldOfView(_))
        ));
        let s = ViewpointSettings::default();
        assert_eq!(
            s.derive(0, 600),
            Err(ViewpointError::InvalidDimensions {
                width: 0,
                height: 600
            })
        );
    }

    #[test]
    fn camera_maps_eye_to_origin_over_samples() {
        let eyes = [
            Vec3::new(3.0, 3.0, 3.0),
            Vec3::new(-2.0, 0.5, 7.0),
            Vec3::new(0.0, -10.0, 0.1),
            Vec3::new(100.0, 0.0, -3.0),
        ];
        let centers = [Vec3::ZERO, Vec3::new(1.0, 2.0, -1.0)];
        let ups = [Vec3::Z, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)];

        for eye in eyes {
            for center in centers {
                for up in ups {
                    let Ok(m) = camera_matrix(eye, center, up) else {
                        // up happened to be parallel to the view direction
                        continue;
                    };
                    assert!(is_finite(&m));
                    let origin = m.transform_point3(eye);
                    assert!(origin.length() < 1e-3, "eye {eye} mapped to {origin}");
                    let back = m.inverse().transform_point3(Vec3::ZERO);
                    assert!((back - eye).length() < 1e-3);
                }
            }
        }
    }

    #[test]
    fn small_scale_cameras_are_accepted() {
        let cases = [
            (Vec3::ZERO, Vec3::new(5e-4, 0.0, 0.0), Vec3::Z),
            (Vec3::new(3.0, 3.0, 3.0), Vec3::ZERO, Vec3::new(0.0, 0.0, 5e-4)),
            (Vec3::new(1e-3, 1e-3, 0.0), Vec3::ZERO, Vec3::new(0.0, 1e-4, 1e-4)),
        ];
        for (eye, center, up) in cases {
            let m = camera_matrix(eye, center, up).unwrap();
            assert!(is_finite(&m), "eye {eye} center {center} up {up}");
            let target = m.transform_point3(center);
            assert!(target.x.abs() < 1e-5 && target.y.abs() < 1e-5 && target.z < 0.0);
        }
    }

    #[test]
    fn degenerate_cameras_are_rejected() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(
            camera_matrix(eye, eye, Vec3::Z),
            Err(ViewpointError::DegenerateCamera)
        );
        assert_eq!(
            camera_matrix(Vec3::ZERO, Vec3::new(0.0, 0.0, 5.0), Vec3::Z),
            Err(ViewpointError::DegenerateCamera)
        );
        assert_eq!(
            camera_matrix(Vec3::ZERO, Vec3::X, Vec3::ZERO),
            Err(ViewpointError::DegenerateCamera)
        );
    }

    #[test]
    fn setters_recompute_matrices() {
        let mut vp = ViewpointSettings::default().derive(800, 600).unwrap();
        let before = vp.camera();
        vp.set_eye(Vec3::new(4.0, 0.0, 1.0)).unwrap();
        assert_ne!(vp.camera(), before);
        assert!(vp.camera().transform_point3(vp.eye()).length() < 1e-4);

        let proj = vp.projection();
        vp.set_clip(0.5, 50.0).unwrap();
        assert_ne!(vp.projection(), proj);
        assert_eq!(vp.near(), 0.5);
    }

    #[test]
    fn failed_setter_leaves_viewpoint_untouched() {
        let mut vp = ViewpointSettings::default().derive(800, 600).unwrap();
        let before = vp;
        assert!(vp.set_clip(10.0, 1.0).is_err());
        assert!(vp.set_center(vp.eye()).is_err());
        assert_eq!(vp, before);
    }
}
