//! Pointer picking against entity spheres.

use glam::{Mat4, Vec2, Vec3};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Camera supplied by the host alongside each pointer action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CameraDescriptor {
    /// Right-handed perspective camera looking from `eye` toward `target`.
    LookAt {
        eye: Vec3,
        target: Vec3,
        #[serde(default = "default_up")]
        up: Vec3,
        #[serde(default = "default_fov")]
        fov_y_degrees: f32,
        #[serde(default = "default_aspect")]
        aspect: f32,
        #[serde(default = "default_near")]
        near: f32,
        #[serde(default = "default_far")]
        far: f32,
    },
    /// Column-major view and projection matrices (depth range 0..1).
    Matrices { view: [f32; 16], projection: [f32; 16] },
}

impl CameraDescriptor {
    /// Perspective camera with default lens parameters.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3) -> Self {
        Self::LookAt {
            eye,
            target,
            up: default_up(),
            fov_y_degrees: default_fov(),
            aspect: default_aspect(),
            near: default_near(),
            far: default_far(),
        }
    }

    /// Combined projection * view matrix.
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        match *self {
            Self::LookAt {
                eye,
                target,
                up,
                fov_y_degrees,
                aspect,
                near,
                far,
            } => {
                let view = Mat4::look_at_rh(eye, target, up);
                let projection =
                    Mat4::perspective_rh(fov_y_degrees.to_radians(), aspect.max(1e-6), near, far);
                projection * view
            }
            Self::Matrices { view, projection } => {
                Mat4::from_cols_array(&projection) * Mat4::from_cols_array(&view)
            }
        }
    }
}

impl Default for CameraDescriptor {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 12.0, 12.0), Vec3::ZERO)
    }
}

/// Unprojection state derived from a [`CameraDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    inverse_view_projection: Mat4,
}

impl CameraState {
    /// Returns `None` for singular or non-finite cameras.
    #[must_use]
    pub fn new(camera: &CameraDescriptor) -> Option<Self> {
        let view_projection = camera.view_projection();
        let determinant = view_projection.determinant();
        if !determinant.is_finite() || determinant.abs() <= f32::EPSILON * f32::EPSILON {
            return None;
        }
        let inverse = view_projection.inverse();
        inverse.is_finite().then_some(Self {
            inverse_view_projection: inverse,
        })
    }

    /// Ray through the NDC point `ndc` (x right, y up, both in `[-1, 1]`).
    #[must_use]
    pub fn ray(&self, ndc: Vec2) -> Option<Ray> {
        if !ndc.is_finite() {
            return None;
        }
        let near = self
            .inverse_view_projection
            .project_point3(ndc.extend(0.0));
        let far = self
            .inverse_view_projection
            .project_point3(ndc.extend(1.0));
        let direction = (far - near).normalize_or_zero();
        if !near.is_finite() || direction == Vec3::ZERO {
            return None;
        }
        Some(Ray {
            origin: near,
            direction,
        })
    }
}

/// Half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Entry distance into the sphere, 0 when the origin is inside.
    #[must_use]
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let offset = self.origin - center;
        let b = offset.dot(self.direction);
        let c = offset.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let exit = -b + root;
        if exit < 0.0 {
            return None;
        }
        Some((-b - root).max(0.0))
    }

    /// Hit point on the horizontal plane `y = height`, if ahead of the origin.
    #[must_use]
    pub fn intersect_plane_y(&self, height: f32) -> Option<Vec3> {
        if self.direction.y.abs() <= f32::EPSILON {
            return None;
        }
        let t = (height - self.origin.y) / self.direction.y;
        (t >= 0.0 && t.is_finite()).then(|| self.at(t))
    }
}

/// Nearest entity under the pointer. Each entity is a sphere of radius
/// `tolerance`; exact distance ties resolve to the lowest id.
#[must_use]
pub fn pick(
    pointer: Vec2,
    camera: &CameraState,
    positions: impl IntoIterator<Item = (EntityId, Vec3)>,
    tolerance: f32,
) -> Option<EntityId> {
    let ray = camera.ray(pointer)?;
    pick_along(&ray, positions, tolerance)
}

pub(crate) fn pick_along(
    ray: &Ray,
    positions: impl IntoIterator<Item = (EntityId, Vec3)>,
    tolerance: f32,
) -> Option<EntityId> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return None;
    }
    positions
        .into_iter()
        .filter(|(_, position)| position.is_finite())
        .filter_map(|(id, position)| {
            ray.intersect_sphere(position, tolerance)
                .map(|distance| (OrderedFloat(distance), id))
        })
        .min()
        .map(|(_, id)| id)
}

/// Map pixel coordinates (origin top-left) to NDC with y up.
#[must_use]
pub fn normalize_pointer(x: f32, y: f32, width: f32, height: f32) -> Option<Vec2> {
    if !(width > 0.0 && height > 0.0) {
        return None;
    }
    let ndc = Vec2::new(x / width * 2.0 - 1.0, 1.0 - y / height * 2.0);
    ndc.is_finite().then_some(ndc)
}

const fn default_up() -> Vec3 {
    Vec3::Y
}

const fn default_fov() -> f32 {
    60.0
}

const fn default_aspect() -> f32 {
    1.0
}

const fn default_near() -> f32 {
    0.1
}

const fn default_far() -> f32 {
    1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntitySeed, EntityStore, Role};

    fn overhead() -> CameraState {
        CameraState::new(&CameraDescriptor::LookAt {
            eye: Vec3::new(0.0, 20.0, 0.0),
            target: Vec3::ZERO,
            up: Vec3::NEG_Z,
            fov_y_degrees: 60.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        })
        .expect("camera")
    }

    fn ids(count: usize) -> Vec<EntityId> {
        let mut store = EntityStore::new();
        store.create_all((0..count).map(|_| EntitySeed::new(Vec3::ZERO, Role::Free)))
    }

    #[test]
    fn center_ray_points_at_target() {
        let ray = overhead().ray(Vec2::ZERO).expect("ray");
        assert!((ray.direction - Vec3::NEG_Y).length() < 1e-4);
        let ground = ray.intersect_plane_y(0.0).expect("ground");
        assert!(ground.length() < 1e-3);
    }

    #[test]
    fn nearest_entity_wins() {
        let ids = ids(2);
        let positions = [(ids[0], Vec3::ZERO), (ids[1], Vec3::new(0.0, 5.0, 0.0))];
        assert_eq!(pick(Vec2::ZERO, &overhead(), positions, 0.5), Some(ids[1]));
    }

    #[test]
    fn exact_ties_resolve_to_lowest_id() {
        let ids = ids(3);
        let positions = [
            (ids[2], Vec3::ZERO),
            (ids[0], Vec3::ZERO),
            (ids[1], Vec3::ZERO),
        ];
        let lowest = *ids.iter().min().expect("ids");
        for _ in 0..5 {
            assert_eq!(pick(Vec2::ZERO, &overhead(), positions, 0.5), Some(lowest));
        }
    }

    #[test]
    fn misses_and_empty_sets_return_none() {
        let ids = ids(1);
        let far_away = [(ids[0], Vec3::new(8.0, 0.0, 0.0))];
        assert_eq!(pick(Vec2::ZERO, &overhead(), far_away, 0.5), None);
        assert_eq!(pick(Vec2::ZERO, &overhead(), [], 0.5), None);
        assert_eq!(
            pick(Vec2::new(f32::NAN, 0.0), &overhead(), far_away, 0.5),
            None
        );
    }

    #[test]
    fn degenerate_camera_is_rejected() {
        let camera = CameraDescriptor::Matrices {
            view: [0.0; 16],
            projection: Mat4::IDENTITY.to_cols_array(),
        };
        assert!(CameraState::new(&camera).is_none());
    }

    #[test]
    fn sphere_behind_the_ray_is_missed() {
        let ray = Ray {
            origin: Vec3::ZERO,
            direction: Vec3::X,
        };
        assert_eq!(ray.intersect_sphere(Vec3::new(-5.0, 0.0, 0.0), 1.0), None);
        assert_eq!(ray.intersect_sphere(Vec3::new(5.0, 0.0, 0.0), 1.0), Some(4.0));
        assert_eq!(ray.intersect_sphere(Vec3::ZERO, 1.0), Some(0.0));
    }

    #[test]
    fn pointer_normalization_flips_y() {
        assert_eq!(
            normalize_pointer(0.0, 0.0, 200.0, 100.0),
            Some(Vec2::new(-1.0, 1.0))
        );
        assert_eq!(
            normalize_pointer(100.0, 50.0, 200.0, 100.0),
            Some(Vec2::ZERO)
        );
        assert_eq!(normalize_pointer(1.0, 1.0, 0.0, 100.0), None);
    }

    #[test]
    fn descriptor_parses_with_defaults() {
        let json = r#"{"kind":"look-at","eye":[0,5,5],"target":[0,0,0]}"#;
        let camera: CameraDescriptor = serde_json::from_str(json).expect("camera");
        assert_eq!(camera, CameraDescriptor::look_at(Vec3::new(0.0, 5.0, 5.0), Vec3::ZERO));
    }
}
