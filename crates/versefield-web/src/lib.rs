#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, anyhow, ensure};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use versefield_core::{
    CameraDescriptor, Dispatch, FrameSnapshot, Payload, PointerInput, SceneHandle, SceneManager,
    VignetteDescriptor, normalize_pointer,
};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct StageHandle {
    inner: Rc<RefCell<Stage>>,
}

struct Stage {
    manager: SceneManager,
    handle: Option<SceneHandle>,
    camera: CameraDescriptor,
    next_sequence: u64,
    seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
struct StageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    camera: Option<CameraDescriptor>,
}

/// Result of a host input, as seen from JavaScript.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchReport {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
}

impl From<Dispatch> for DispatchReport {
    fn from(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Handled { from, to } => Self {
                outcome: "handled",
                from: Some(from.to_string()),
                to: Some(to.to_string()),
            },
            Dispatch::Ignored => Self::bare("ignored"),
            Dispatch::Stale => Self::bare("stale"),
            Dispatch::Duplicate => Self::bare("duplicate"),
        }
    }
}

impl DispatchReport {
    fn bare(outcome: &'static str) -> Self {
        Self {
            outcome,
            from: None,
            to: None,
        }
    }
}

impl Stage {
    fn new(options: StageOptions) -> Self {
        Self {
            manager: SceneManager::new(),
            handle: None,
            camera: options.camera.unwrap_or_default(),
            next_sequence: 0,
            seed: None,
        }
    }

    fn activate(&mut self, mut descriptor: VignetteDescriptor) -> Result<u64> {
        let seed = descriptor.seed.unwrap_or_else(random_seed);
        descriptor.seed = Some(seed);
        let handle = self.manager.activate(descriptor)?;
        self.handle = Some(handle);
        self.seed = Some(seed);
        Ok(seed)
    }

    fn current(&self) -> Result<SceneHandle> {
        self.handle.ok_or_else(|| anyhow!("no vignette is active"))
    }

    fn tick(&mut self, steps: u32) -> Result<FrameSnapshot> {
        let handle = self.current()?;
        for _ in 0..steps {
            if self.manager.tick(handle).is_none() {
                break;
            }
        }
        self.snapshot()
    }

    fn pointer(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<Dispatch> {
        let handle = self.current()?;
        let ndc = normalize_pointer(x, y, width, height)
            .ok_or_else(|| anyhow!("pointer or canvas size is not finite and positive"))?;
        self.next_sequence += 1;
        let input = PointerInput {
            ndc,
            sequence: self.next_sequence,
        };
        Ok(self.manager.pointer(handle, input, &self.camera))
    }

    fn control(&mut self, action: &str, payload: Payload) -> Result<Dispatch> {
        let handle = self.current()?;
        Ok(self.manager.control(handle, action, payload))
    }

    fn snapshot(&self) -> Result<FrameSnapshot> {
        self.manager
            .snapshot()
            .ok_or_else(|| anyhow!("no vignette is active"))
    }

    fn deactivate(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => self.manager.deactivate(handle),
            None => false,
        }
    }
}

#[wasm_bindgen]
impl StageHandle {
    /// Activate a vignette descriptor; returns the RNG seed in use.
    #[wasm_bindgen(js_name = activate)]
    pub fn activate_js(&self, descriptor: JsValue) -> Result<f64, JsValue> {
        let descriptor = if let Some(json) = descriptor.as_string() {
            VignetteDescriptor::from_json(&json).map_err(js_error)?
        } else {
            from_value::<VignetteDescriptor>(descriptor).map_err(js_error)?
        };
        let seed = self.inner.borrow_mut().activate(descriptor).map_err(js_error)?;
        Ok(seed as f64)
    }

    #[wasm_bindgen(js_name = tick)]
    pub fn tick_js(&self, steps: u32) -> Result<JsValue, JsValue> {
        let snapshot = self.inner.borrow_mut().tick(steps).map_err(js_error)?;
        to_value(&snapshot).map_err(js_error)
    }

    /// Pointer press at canvas pixel `(x, y)`.
    #[wasm_bindgen(js_name = pointer)]
    pub fn pointer_js(&self, x: f32, y: f32, width: f32, height: f32) -> Result<JsValue, JsValue> {
        let dispatch = self
            .inner
            .borrow_mut()
            .pointer(x, y, width, height)
            .map_err(js_error)?;
        to_value(&DispatchReport::from(dispatch)).map_err(js_error)
    }

    #[wasm_bindgen(js_name = control)]
    pub fn control_js(&self, action: &str, payload: JsValue) -> Result<JsValue, JsValue> {
        let payload = if payload.is_null() || payload.is_undefined() {
            Payload::None
        } else {
            from_value::<Payload>(payload).map_err(js_error)?
        };
        let dispatch = self
            .inner
            .borrow_mut()
            .control(action, payload)
            .map_err(js_error)?;
        to_value(&DispatchReport::from(dispatch)).map_err(js_error)
    }

    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot_js(&self) -> Result<JsValue, JsValue> {
        let snapshot = self.inner.borrow().snapshot().map_err(js_error)?;
        to_value(&snapshot).map_err(js_error)
    }

    #[wasm_bindgen(js_name = setCamera)]
    pub fn set_camera_js(&self, camera: JsValue) -> Result<(), JsValue> {
        let camera = from_value::<CameraDescriptor>(camera).map_err(js_error)?;
        self.inner.borrow_mut().camera = camera;
        Ok(())
    }

    #[wasm_bindgen(js_name = deactivate)]
    pub fn deactivate_js(&self) -> bool {
        self.inner.borrow_mut().deactivate()
    }

    #[wasm_bindgen(getter)]
    pub fn seed(&self) -> Option<f64> {
        self.inner.borrow().seed.map(|seed| seed as f64)
    }
}

#[wasm_bindgen]
pub fn init_stage(options: JsValue) -> Result<StageHandle, JsValue> {
    let options = if options.is_null() || options.is_undefined() {
        StageOptions::default()
    } else {
        from_value::<StageOptions>(options).map_err(js_error)?
    };
    Ok(StageHandle {
        inner: Rc::new(RefCell::new(Stage::new(options))),
    })
}

/// Check a JS number is usable as a pinned seed.
#[wasm_bindgen]
pub fn normalize_seed(seed: f64) -> Result<f64, JsValue> {
    checked_seed(seed).map(|seed| seed as f64).map_err(js_error)
}

fn checked_seed(value: f64) -> Result<u64> {
    ensure!(value.is_finite(), "seed must be a finite number");
    ensure!(value >= 0.0, "seed must be non-negative");
    let truncated = value.floor();
    ensure!(
        truncated <= u64::MAX as f64,
        "seed must be representable as u64"
    );
    Ok(truncated as u64)
}

fn random_seed() -> u64 {
    (js_sys::Math::random() * 2f64.powi(53)) as u64
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsError::new(&err.to_string()).into()
}

#[wasm_bindgen]
pub fn version() -> String {
    format!("versefield-web {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use versefield_core::{
        CollapseSpec, EntitySeed, InteractionSpec, Role, StateLabel, Vec2, Vec3,
    };
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn collapse_descriptor(seed: u64) -> VignetteDescriptor {
        let json = r#"{"name": "wasm-collapse", "entities": []}"#;
        let mut descriptor = VignetteDescriptor::from_json(json).expect("descriptor");
        descriptor.seed = Some(seed);
        descriptor.entities = (0..12)
            .map(|i| EntitySeed::new(Vec3::new(i as f32 - 6.0, 0.0, 1.0), Role::Free))
            .collect();
        descriptor.interaction = InteractionSpec::Collapse(CollapseSpec {
            increment: 0.1,
            roles: vec![Role::Free],
            spread: 0.2,
            empty_space: true,
        });
        descriptor
    }

    #[wasm_bindgen_test]
    fn stage_matches_native_manager() {
        for seed in [7_u64, 8102, 202_501] {
            let camera = CameraDescriptor::default();

            let mut native = SceneManager::new();
            let handle = native.activate(collapse_descriptor(seed)).expect("native");
            native.pointer(
                handle,
                PointerInput {
                    ndc: Vec2::ZERO,
                    sequence: 1,
                },
                &camera,
            );
            for _ in 0..20 {
                native.tick(handle);
            }
            let expected = native.snapshot().expect("native snapshot");

            let mut stage = Stage::new(StageOptions::default());
            assert_eq!(stage.activate(collapse_descriptor(seed)).expect("stage"), seed);
            stage.pointer(50.0, 50.0, 100.0, 100.0).expect("pointer");
            let actual = stage.tick(20).expect("tick");

            assert_eq!(actual.state, StateLabel::Settled);
            assert_eq!(expected.tick, actual.tick);
            assert_eq!(expected.entities.len(), actual.entities.len());
            for (lhs, rhs) in expected.entities.iter().zip(&actual.entities) {
                assert_eq!(lhs.role, rhs.role);
                for axis in 0..3 {
                    assert!((lhs.position[axis] - rhs.position[axis]).abs() <= 1e-5);
                }
            }
        }
    }

    #[wasm_bindgen_test]
    fn stale_stage_reports_errors() {
        let mut stage = Stage::new(StageOptions::default());
        assert!(stage.tick(1).is_err());
        stage.activate(collapse_descriptor(1)).expect("stage");
        assert!(stage.deactivate());
        assert!(!stage.deactivate());
        assert!(stage.control("reset", Payload::None).is_err());
    }

    #[wasm_bindgen_test]
    fn seeds_are_validated() {
        assert_eq!(checked_seed(42.9).expect("seed"), 42);
        assert!(checked_seed(-1.0).is_err());
        assert!(checked_seed(f64::NAN).is_err());
    }
}
