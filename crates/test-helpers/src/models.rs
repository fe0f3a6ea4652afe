//! Element models for tests.
//!
//! Each model exercises one registry concern: plain state, lifecycle faults,
//! waveform relaxation, replication, or spatial position.

use gridkernel_registry::{
    Element, ElementFault, ModelRegistry, Mutability, PrepareContext, PropertyAccess,
    PropertyError, PropertyMap, PropertyValue,
};
use gridkernel_types::{Category, Gid};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Normal element with a dynamic counter and a structural threshold.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    pub count: i64,
    pub threshold: f64,
    /// Draw taken from the VP's random stream during `prepare`.
    pub last_draw: Option<f64>,
}

impl Element for Counter {
    fn get_status(&self, status: &mut PropertyMap) {
        status.insert("count".into(), PropertyValue::Int(self.count));
        status.insert("threshold".into(), PropertyValue::Double(self.threshold));
        if let Some(draw) = self.last_draw {
            status.insert("last_draw".into(), PropertyValue::Double(draw));
        }
    }

    fn set_status(&mut self, props: &mut PropertyAccess<'_>) -> Result<(), PropertyError> {
        if let Some(threshold) = props.double("threshold")? {
            if !threshold.is_finite() {
                return Err(PropertyError::BadProperty(
                    "threshold must be finite".into(),
                ));
            }
            self.threshold = threshold;
        }
        if let Some(count) = props.int("count")? {
            self.count = count;
        }
        Ok(())
    }

    fn mutability(&self, key: &str) -> Mutability {
        match key {
            "threshold" => Mutability::Structural,
            _ => Mutability::Dynamic,
        }
    }

    fn init_state(&mut self) -> Result<(), ElementFault> {
        self.count = 0;
        self.last_draw = None;
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), ElementFault> {
        self.last_draw = Some(ctx.rng().drand());
        Ok(())
    }
}

/// Element whose `prepare` faults for a fixed set of GIDs.
#[derive(Debug, Clone, Default)]
pub struct Faulty {
    fail_on: Arc<BTreeSet<Gid>>,
    fail_finalize: bool,
    gid: Option<Gid>,
}

impl Faulty {
    pub fn failing_at(gids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail_on: Arc::new(gids.into_iter().map(Gid).collect()),
            ..Self::default()
        }
    }

    /// Also fault in `finalize` for the same GIDs.
    pub fn on_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    fn doomed(&self) -> bool {
        self.gid.is_some_and(|gid| self.fail_on.contains(&gid))
    }
}

impl Element for Faulty {
    fn get_status(&self, _status: &mut PropertyMap) {}

    fn set_status(&mut self, _props: &mut PropertyAccess<'_>) -> Result<(), PropertyError> {
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), ElementFault> {
        self.gid = Some(ctx.gid());
        if self.doomed() {
            return Err(ElementFault::new(format!("refusing to prepare {}", ctx.gid())));
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), ElementFault> {
        if self.fail_finalize && self.doomed() {
            Err(ElementFault::new("refusing to finalize"))
        } else {
            Ok(())
        }
    }
}

/// Element that needs waveform relaxation.
#[derive(Debug, Clone, Default)]
pub struct Relaxing {
    pub iterations: i64,
}

impl Element for Relaxing {
    fn get_status(&self, status: &mut PropertyMap) {
        status.insert("iterations".into(), PropertyValue::Int(self.iterations));
    }

    fn set_status(&mut self, props: &mut PropertyAccess<'_>) -> Result<(), PropertyError> {
        if let Some(iterations) = props.int("iterations")? {
            self.iterations = iterations;
        }
        Ok(())
    }

    fn uses_wfr(&self) -> bool {
        true
    }
}

/// Device that counts events and carries a label.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub label: String,
    pub events: i64,
}

impl Element for Recorder {
    fn get_status(&self, status: &mut PropertyMap) {
        status.insert("label".into(), PropertyValue::Str(self.label.clone()));
        status.insert("events".into(), PropertyValue::Int(self.events));
    }

    fn set_status(&mut self, props: &mut PropertyAccess<'_>) -> Result<(), PropertyError> {
        if let Some(label) = props.string("label")? {
            self.label = label.to_string();
        }
        if let Some(events) = props.int("events")? {
            if events < 0 {
                return Err(PropertyError::BadProperty("events must be non-negative".into()));
            }
            self.events = events;
        }
        Ok(())
    }

    fn init_state(&mut self) -> Result<(), ElementFault> {
        self.events = 0;
        Ok(())
    }

    fn post_run_cleanup(&mut self) -> Result<(), ElementFault> {
        self.events = 0;
        Ok(())
    }
}

/// Element with a planar position, fixed once initialized.
#[derive(Debug, Clone, Default)]
pub struct Positioned {
    pub position: [f64; 2],
}

impl Element for Positioned {
    fn get_status(&self, status: &mut PropertyMap) {
        status.insert(
            "position".into(),
            PropertyValue::DoubleArray(self.position.to_vec()),
        );
    }

    fn set_status(&mut self, props: &mut PropertyAccess<'_>) -> Result<(), PropertyError> {
        if let Some(position) = props.double_array("position")? {
            let [x, y] = position else {
                return Err(PropertyError::BadProperty(format!(
                    "position needs 2 coordinates, got {}",
                    position.len()
                )));
            };
            self.position = [*x, *y];
        }
        Ok(())
    }

    fn mutability(&self, key: &str) -> Mutability {
        match key {
            "position" => Mutability::Structural,
            _ => Mutability::Dynamic,
        }
    }
}

/// Models every harness registry knows:
///
/// | name | category | element |
/// |---|---|---|
/// | `counter` | Normal | [`Counter`] |
/// | `relaxing` | Normal | [`Relaxing`] |
/// | `positioned` | Normal | [`Positioned`] |
/// | `recorder` | Device | [`Recorder`] |
/// | `stimulus` | External | [`Counter`] |
pub fn standard_models() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    register(&mut models, "counter", Category::Normal, Counter::default());
    register(&mut models, "relaxing", Category::Normal, Relaxing::default());
    register(&mut models, "positioned", Category::Normal, Positioned::default());
    register(&mut models, "recorder", Category::Device, Recorder::default());
    register(&mut models, "stimulus", Category::External, Counter::default());
    models
}

fn register<E: Element + Clone>(
    models: &mut ModelRegistry,
    name: &str,
    category: Category,
    prototype: E,
) {
    models
        .register_prototype(name, category, prototype)
        .expect("test model names are distinct");
}

/// [`standard_models`] plus a Normal `faulty` model.
pub fn models_with_faulty(faulty: Faulty) -> ModelRegistry {
    let mut models = standard_models();
    register(&mut models, "faulty", Category::Normal, faulty);
    models
}
