//! The element contract.
//!
//! Concrete element behavior lives outside the registry. The registry only
//! needs a property interface, lifecycle hooks, and a way to clone an element
//! so that property writes can be validated on a copy before committing.

use crate::{ElementFault, PropertyAccess, PropertyError, PropertyMap};
use gridkernel_random::RandomSource;
use gridkernel_types::{Gid, Vp};

/// Whether a property may change after the element has been initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Writable only in the `Created` and `Initialized` states.
    Structural,
    /// Writable in any state.
    Dynamic,
}

/// Cloning into a boxed trait object. Implemented for every `Element + Clone`.
pub trait ElementClone {
    fn clone_box(&self) -> Box<dyn Element>;
}

impl<T> ElementClone for T
where
    T: Element + Clone,
{
    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

/// A simulation element hosted by the registry.
///
/// Hooks default to no-ops. A failing hook returns an [`ElementFault`]; the
/// sweep that invoked it keeps going and reports the fault afterwards.
pub trait Element: ElementClone + Send + Sync + 'static {
    /// Write the element's own properties into `status`.
    fn get_status(&self, status: &mut PropertyMap);

    /// Apply properties. Every key the element understands must be read
    /// through `props`; the caller rejects whatever is left unread.
    fn set_status(&mut self, props: &mut PropertyAccess<'_>) -> Result<(), PropertyError>;

    fn mutability(&self, _key: &str) -> Mutability {
        Mutability::Dynamic
    }

    /// One-time initialization, run by the first `prepare_nodes` after creation.
    fn init(&mut self) -> Result<(), ElementFault> {
        Ok(())
    }

    /// Reset observable state to the model's defaults.
    ///
    /// Structural properties and the lifecycle state are left alone.
    fn init_state(&mut self) -> Result<(), ElementFault> {
        Ok(())
    }

    /// Per-run preparation.
    fn prepare(&mut self, _ctx: &mut PrepareContext<'_>) -> Result<(), ElementFault> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), ElementFault> {
        Ok(())
    }

    fn post_run_cleanup(&mut self) -> Result<(), ElementFault> {
        Ok(())
    }

    /// Whether the element needs waveform-relaxation iterations each step.
    fn uses_wfr(&self) -> bool {
        false
    }
}

impl Clone for Box<dyn Element> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// What `prepare` sees of the instance it runs on.
pub struct PrepareContext<'a> {
    gid: Gid,
    vp: Vp,
    rng: &'a mut dyn RandomSource,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn new(gid: Gid, vp: Vp, rng: &'a mut dyn RandomSource) -> Self {
        Self { gid, vp, rng }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn vp(&self) -> Vp {
        self.vp
    }

    /// The random stream of the VP running this instance.
    pub fn rng(&mut self) -> &mut (dyn RandomSource + 'a) {
        &mut *self.rng
    }
}

impl std::fmt::Debug for PrepareContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrepareContext")
            .field("gid", &self.gid)
            .field("vp", &self.vp)
            .finish_non_exhaustive()
    }
}
