//! The element registry of one process.

use crate::sweep::ThreadSweep;
use crate::{
    Element, ModelRegistry, Mutability, Node, NodeState, PrepareContext, PropertyAccess,
    PropertyError, PropertyMap, PropertyValue, Proxy, RegistryError, Slot, SparseNodeArray,
    SweepPhase, SweepReport,
};
use gridkernel_collective::Collective;
use gridkernel_dispatch::Dispatch;
use gridkernel_dispatch_sync::SyncDispatch;
use gridkernel_placement::{GridConfig, ThreadHosting, VpAssignment};
use gridkernel_random::{RandomSource, RngFactory, VpRng};
use gridkernel_types::{
    Category, Gid, GidCollection, GidRange, LocalId, ModelId, Rank, ThreadIndex, Vp,
};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

const GLOBAL_ID: &str = "global_id";
const MODEL: &str = "model";
const VP: &str = "vp";
const THREAD: &str = "thread";
const LOCAL: &str = "local";
const FROZEN: &str = "frozen";

/// Status keys the registry reports but never accepts.
const READ_ONLY_KEYS: [&str; 5] = [GLOBAL_ID, MODEL, VP, THREAD, LOCAL];

/// Everything one worker thread owns.
struct ThreadState {
    nodes: SparseNodeArray,
    rng: VpRng,
    /// Local ids of instances needing waveform relaxation.
    wfr_nodes: Vec<LocalId>,
    /// Population size `wfr_nodes` was computed for.
    wfr_size: Gid,
}

impl ThreadState {
    fn prepare(&mut self) -> ThreadSweep {
        let mut sweep = ThreadSweep::default();
        let ThreadState { nodes, rng, .. } = self;
        for node in nodes.iter_mut() {
            let outcome = prepare_one(node, &mut *rng);
            sweep.record(SweepPhase::Prepare, node, outcome);
        }
        sweep
    }

    fn init_state(&mut self) -> ThreadSweep {
        let mut sweep = ThreadSweep::default();
        for node in self.nodes.iter_mut() {
            let outcome = node.element_mut().init_state();
            sweep.record(SweepPhase::InitState, node, outcome);
        }
        sweep
    }

    fn finalize(&mut self) -> ThreadSweep {
        let mut sweep = ThreadSweep::default();
        for node in self.nodes.iter_mut() {
            let outcome = node.element_mut().finalize();
            if sweep.record(SweepPhase::Finalize, node, outcome) {
                node.set_state(NodeState::Finalized);
            }
        }
        sweep
    }

    fn post_run_cleanup(&mut self) -> ThreadSweep {
        let mut sweep = ThreadSweep::default();
        for node in self.nodes.iter_mut() {
            let outcome = node.element_mut().post_run_cleanup();
            sweep.record(SweepPhase::PostRunCleanup, node, outcome);
        }
        sweep
    }

    fn repartition_wfr(&mut self, size: Gid) -> usize {
        if self.wfr_size != size {
            self.wfr_nodes = self
                .nodes
                .iter()
                .filter(|n| n.element().uses_wfr() && !n.is_frozen())
                .map(Node::local_id)
                .collect();
            self.wfr_size = size;
        }
        self.wfr_nodes.len()
    }
}

/// Run `init` once, then `prepare`. A new run resets finished instances to `Initialized`.
fn prepare_one(node: &mut Node, rng: &mut dyn RandomSource) -> Result<(), crate::ElementFault> {
    if node.state() == NodeState::Created {
        node.element_mut().init()?;
        node.set_state(NodeState::Initialized);
    }
    let mut ctx = PrepareContext::new(node.gid(), node.vp(), rng);
    node.element_mut().prepare(&mut ctx)?;
    node.set_state(NodeState::Initialized);
    Ok(())
}

fn fresh_threads(
    config: &GridConfig,
    assignment: &VpAssignment,
    rngs: &RngFactory,
) -> Vec<ThreadState> {
    (0..config.threads_per_process)
        .map(|t| {
            let vp = assignment.to_index(Vp::new(config.rank, ThreadIndex(t)));
            ThreadState {
                nodes: SparseNodeArray::new(),
                rng: rngs.for_vp(vp),
                wfr_nodes: Vec::new(),
                wfr_size: Gid::RESERVED,
            }
        })
        .collect()
}

/// Owns every element instance hosted by this process.
///
/// Each worker thread has its own [`SparseNodeArray`]. Creation places
/// elements with [`VpAssignment`] using the GID as ordinal, so every process
/// agrees on where any GID lives without communicating. Lifecycle sweeps run
/// one partition per thread through the [`Dispatch`] implementation `D`.
///
/// Creation is single-threaded; call it from the orchestrating thread only.
pub struct ElementRegistry<D: Dispatch = SyncDispatch> {
    config: GridConfig,
    assignment: VpAssignment,
    models: ModelRegistry,
    dispatch: D,
    rngs: RngFactory,
    threads: Vec<ThreadState>,
    /// Every batch created so far, ascending.
    batches: Vec<GidRange>,
    next_gid: Gid,
    local_ids_stale: bool,
    wfr_used: bool,
    num_active: usize,
}

impl ElementRegistry<SyncDispatch> {
    /// Registry that runs sweeps inline on the calling thread.
    pub fn new(config: GridConfig, models: ModelRegistry) -> Result<Self, RegistryError> {
        Self::with_dispatch(config, models, SyncDispatch)
    }
}

impl<D: Dispatch> ElementRegistry<D> {
    pub fn with_dispatch(
        config: GridConfig,
        models: ModelRegistry,
        dispatch: D,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        let assignment = VpAssignment::from_config(&config);
        let rngs = RngFactory::new(config.rng_seed);
        let threads = fresh_threads(&config, &assignment, &rngs);

        info!(
            rank = %config.rank,
            processes = config.num_processes,
            threads = config.threads_per_process,
            models = models.len(),
            parallelism = dispatch.parallelism(),
            "Element registry initialized"
        );

        Ok(Self {
            config,
            assignment,
            models,
            dispatch,
            rngs,
            threads,
            batches: Vec::new(),
            next_gid: Gid::FIRST,
            local_ids_stale: false,
            wfr_used: false,
            num_active: 0,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn assignment(&self) -> &VpAssignment {
        &self.assignment
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn rank(&self) -> Rank {
        self.config.rank
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Number of elements created, which is also the highest GID assigned.
    pub fn size(&self) -> u64 {
        self.next_gid.0 - 1
    }

    fn highest_gid(&self) -> Gid {
        Gid(self.size())
    }

    /// Element instances hosted by this process, replicas included.
    pub fn num_local_nodes(&self) -> usize {
        self.threads.iter().map(|s| s.nodes.len()).sum()
    }

    /// Non-frozen instances prepared successfully by the last `prepare_nodes`.
    pub fn num_active_nodes(&self) -> usize {
        self.num_active
    }

    fn check_thread(&self, thread: ThreadIndex) -> Result<(), RegistryError> {
        if thread.0 < self.threads.len() {
            Ok(())
        } else {
            Err(RegistryError::InvalidThread {
                thread,
                threads: self.threads.len(),
            })
        }
    }

    fn batch_of(&self, gid: Gid) -> Result<&GidRange, RegistryError> {
        if !gid.is_assignable() || gid >= self.next_gid {
            return Err(RegistryError::UnknownElement(gid));
        }
        let idx = self.batches.partition_point(|b| b.last < gid);
        self.batches
            .get(idx)
            .ok_or(RegistryError::UnknownElement(gid))
    }

    pub fn model_of(&self, gid: Gid) -> Result<ModelId, RegistryError> {
        self.batch_of(gid).map(|b| b.model)
    }

    pub fn category_of(&self, gid: Gid) -> Result<Category, RegistryError> {
        let model = self.model_of(gid)?;
        Ok(self.models.get(model)?.category())
    }

    /// Whether some thread of this process hosts an instance of `gid`.
    pub fn is_local_gid(&self, gid: Gid) -> bool {
        match self.category_of(gid) {
            Ok(category) => {
                self.assignment.threads_hosting(gid.0, category, self.config.rank)
                    != ThreadHosting::None
            }
            Err(_) => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════════════════

    /// Create `count` elements of the model registered as `model`.
    pub fn create(&mut self, model: &str, count: u64) -> Result<GidCollection, RegistryError> {
        let id = self.models.lookup(model)?;
        self.create_by_id(id, count)
    }

    /// Create `count` elements of model `model`.
    ///
    /// All arguments are checked before any slot is touched, so a failed call
    /// leaves the registry unchanged.
    pub fn create_by_id(
        &mut self,
        model: ModelId,
        count: u64,
    ) -> Result<GidCollection, RegistryError> {
        let entry = self.models.get(model)?.clone();
        if count == 0 || self.next_gid.0.checked_add(count).is_none() {
            return Err(RegistryError::InvalidCount(count));
        }

        let range = GidRange::with_count(self.next_gid, count, model);
        let category = entry.category();
        let rank = self.config.rank;

        for gid in range.iter() {
            match self.assignment.threads_hosting(gid.0, category, rank) {
                ThreadHosting::None => {}
                ThreadHosting::One(thread) => {
                    let node = Node::new(
                        gid,
                        model,
                        category,
                        Vp::new(rank, thread),
                        entry.instantiate(),
                    );
                    self.threads[thread.0].nodes.append(node);
                }
                ThreadHosting::All => {
                    for (t, state) in self.threads.iter_mut().enumerate() {
                        let node = Node::new(
                            gid,
                            model,
                            category,
                            Vp::new(rank, ThreadIndex(t)),
                            entry.instantiate(),
                        );
                        state.nodes.append(node);
                    }
                }
            }
        }

        self.batches.push(range);
        self.next_gid = range.last.next();
        self.local_ids_stale = true;

        debug!(
            model = entry.name(),
            category = %category,
            first = %range.first,
            last = %range.last,
            "Created elements"
        );
        gridkernel_metrics::record_nodes_created(entry.name(), count);
        gridkernel_metrics::set_local_nodes(self.num_local_nodes());

        Ok(range.into())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════════

    /// Look up `gid`.
    ///
    /// With `thread`, returns that thread's instance or a proxy when the thread
    /// does not host one. Without, returns the authoritative instance: the
    /// single instance of a Normal or External element, or for a Device element
    /// the replica on the VP its GID maps to. A proxy is returned when that
    /// instance lives on another process.
    pub fn get(&self, gid: Gid, thread: Option<ThreadIndex>) -> Result<Slot<'_>, RegistryError> {
        let model = self.model_of(gid)?;
        let category = self.models.get(model)?.category();
        let home = self.assignment.authoritative_vp(gid.0, category);
        let proxy = Slot::Proxy(Proxy { gid, model, home });

        let thread = match thread {
            Some(thread) => {
                self.check_thread(thread)?;
                thread
            }
            None if home.rank == self.config.rank => home.thread,
            None => return Ok(proxy),
        };

        Ok(self.threads[thread.0]
            .nodes
            .get_by_gid(gid)
            .map_or(proxy, Slot::Local))
    }

    /// Mutable access to the instance of `gid` hosted by `thread`.
    pub fn get_local_mut(
        &mut self,
        gid: Gid,
        thread: ThreadIndex,
    ) -> Result<&mut Node, RegistryError> {
        self.model_of(gid)?;
        self.check_thread(thread)?;
        self.threads[thread.0]
            .nodes
            .get_by_gid_mut(gid)
            .ok_or(RegistryError::NotLocal { gid, thread })
    }

    /// This process's replicas of a Device element, ordered by thread.
    pub fn get_siblings(&self, gid: Gid) -> Result<Vec<&Node>, RegistryError> {
        if self.category_of(gid)? != Category::Device {
            return Err(RegistryError::NotReplicated(gid));
        }
        Ok(self
            .threads
            .iter()
            .filter_map(|s| s.nodes.get_by_gid(gid))
            .collect())
    }

    /// Every instance hosted by `thread`, in local-id order.
    pub fn local_nodes(&self, thread: ThreadIndex) -> Result<&[Node], RegistryError> {
        self.check_thread(thread)?;
        Ok(self.threads[thread.0].nodes.as_slice())
    }

    /// Instance `local_id` of `thread`. Requires up-to-date thread-local ids.
    pub fn thread_lid_to_node(
        &self,
        thread: ThreadIndex,
        local_id: LocalId,
    ) -> Result<&Node, RegistryError> {
        if self.local_ids_stale {
            return Err(RegistryError::StaleThreadLocalIds);
        }
        self.check_thread(thread)?;
        self.threads[thread.0].nodes.get(local_id)
    }

    /// Population size as known to `thread`.
    pub fn max_gid(&self, thread: ThreadIndex) -> Result<Gid, RegistryError> {
        self.check_thread(thread)?;
        Ok(self.threads[thread.0].nodes.max_gid())
    }

    /// Bring every thread's view of the population up to date.
    ///
    /// Afterwards all threads report the same `max_gid`, equal to [`size`](Self::size),
    /// and local-id lookups are trusted until the next creation.
    pub fn ensure_valid_thread_local_ids(&mut self) {
        let size = self.highest_gid();
        for state in &mut self.threads {
            state.nodes.set_max_gid(size);
        }
        self.local_ids_stale = false;
        if self.wfr_used {
            self.repartition_wfr_if_stale();
        }
    }

    pub fn local_ids_are_stale(&self) -> bool {
        self.local_ids_stale
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════════

    /// Status of `gid` as seen through [`get`](Self::get).
    pub fn get_status(
        &self,
        gid: Gid,
        thread: Option<ThreadIndex>,
    ) -> Result<PropertyMap, RegistryError> {
        let slot = self.get(gid, thread)?;
        let mut status = PropertyMap::new();

        let (model, vp, local, frozen) = match slot {
            Slot::Local(node) => {
                node.element().get_status(&mut status);
                (node.model(), node.vp(), true, node.is_frozen())
            }
            Slot::Proxy(proxy) => (proxy.model, proxy.home, false, false),
        };

        let name = self.models.get(model)?.name().to_string();
        let vp_index = self.assignment.to_index(vp);
        status.insert(GLOBAL_ID.to_string(), PropertyValue::Int(gid.0 as i64));
        status.insert(MODEL.to_string(), PropertyValue::Str(name));
        status.insert(VP.to_string(), PropertyValue::Int(vp_index.0 as i64));
        status.insert(THREAD.to_string(), PropertyValue::Int(vp.thread.0 as i64));
        status.insert(LOCAL.to_string(), PropertyValue::Bool(local));
        status.insert(FROZEN.to_string(), PropertyValue::Bool(frozen));
        Ok(status)
    }

    /// Apply `props` to every instance of `gid` hosted by this process.
    ///
    /// Each instance is updated on a copy first. Nothing is committed unless
    /// every copy accepted every key, so a failed call changes no replica.
    /// Instances living on other processes are left to those processes.
    pub fn set_status(&mut self, gid: Gid, props: &PropertyMap) -> Result<(), RegistryError> {
        self.model_of(gid)?;

        if let Some(key) = READ_ONLY_KEYS.iter().find(|k| props.contains_key(**k)) {
            return Err(PropertyError::BadProperty(format!("'{key}' is read-only")).into());
        }
        let frozen = PropertyAccess::new(props).bool(FROZEN)?;

        let mut staged: Vec<(usize, Box<dyn Element>)> = Vec::new();
        for (t, state) in self.threads.iter().enumerate() {
            let Some(node) = state.nodes.get_by_gid(gid) else {
                continue;
            };
            check_mutability(node, props)?;

            let mut candidate = node.element().clone_box();
            let mut access = PropertyAccess::new(props);
            access.mark_consumed(FROZEN);
            candidate.set_status(&mut access)?;
            access.finish()?;
            staged.push((t, candidate));
        }

        if staged.is_empty() {
            debug!(gid = %gid, "No local instance to update");
            return Ok(());
        }

        for (t, element) in staged {
            if let Some(node) = self.threads[t].nodes.get_by_gid_mut(gid) {
                node.replace_element(element);
                if let Some(frozen) = frozen {
                    node.set_frozen(frozen);
                }
            }
        }
        if frozen.is_some() {
            for state in &mut self.threads {
                state.wfr_size = Gid::RESERVED;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle sweeps
    // ═══════════════════════════════════════════════════════════════════════

    /// Initialize and prepare every hosted instance.
    ///
    /// Threads sweep concurrently. A faulting instance does not stop its
    /// siblings; all faults are combined into one
    /// [`RegistryError::LifecycleFaults`] once every thread has finished.
    /// Returns the number of active (non-frozen) instances.
    #[instrument(level = "debug", skip_all)]
    pub fn prepare_nodes(&mut self) -> Result<usize, RegistryError> {
        let start = Instant::now();
        let results = self
            .dispatch
            .map_partitions_mut(&mut self.threads, |_, state| state.prepare());
        let report = SweepReport::reduce(SweepPhase::Prepare, results);
        self.num_active = report.active();
        finish_sweep(&report, start);

        match report.into_faults() {
            Some(faults) => Err(RegistryError::LifecycleFaults(faults)),
            None => Ok(self.num_active),
        }
    }

    /// Reset every local replica of `gid` to its model defaults.
    ///
    /// Every replica is reset even if another one faults; the faults are
    /// returned together. A GID hosted only by other processes is a no-op.
    pub fn init_state(&mut self, gid: Gid) -> Result<(), RegistryError> {
        self.model_of(gid)?;
        let mut sweep = ThreadSweep::default();
        for state in &mut self.threads {
            if let Some(node) = state.nodes.get_by_gid_mut(gid) {
                let outcome = node.element_mut().init_state();
                sweep.record(SweepPhase::InitState, node, outcome);
            }
        }
        if sweep.processed == 0 {
            debug!(gid = %gid, "No local instance to reset");
        }

        match SweepReport::reduce(SweepPhase::InitState, vec![sweep]).into_faults() {
            Some(faults) => Err(RegistryError::LifecycleFaults(faults)),
            None => Ok(()),
        }
    }

    /// Reset every hosted instance to its model defaults.
    ///
    /// Faults are combined as in [`prepare_nodes`](Self::prepare_nodes).
    /// Returns the number of instances reset.
    #[instrument(level = "debug", skip_all)]
    pub fn reinit_nodes(&mut self) -> Result<usize, RegistryError> {
        let start = Instant::now();
        let results = self
            .dispatch
            .map_partitions_mut(&mut self.threads, |_, state| state.init_state());
        let report = SweepReport::reduce(SweepPhase::InitState, results);
        finish_sweep(&report, start);

        let reset = report.succeeded();
        match report.into_faults() {
            Some(faults) => Err(RegistryError::LifecycleFaults(faults)),
            None => Ok(reset),
        }
    }

    /// Run every instance's `finalize` hook. Faults are logged and returned, never raised.
    #[instrument(level = "debug", skip_all)]
    pub fn finalize_nodes(&mut self) -> SweepReport {
        let start = Instant::now();
        let results = self
            .dispatch
            .map_partitions_mut(&mut self.threads, |_, state| state.finalize());
        let report = SweepReport::reduce(SweepPhase::Finalize, results);
        finish_sweep(&report, start);
        report_teardown(&report);
        report
    }

    /// Run every instance's `post_run_cleanup` hook. Faults are logged and returned, never raised.
    #[instrument(level = "debug", skip_all)]
    pub fn post_run_cleanup(&mut self) -> SweepReport {
        let start = Instant::now();
        let results = self
            .dispatch
            .map_partitions_mut(&mut self.threads, |_, state| state.post_run_cleanup());
        let report = SweepReport::reduce(SweepPhase::PostRunCleanup, results);
        finish_sweep(&report, start);
        report_teardown(&report);
        report
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Waveform relaxation
    // ═══════════════════════════════════════════════════════════════════════

    /// Whether any instance on this process needs waveform relaxation.
    pub fn check_wfr_use(&mut self) -> bool {
        let flags = self.dispatch.map_partitions(&self.threads, |_, state| {
            state.nodes.iter().any(|n| n.element().uses_wfr())
        });
        self.wfr_used = flags.into_iter().any(|used| used);
        self.wfr_used
    }

    /// [`check_wfr_use`](Self::check_wfr_use) agreed across every process.
    ///
    /// Collective: every rank must call it.
    pub fn check_wfr_use_global<C>(&mut self, collective: &C) -> Result<bool, RegistryError>
    where
        C: Collective + ?Sized,
    {
        let local = self.check_wfr_use();
        self.wfr_used = collective.any_true(local)?;
        Ok(self.wfr_used)
    }

    pub fn wfr_is_used(&self) -> bool {
        self.wfr_used
    }

    /// Local ids of `thread`'s instances needing waveform relaxation.
    ///
    /// The partition is recomputed only when the population has grown or a
    /// frozen flag changed since it was last built.
    pub fn get_wfr_nodes(&mut self, thread: ThreadIndex) -> Result<&[LocalId], RegistryError> {
        self.check_thread(thread)?;
        self.repartition_wfr_if_stale();
        Ok(&self.threads[thread.0].wfr_nodes)
    }

    fn repartition_wfr_if_stale(&mut self) {
        let size = self.highest_gid();
        if self.threads.iter().all(|s| s.wfr_size == size) {
            return;
        }
        let counts = self
            .dispatch
            .map_partitions_mut(&mut self.threads, |_, state| state.repartition_wfr(size));
        let total: usize = counts.iter().sum();
        debug!(size = %size, nodes = total, "Repartitioned WFR nodes");
        gridkernel_metrics::record_wfr_repartition(total);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Teardown
    // ═══════════════════════════════════════════════════════════════════════

    /// Release every instance and restart GID allocation at [`Gid::FIRST`].
    pub fn reset(&mut self) {
        self.threads = fresh_threads(&self.config, &self.assignment, &self.rngs);
        self.batches.clear();
        self.next_gid = Gid::FIRST;
        self.local_ids_stale = false;
        self.wfr_used = false;
        self.num_active = 0;
        gridkernel_metrics::set_local_nodes(0);
        info!(rank = %self.config.rank, "Element registry reset");
    }
}

fn check_mutability(node: &Node, props: &PropertyMap) -> Result<(), RegistryError> {
    if node.state().allows_structural_writes() {
        return Ok(());
    }
    for key in props.keys().filter(|k| k.as_str() != FROZEN) {
        if node.element().mutability(key) == Mutability::Structural {
            return Err(RegistryError::IllegalPropertyWrite {
                gid: node.gid(),
                key: key.clone(),
                state: node.state(),
            });
        }
    }
    Ok(())
}

fn finish_sweep(report: &SweepReport, start: Instant) {
    let phase = report.phase().as_str();
    let faults = report.faults().len();
    gridkernel_metrics::record_sweep(phase, report.processed(), start.elapsed().as_secs_f64());
    if faults > 0 {
        gridkernel_metrics::record_sweep_faults(phase, faults);
    }
    debug!(
        phase,
        processed = report.processed(),
        faults,
        "Sweep completed"
    );
}

fn report_teardown(report: &SweepReport) {
    if !report.is_clean() {
        error!(
            phase = %report.phase(),
            gids = ?report.faults().gids(),
            "Teardown hooks faulted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{properties, ElementFault};
    use tracing_test::traced_test;

    /// Element with one structural and one dynamic property.
    #[derive(Clone, Default)]
    struct Probe {
        capacity: i64,
        level: f64,
        wfr: bool,
        fail_init: bool,
        fail_reset: bool,
    }

    impl Element for Probe {
        fn get_status(&self, status: &mut PropertyMap) {
            status.insert("capacity".into(), PropertyValue::Int(self.capacity));
            status.insert("level".into(), PropertyValue::Double(self.level));
        }

        fn set_status(&mut self, props: &mut PropertyAccess<'_>) -> Result<(), PropertyError> {
            if let Some(capacity) = props.int("capacity")? {
                if capacity < 0 {
                    return Err(PropertyError::BadProperty(
                        "capacity must be non-negative".into(),
                    ));
                }
                self.capacity = capacity;
            }
            if let Some(level) = props.double("level")? {
                self.level = level;
            }
            Ok(())
        }

        fn mutability(&self, key: &str) -> Mutability {
            if key == "capacity" {
                Mutability::Structural
            } else {
                Mutability::Dynamic
            }
        }

        fn init(&mut self) -> Result<(), ElementFault> {
            if self.fail_init {
                Err(ElementFault::new("init refused"))
            } else {
                Ok(())
            }
        }

        fn init_state(&mut self) -> Result<(), ElementFault> {
            if self.fail_reset {
                return Err(ElementFault::new("reset refused"));
            }
            self.level = 0.0;
            Ok(())
        }

        fn uses_wfr(&self) -> bool {
            self.wfr
        }
    }

    fn models() -> ModelRegistry {
        let mut models = ModelRegistry::new();
        models
            .register_prototype("probe", Category::Normal, Probe::default())
            .unwrap();
        models
            .register_prototype("probe_device", Category::Device, Probe::default())
            .unwrap();
        models
            .register_prototype("probe_external", Category::External, Probe::default())
            .unwrap();
        models
            .register_prototype(
                "probe_wfr",
                Category::Normal,
                Probe {
                    wfr: true,
                    ..Probe::default()
                },
            )
            .unwrap();
        models
            .register_prototype(
                "probe_broken",
                Category::Normal,
                Probe {
                    fail_init: true,
                    ..Probe::default()
                },
            )
            .unwrap();
        models
            .register_prototype(
                "unresettable",
                Category::Device,
                Probe {
                    fail_reset: true,
                    ..Probe::default()
                },
            )
            .unwrap();
        models
    }

    fn registry(processes: usize, threads: usize, rank: usize) -> ElementRegistry {
        let config = GridConfig::builder()
            .num_processes(processes)
            .threads_per_process(threads)
            .rank(Rank(rank))
            .build()
            .unwrap();
        ElementRegistry::new(config, models()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = GridConfig::builder().num_processes(0).build_unchecked();
        assert!(matches!(
            ElementRegistry::new(config, models()),
            Err(RegistryError::Config(_))
        ));
    }

    #[test]
    fn test_create_returns_contiguous_range() {
        let mut registry = registry(1, 2, 0);
        let first = registry.create("probe", 5).unwrap();
        let second = registry.create("probe_device", 3).unwrap();

        assert_eq!(first.first(), Some(Gid(1)));
        assert_eq!(first.last(), Some(Gid(5)));
        assert_eq!(second.first(), Some(Gid(6)));
        assert_eq!(registry.size(), 8);
        assert_eq!(registry.num_local_nodes(), 5 + 3 * 2);
    }

    #[test]
    fn test_failed_create_changes_nothing() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 4).unwrap();

        assert_eq!(
            registry.create("no_such_model", 3).unwrap_err(),
            RegistryError::UnknownModel("no_such_model".to_string())
        );
        assert_eq!(
            registry.create("probe", 0).unwrap_err(),
            RegistryError::InvalidCount(0)
        );
        assert_eq!(
            registry.create_by_id(ModelId(99), 1).unwrap_err(),
            RegistryError::UnknownModelId(ModelId(99))
        );
        assert_eq!(registry.size(), 4);
        assert_eq!(registry.num_local_nodes(), 4);
    }

    #[test]
    fn test_normal_elements_alternate_ranks_first() {
        // Two processes, two threads: GID g lives on VP g mod 4, and VP v is
        // (rank v mod 2, thread v / 2).
        let mut registry = registry(2, 2, 1);
        registry.create("probe", 8).unwrap();

        let hosted: Vec<(u64, usize)> = (0..2)
            .flat_map(|t| {
                registry
                    .local_nodes(ThreadIndex(t))
                    .unwrap()
                    .iter()
                    .map(move |n| (n.gid().0, t))
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(hosted, vec![(1, 0), (5, 0), (3, 1), (7, 1)]);
        assert!(registry.is_local_gid(Gid(3)));
        assert!(!registry.is_local_gid(Gid(4)));
        assert!(!registry.is_local_gid(Gid(99)));
    }

    #[test]
    fn test_get_with_and_without_thread() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 4).unwrap();

        // GID 2 lives on thread 0 (VP 2 mod 2 = 0).
        let slot = registry.get(Gid(2), None).unwrap();
        assert_eq!(slot.node().unwrap().vp().thread, ThreadIndex(0));

        let slot = registry.get(Gid(2), Some(ThreadIndex(1))).unwrap();
        assert!(!slot.is_local());
        assert_eq!(slot.gid(), Gid(2));

        assert_eq!(
            registry.get(Gid(5), None).unwrap_err(),
            RegistryError::UnknownElement(Gid(5))
        );
        assert_eq!(
            registry.get(Gid::RESERVED, None).unwrap_err(),
            RegistryError::UnknownElement(Gid::RESERVED)
        );
        assert!(matches!(
            registry.get(Gid(1), Some(ThreadIndex(2))),
            Err(RegistryError::InvalidThread { .. })
        ));
    }

    #[test]
    fn test_foreign_normal_element_is_a_proxy() {
        let mut registry = registry(2, 1, 0);
        registry.create("probe", 2).unwrap();

        match registry.get(Gid(1), None).unwrap() {
            Slot::Proxy(proxy) => assert_eq!(proxy.home.rank, Rank(1)),
            Slot::Local(_) => panic!("GID 1 belongs to rank 1"),
        }
        assert!(registry.get(Gid(2), None).unwrap().is_local());
    }

    #[test]
    fn test_external_elements_live_on_origin() {
        let mut rank0 = registry(2, 2, 0);
        let mut rank1 = registry(2, 2, 1);
        rank0.create("probe_external", 3).unwrap();
        rank1.create("probe_external", 3).unwrap();

        assert_eq!(rank0.local_nodes(ThreadIndex(0)).unwrap().len(), 3);
        assert!(rank0.local_nodes(ThreadIndex(1)).unwrap().is_empty());
        assert_eq!(rank1.num_local_nodes(), 0);
    }

    #[test]
    fn test_siblings() {
        let mut registry = registry(1, 3, 0);
        registry.create("probe", 2).unwrap();
        let devices = registry.create("probe_device", 1).unwrap();
        let gid = devices.first().unwrap();

        let siblings = registry.get_siblings(gid).unwrap();
        let threads: Vec<_> = siblings.iter().map(|n| n.vp().thread.0).collect();
        assert_eq!(threads, vec![0, 1, 2]);

        assert_eq!(
            registry.get_siblings(Gid(1)).unwrap_err(),
            RegistryError::NotReplicated(Gid(1))
        );
    }

    #[test]
    fn test_thread_local_ids_go_stale_on_create() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 4).unwrap();
        assert_eq!(
            registry.thread_lid_to_node(ThreadIndex(0), LocalId(0)).unwrap_err(),
            RegistryError::StaleThreadLocalIds
        );

        registry.ensure_valid_thread_local_ids();
        assert_eq!(
            registry.thread_lid_to_node(ThreadIndex(1), LocalId(1)).unwrap().gid(),
            Gid(3)
        );
        assert!(matches!(
            registry.thread_lid_to_node(ThreadIndex(1), LocalId(2)),
            Err(RegistryError::OutOfRange { .. })
        ));

        registry.create("probe", 1).unwrap();
        assert!(registry.local_ids_are_stale());
    }

    #[test]
    fn test_status_reports_registry_keys() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 3).unwrap();

        let status = registry.get_status(Gid(3), None).unwrap();
        assert_eq!(status[GLOBAL_ID], PropertyValue::Int(3));
        assert_eq!(status[MODEL], PropertyValue::Str("probe".into()));
        assert_eq!(status[VP], PropertyValue::Int(1));
        assert_eq!(status[THREAD], PropertyValue::Int(1));
        assert_eq!(status[LOCAL], PropertyValue::Bool(true));
        assert_eq!(status[FROZEN], PropertyValue::Bool(false));
        assert_eq!(status["level"], PropertyValue::Double(0.0));

        let status = registry.get_status(Gid(3), Some(ThreadIndex(0))).unwrap();
        assert_eq!(status[LOCAL], PropertyValue::Bool(false));
        assert!(!status.contains_key("level"));
    }

    #[test]
    fn test_set_status_commits_valid_changes() {
        let mut registry = registry(1, 1, 0);
        registry.create("probe", 1).unwrap();

        registry
            .set_status(Gid(1), &properties([("capacity", 4i64)]))
            .unwrap();
        registry
            .set_status(Gid(1), &properties([("level", 0.5)]))
            .unwrap();

        let status = registry.get_status(Gid(1), None).unwrap();
        assert_eq!(status["capacity"], PropertyValue::Int(4));
        assert_eq!(status["level"], PropertyValue::Double(0.5));
    }

    #[test]
    fn test_set_status_is_all_or_nothing() {
        let mut registry = registry(1, 1, 0);
        registry.create("probe", 1).unwrap();

        let mut props = properties([("level", PropertyValue::Double(2.0))]);
        props.insert("capacity".into(), PropertyValue::Int(-1));
        assert!(matches!(
            registry.set_status(Gid(1), &props),
            Err(RegistryError::Property(PropertyError::BadProperty(_)))
        ));

        let props = properties([("level", 3.0), ("levle", 4.0)]);
        assert_eq!(
            registry.set_status(Gid(1), &props).unwrap_err(),
            RegistryError::Property(PropertyError::UnknownProperty(vec!["levle".into()]))
        );

        let status = registry.get_status(Gid(1), None).unwrap();
        assert_eq!(status["level"], PropertyValue::Double(0.0));
        assert_eq!(status["capacity"], PropertyValue::Int(0));
    }

    #[test]
    fn test_init_state_resets_every_local_replica() {
        let mut registry = registry(1, 3, 0);
        registry.create("probe", 2).unwrap();
        let gid = registry.create("probe_device", 1).unwrap().first().unwrap();
        registry
            .set_status(gid, &properties([("level", 0.75)]))
            .unwrap();

        registry.init_state(gid).unwrap();
        for replica in registry.get_siblings(gid).unwrap() {
            let mut status = PropertyMap::new();
            replica.element().get_status(&mut status);
            assert_eq!(status["level"], PropertyValue::Double(0.0));
        }

        assert_eq!(
            registry.init_state(Gid(99)).unwrap_err(),
            RegistryError::UnknownElement(Gid(99))
        );
    }

    #[test]
    fn test_init_state_of_foreign_gid_is_a_noop() {
        let mut registry = registry(2, 1, 0);
        registry.create("probe", 2).unwrap();
        assert!(!registry.is_local_gid(Gid(1)));
        registry.init_state(Gid(1)).unwrap();
    }

    #[test]
    fn test_init_state_faults_name_every_replica() {
        let mut registry = registry(1, 2, 0);
        let gid = registry.create("unresettable", 1).unwrap().first().unwrap();

        let RegistryError::LifecycleFaults(faults) = registry.init_state(gid).unwrap_err() else {
            panic!("expected lifecycle faults");
        };
        assert_eq!(faults.phase(), SweepPhase::InitState);
        assert_eq!(faults.faults().len(), 2);
        assert_eq!(faults.gids(), vec![gid]);
    }

    #[traced_test]
    #[test]
    fn test_reinit_nodes_keeps_going_past_faults() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 4).unwrap();
        let stuck = registry.create("unresettable", 1).unwrap().first().unwrap();
        for g in 1..=4 {
            registry
                .set_status(Gid(g), &properties([("level", g as f64)]))
                .unwrap();
        }

        let RegistryError::LifecycleFaults(faults) = registry.reinit_nodes().unwrap_err() else {
            panic!("expected lifecycle faults");
        };
        assert_eq!(faults.phase(), SweepPhase::InitState);
        assert_eq!(faults.gids(), vec![stuck]);
        for g in 1..=4 {
            let status = registry.get_status(Gid(g), None).unwrap();
            assert_eq!(status["level"], PropertyValue::Double(0.0));
        }
        assert!(logs_contain("Element hook faulted"));
    }

    #[test]
    fn test_reinit_nodes_counts_replicas() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 3).unwrap();
        registry.create("probe_device", 1).unwrap();
        assert_eq!(registry.reinit_nodes().unwrap(), 3 + 2);
    }

    #[test]
    fn test_read_only_keys_rejected() {
        let mut registry = registry(1, 1, 0);
        registry.create("probe", 1).unwrap();
        assert!(matches!(
            registry.set_status(Gid(1), &properties([(GLOBAL_ID, 7i64)])),
            Err(RegistryError::Property(PropertyError::BadProperty(_)))
        ));
    }

    #[test]
    fn test_structural_write_after_activation_rejected_on_every_replica() {
        let mut registry = registry(1, 2, 0);
        let gid = registry.create("probe_device", 1).unwrap().first().unwrap();
        registry.prepare_nodes().unwrap();
        assert!(registry.get_local_mut(gid, ThreadIndex(1)).unwrap().activate());

        let err = registry
            .set_status(gid, &properties([("capacity", 9i64)]))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::IllegalPropertyWrite {
                gid,
                key: "capacity".into(),
                state: NodeState::Active,
            }
        );
        for sibling in registry.get_siblings(gid).unwrap() {
            let mut status = PropertyMap::new();
            sibling.element().get_status(&mut status);
            assert_eq!(status["capacity"], PropertyValue::Int(0));
        }

        // Dynamic properties stay writable.
        registry
            .set_status(gid, &properties([("level", 1.5)]))
            .unwrap();
        for sibling in registry.get_siblings(gid).unwrap() {
            let mut status = PropertyMap::new();
            sibling.element().get_status(&mut status);
            assert_eq!(status["level"], PropertyValue::Double(1.5));
        }
    }

    #[test]
    fn test_frozen_nodes_are_prepared_but_not_active() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 4).unwrap();
        registry
            .set_status(Gid(2), &properties([(FROZEN, true)]))
            .unwrap();

        assert_eq!(registry.prepare_nodes().unwrap(), 3);
        assert_eq!(registry.num_active_nodes(), 3);
        let node = registry.get(Gid(2), None).unwrap().node().unwrap();
        assert!(node.is_frozen());
        assert_eq!(node.state(), NodeState::Initialized);
    }

    #[test]
    fn test_prepare_faults_are_combined() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 2).unwrap();
        registry.create("probe_broken", 2).unwrap();
        registry.create("probe", 1).unwrap();

        let RegistryError::LifecycleFaults(faults) = registry.prepare_nodes().unwrap_err() else {
            panic!("expected lifecycle faults");
        };
        assert_eq!(faults.phase(), SweepPhase::Prepare);
        assert_eq!(faults.gids(), vec![Gid(3), Gid(4)]);
        assert_eq!(registry.num_active_nodes(), 3);

        for gid in [1, 2, 5] {
            let node = registry.get(Gid(gid), None).unwrap().node().unwrap();
            assert_eq!(node.state(), NodeState::Initialized);
        }
        let node = registry.get(Gid(3), None).unwrap().node().unwrap();
        assert_eq!(node.state(), NodeState::Created);
    }

    #[test]
    fn test_finalize_reports_without_raising() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 3).unwrap();
        registry.prepare_nodes().unwrap();

        let report = registry.finalize_nodes();
        assert!(report.is_clean());
        assert_eq!(report.processed(), 3);
        for node in registry.local_nodes(ThreadIndex(0)).unwrap() {
            assert_eq!(node.state(), NodeState::Finalized);
        }

        let report = registry.post_run_cleanup();
        assert_eq!(report.phase(), SweepPhase::PostRunCleanup);
        assert!(report.into_faults().is_none());
    }

    #[test]
    fn test_new_run_restarts_finalized_nodes() {
        let mut registry = registry(1, 1, 0);
        registry.create("probe", 2).unwrap();
        registry.prepare_nodes().unwrap();
        registry.finalize_nodes();
        assert_eq!(registry.prepare_nodes().unwrap(), 2);
        let node = registry.get(Gid(1), None).unwrap().node().unwrap();
        assert_eq!(node.state(), NodeState::Initialized);
    }

    #[test]
    fn test_wfr_detection() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 4).unwrap();
        assert!(!registry.check_wfr_use());
        registry.create("probe_wfr", 2).unwrap();
        assert!(registry.check_wfr_use());
        assert!(registry.wfr_is_used());
    }

    #[test]
    fn test_wfr_partition_follows_population() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe", 2).unwrap();
        registry.create("probe_wfr", 2).unwrap();

        // GIDs 3 and 4 land on threads 1 and 0 respectively.
        assert_eq!(registry.get_wfr_nodes(ThreadIndex(0)).unwrap(), &[LocalId(1)]);
        assert_eq!(registry.get_wfr_nodes(ThreadIndex(1)).unwrap(), &[LocalId(1)]);

        registry.create("probe_wfr", 2).unwrap();
        assert_eq!(
            registry.get_wfr_nodes(ThreadIndex(0)).unwrap(),
            &[LocalId(1), LocalId(2)]
        );

        registry
            .set_status(Gid(4), &properties([(FROZEN, true)]))
            .unwrap();
        assert_eq!(registry.get_wfr_nodes(ThreadIndex(0)).unwrap(), &[LocalId(2)]);
    }

    #[traced_test]
    #[test]
    fn test_wfr_repartition_only_when_stale() {
        let mut registry = registry(1, 1, 0);
        registry.create("probe_wfr", 3).unwrap();

        registry.get_wfr_nodes(ThreadIndex(0)).unwrap();
        registry.get_wfr_nodes(ThreadIndex(0)).unwrap();
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|l| l.contains("Repartitioned WFR nodes"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one repartition, saw {n}")),
            }
        });
    }

    #[traced_test]
    #[test]
    fn test_teardown_faults_logged() {
        #[derive(Clone)]
        struct Stubborn;

        impl Element for Stubborn {
            fn get_status(&self, _status: &mut PropertyMap) {}

            fn set_status(
                &mut self,
                _props: &mut PropertyAccess<'_>,
            ) -> Result<(), PropertyError> {
                Ok(())
            }

            fn finalize(&mut self) -> Result<(), ElementFault> {
                Err(ElementFault::new("file still open"))
            }
        }

        let mut models = ModelRegistry::new();
        models
            .register_prototype("stubborn", Category::Normal, Stubborn)
            .unwrap();
        let mut registry = ElementRegistry::new(GridConfig::single_process(2), models).unwrap();
        registry.create("stubborn", 3).unwrap();

        let report = registry.finalize_nodes();
        assert_eq!(report.faults().gids(), vec![Gid(1), Gid(2), Gid(3)]);
        assert_eq!(report.succeeded(), 0);
        assert!(logs_contain("Teardown hooks faulted"));
        assert!(logs_contain("file still open"));
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let mut registry = registry(1, 2, 0);
        registry.create("probe_wfr", 4).unwrap();
        registry.check_wfr_use();
        registry.reset();

        assert_eq!(registry.size(), 0);
        assert_eq!(registry.num_local_nodes(), 0);
        assert!(!registry.wfr_is_used());
        let again = registry.create("probe", 1).unwrap();
        assert_eq!(again.first(), Some(Gid::FIRST));
    }

    #[test]
    fn test_model_and_category_of_foreign_gids() {
        let mut registry = registry(2, 1, 0);
        registry.create("probe", 3).unwrap();
        registry.create("probe_device", 2).unwrap();

        assert_eq!(registry.category_of(Gid(1)).unwrap(), Category::Normal);
        assert_eq!(registry.category_of(Gid(5)).unwrap(), Category::Device);
        assert_eq!(registry.model_of(Gid(4)).unwrap(), ModelId(1));
        assert!(registry.category_of(Gid(6)).is_err());
    }
}
