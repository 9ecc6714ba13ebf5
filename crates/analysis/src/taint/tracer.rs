use std::{
    cell::RefCell,
    collections::{hash_map::Entry, HashMap, HashSet},
    io::Write,
    rc::Rc,
};

use dift_core::{
    error::DiftError,
    register::NUM_GPR,
    trace::{InstructionEvent, InstructionSource},
};
use dift_utils::log::{debug, info, trace};

use crate::{
    config::TaintConfig,
    report::{ReportWriter, StateRecord, Summary},
};

use super::{
    classify::InstructionPlan,
    hook::AddressEvent,
    policy::{StackFramePolicy, TrackPolicy},
    propagator::Propagator,
};

type Pending = Rc<RefCell<Vec<(AddressEvent, u64)>>>;

/// Tracer replays executed instructions through a propagator and reports the
/// analysis state whenever an address is marked or unmarked.
pub struct Tracer<P: TrackPolicy = StackFramePolicy> {
    propagator: Propagator,
    policy: P,
    /// instruction address -> plan, None for irrelevant instructions
    plans: HashMap<u64, Option<Rc<InstructionPlan>>>,
    /// every effective address accessed so far
    accessed: HashSet<u64>,
    executed: u64,
    warmup: u64,
    pending: Pending,
}

impl Tracer<StackFramePolicy> {
    pub fn from_config(cfg: &TaintConfig) -> Result<Self, DiftError> {
        cfg.validate()?;
        Ok(Self::new(cfg.num_colors, cfg.track_policy()?, cfg.warmup))
    }
}

impl<P: TrackPolicy> Tracer<P> {
    /// Panics if `num_colors` is not within 1..=64.
    pub fn new(num_colors: usize, policy: P, warmup: u64) -> Self {
        let mut propagator = Propagator::new(NUM_GPR, num_colors);
        let pending: Pending = Rc::new(RefCell::new(Vec::new()));
        for event in [AddressEvent::Mark, AddressEvent::Unmark] {
            let pending = pending.clone();
            propagator.subscribe(event, move |address| {
                pending.borrow_mut().push((event, address))
            });
        }
        Self {
            propagator,
            policy,
            plans: HashMap::new(),
            accessed: HashSet::new(),
            executed: 0,
            warmup,
            pending,
        }
    }

    /// Register an additional address hook.
    pub fn subscribe(&mut self, event: AddressEvent, hook: impl FnMut(u64) + 'static) {
        self.propagator.subscribe(event, hook);
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    fn plan(&mut self, event: &InstructionEvent) -> Option<Rc<InstructionPlan>> {
        match self.plans.entry(event.facts.address) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let plan = InstructionPlan::classify(&event.facts, &self.policy).map(Rc::new);
                debug!(
                    ins = format_args!("{:#x}", event.facts.address),
                    mnemonic = %event.facts.mnemonic,
                    steps = plan.as_ref().map(|p| p.steps.len()).unwrap_or(0),
                    "classified instruction"
                );
                e.insert(plan).clone()
            }
        }
    }

    /// Process one executed instruction and return the state records caused
    /// by it, one per address event.
    pub fn step(&mut self, event: &InstructionEvent) -> Vec<StateRecord> {
        self.executed += 1;
        let Some(plan) = self.plan(event) else {
            return vec![];
        };

        if plan.reads_memory {
            self.accessed.extend(event.read_ea);
        }
        if plan.writes_memory {
            self.accessed.extend(event.write_ea);
        }
        plan.apply(&mut self.propagator, event.read_ea, event.write_ea);
        trace!(
            ins = format_args!("{:#x}", plan.address),
            "taint table\n{}",
            self.propagator.table()
        );

        let events = std::mem::take(&mut *self.pending.borrow_mut());
        if self.executed <= self.warmup {
            return vec![];
        }
        events
            .into_iter()
            .map(|(event, address)| {
                debug!(%event, address = format_args!("{:#x}", address), "address event");
                StateRecord {
                    executed: self.executed,
                    addr_mem: self.propagator.address_count(),
                    addr_any: self.accessed.len(),
                    ins_addr: plan.address,
                    exhaustion: self.propagator.exhaustion_count(),
                    img: plan.image.clone(),
                    rtn: plan.routine.clone(),
                }
            })
            .collect()
    }

    /// Replay a whole trace, writing every state record and the summary.
    pub fn run<S, W>(
        &mut self,
        source: &mut S,
        writer: &mut ReportWriter<W>,
    ) -> Result<Summary, DiftError>
    where
        S: InstructionSource + ?Sized,
        W: Write,
    {
        writer.header()?;
        while let Some(event) = source.next_event()? {
            for record in self.step(&event) {
                writer.record(&record)?;
            }
        }
        let summary = self.summary();
        writer.summary(&summary)?;
        info!(
            executed = self.executed,
            tracked = summary.tracked,
            accessed = summary.accessed,
            exhaustion = summary.exhaustion,
            "trace replayed"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            tracked: self.propagator.address_count(),
            accessed: self.accessed.len(),
            exhaustion: self.propagator.exhaustion_count(),
            addresses: self.propagator.addresses().collect(),
        }
    }
}
