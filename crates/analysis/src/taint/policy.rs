use dift_core::register::Gpr;

/// TrackPolicy decides whether a load should mint a new color, given the
/// general-purpose registers used to compute its address.
#[auto_impl::auto_impl(&, &mut, Box)]
pub trait TrackPolicy {
    fn should_track(&self, address_registers: &[Gpr]) -> bool;
}

/// Track every load.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrack;

impl TrackPolicy for AlwaysTrack {
    #[inline]
    fn should_track(&self, _address_registers: &[Gpr]) -> bool {
        true
    }
}

/// Do not track loads whose address is computed purely from stack-frame
/// registers, so that local-variable traffic does not churn the color pool.
/// Loads from absolute addresses (no address registers) are tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFramePolicy {
    untracked: Vec<Gpr>,
}

impl StackFramePolicy {
    pub fn new(untracked: impl IntoIterator<Item = Gpr>) -> Self {
        let mut untracked: Vec<Gpr> = untracked.into_iter().collect();
        untracked.sort();
        untracked.dedup();
        Self { untracked }
    }

    pub fn untracked(&self) -> &[Gpr] {
        &self.untracked
    }
}

impl Default for StackFramePolicy {
    fn default() -> Self {
        Self::new([Gpr::Rsp, Gpr::Rbp])
    }
}

impl TrackPolicy for StackFramePolicy {
    #[inline]
    fn should_track(&self, address_registers: &[Gpr]) -> bool {
        address_registers.is_empty()
            || !address_registers
                .iter()
                .all(|r| self.untracked.binary_search(r).is_ok())
    }
}

/// Both policies must agree to track.
impl<P1: TrackPolicy, P2: TrackPolicy> TrackPolicy for (P1, P2) {
    #[inline]
    fn should_track(&self, address_registers: &[Gpr]) -> bool {
        self.0.should_track(address_registers) && self.1.should_track(address_registers)
    }
}
