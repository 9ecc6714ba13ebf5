use std::collections::BTreeSet;

use dift_utils::log::trace;

use super::{
    hook::{AddressEvent, AddressHooks},
    table::{ColorSet, TaintTable},
    Color, Row,
};

/// Propagator applies the data-flow rules of executed instructions to a
/// taint table over the general-purpose registers.
///
/// A color is minted whenever a tracked load writes registers and remembers
/// the address it was loaded from. When a register carrying that color is
/// later used to compute the address of another access, the color is
/// resolved: it is cleared everywhere and its origin address is marked.
/// A store to an address unmarks it.
///
/// Every rule leaves the scratch row empty.
#[derive(Debug)]
pub struct Propagator {
    table: TaintTable,
    scratch: Row,
    /// color -> address the color was loaded from
    origin: Vec<u64>,
    addresses: BTreeSet<u64>,
    hooks: AddressHooks,
}

impl Propagator {
    /// Create a propagator over `num_registers` register rows and a pool of
    /// `num_colors` colors.
    pub fn new(num_registers: usize, num_colors: usize) -> Self {
        Self {
            table: TaintTable::new(num_registers + 1, num_colors),
            scratch: num_registers,
            origin: vec![0; num_colors],
            addresses: BTreeSet::new(),
            hooks: AddressHooks::new(),
        }
    }

    pub fn subscribe(&mut self, event: AddressEvent, hook: impl FnMut(u64) + 'static) {
        self.hooks.subscribe(event, hook);
    }

    pub fn table(&self) -> &TaintTable {
        &self.table
    }

    pub fn is_tainted(&self, row: Row, color: Color) -> bool {
        self.table.is_tainted(row, color)
    }

    pub fn exhaustion_count(&self) -> usize {
        self.table.exhaustion_count()
    }

    /// Origin address of a live color.
    pub fn origin(&self, color: Color) -> u64 {
        self.origin[color]
    }

    /// Number of currently marked addresses.
    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }

    /// Marked addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.addresses.iter().copied()
    }

    /// Copy the marked addresses, in ascending order, into `buffer`.
    /// Returns how many were copied.
    pub fn copy_addresses(&self, buffer: &mut [u64]) -> usize {
        buffer
            .iter_mut()
            .zip(self.addresses.iter())
            .map(|(slot, &addr)| *slot = addr)
            .count()
    }

    /// Taint `row` with `color`, a provenance rooted at `origin`.
    pub fn seed(&mut self, row: Row, color: Color, origin: u64) {
        self.origin[color] = origin;
        self.table.taint(row, color);
    }

    /// Every written register now depends on the union of the read registers.
    pub fn reg_to_reg(&mut self, written: &[Row], read: &[Row]) {
        let scratch = self.scratch;
        self.table.diff(scratch, scratch, scratch);
        for &r in read {
            self.table.union(scratch, scratch, r);
        }
        for &w in written {
            self.table.diff(w, w, w);
            self.table.union(w, scratch, scratch);
        }
        self.table.diff(scratch, scratch, scratch);
        trace!(?written, ?read, "reg to reg");
    }

    /// A load at `ea` into `written`, whose address was computed from
    /// `addr_regs`. With `should_track` the loaded value gets a fresh color
    /// rooted at `ea`; otherwise the written registers become clean.
    /// A tracked load allocates a color even when it writes no register
    /// (`cmp [rbx], 0`), so it can force an eviction.
    pub fn mem_to_reg(
        &mut self,
        written: &[Row],
        addr_regs: &[Row],
        ea: u64,
        should_track: bool,
    ) {
        self.resolve(addr_regs);
        for &w in written {
            self.table.diff(w, w, w);
        }
        if should_track {
            let color = self.table.next_available_taint();
            self.origin[color] = ea;
            for &w in written {
                self.table.taint(w, color);
            }
            trace!(?written, ?addr_regs, ea, color, "mem to reg");
        } else {
            trace!(?written, ?addr_regs, ea, "mem to reg, untracked");
        }
    }

    /// A store of `read` to `ea`, whose address was computed from
    /// `addr_regs`. The stored registers' taint is not transferred to
    /// memory; the store only ends tracking at `ea`.
    pub fn reg_to_mem(&mut self, addr_regs: &[Row], read: &[Row], ea: u64) {
        self.resolve(addr_regs);
        self.unmark(ea);
        trace!(?addr_regs, ?read, ea, "reg to mem");
    }

    /// Clear a register unconditionally (e.g. `xor rax, rax`).
    pub fn clear(&mut self, row: Row) {
        self.table.diff(row, row, row);
        trace!(row, "clear");
    }

    /// Swap the taint of two registers.
    pub fn exchange(&mut self, r1: Row, r2: Row) {
        let scratch = self.scratch;
        self.table.union(scratch, scratch, r1);
        self.table.diff(r1, r1, r1);
        self.table.union(r1, r1, r2);
        self.table.diff(r2, r2, r2);
        self.table.union(r2, scratch, scratch);
        self.table.diff(scratch, scratch, scratch);
        trace!(r1, r2, "exchange");
    }

    /// Resolve every color carried by the address-computation registers:
    /// the color is retired and the address it came from is marked.
    fn resolve(&mut self, addr_regs: &[Row]) {
        let colors = addr_regs
            .iter()
            .fold(ColorSet::EMPTY, |set, &r| set | self.table.row(r));
        for color in colors.iter() {
            self.table.untaint_col(color);
            self.mark(self.origin[color]);
        }
    }

    fn mark(&mut self, address: u64) {
        self.addresses.insert(address);
        self.hooks.notify(AddressEvent::Mark, address);
    }

    fn unmark(&mut self, address: u64) {
        self.addresses.remove(&address);
        self.hooks.notify(AddressEvent::Unmark, address);
    }
}
