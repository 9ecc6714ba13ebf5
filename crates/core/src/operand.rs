use serde::{Deserialize, Serialize};

use crate::register::{Gpr, Register};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    Immediate,
    Register,
    /// A memory reference; `base`/`index` compute the effective address.
    Memory,
    /// An address computation without a memory access (e.g. `lea`).
    Address,
}

/// One decoded operand of an instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub kind: OperandKind,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub written: bool,
    /// Register of a `Register` operand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg: Option<Register>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Register>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Register>,
}

impl Operand {
    pub fn immediate() -> Self {
        Self {
            kind: OperandKind::Immediate,
            read: true,
            written: false,
            reg: None,
            base: None,
            index: None,
        }
    }

    pub fn register(reg: impl Into<Register>, read: bool, written: bool) -> Self {
        Self {
            kind: OperandKind::Register,
            read,
            written,
            reg: Some(reg.into()),
            base: None,
            index: None,
        }
    }

    pub fn memory(
        base: Option<Register>,
        index: Option<Register>,
        read: bool,
        written: bool,
    ) -> Self {
        Self {
            kind: OperandKind::Memory,
            read,
            written,
            reg: None,
            base,
            index,
        }
    }

    pub fn address(base: Option<Register>, index: Option<Register>) -> Self {
        Self {
            kind: OperandKind::Address,
            read: true,
            written: false,
            reg: None,
            base,
            index,
        }
    }

    /// Whether the operand carries the given access (`read` and/or `written`).
    #[inline]
    pub fn has_access(&self, read: bool, written: bool) -> bool {
        (!read || self.read) && (!written || self.written)
    }

    /// The general-purpose register of a register operand.
    pub fn gpr(&self) -> Option<Gpr> {
        match self.kind {
            OperandKind::Register => self.reg.as_ref().and_then(Register::gpr),
            _ => None,
        }
    }

    /// The general-purpose base and index registers of a memory or address
    /// operand, base first.
    pub fn address_gprs(&self) -> impl Iterator<Item = Gpr> + '_ {
        let regs = match self.kind {
            OperandKind::Memory | OperandKind::Address => {
                [self.base.as_ref(), self.index.as_ref()]
            }
            _ => [None, None],
        };
        regs.into_iter().flatten().filter_map(Register::gpr)
    }

    /// Whether the operand can influence taint propagation at all.
    pub fn is_relevant(&self) -> bool {
        match self.kind {
            OperandKind::Register => self.gpr().is_some(),
            OperandKind::Memory => true,
            OperandKind::Address => self.address_gprs().next().is_some(),
            OperandKind::Immediate => false,
        }
    }
}
