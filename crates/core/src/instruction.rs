use serde::{Deserialize, Serialize};

use crate::operand::Operand;

/// Control-flow category flags of an instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub branch: bool,
    pub call: bool,
    pub nop: bool,
}

/// Decoded, static facts about one instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionFacts {
    /// Address of the instruction itself.
    pub address: u64,
    pub mnemonic: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub operands: Vec<Operand>,
    /// Name of the enclosing routine, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine: Option<String>,
    /// Path of the enclosing image, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl InstructionFacts {
    pub fn new(address: u64, mnemonic: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            address,
            mnemonic: mnemonic.into(),
            category: Category::default(),
            operands,
            routine: None,
            image: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_location(
        mut self,
        routine: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        self.routine = Some(routine.into());
        self.image = Some(image.into());
        self
    }

    /// Branches, calls and no-ops never move data between tracked locations.
    pub fn is_relevant(&self) -> bool {
        !(self.category.branch || self.category.call || self.category.nop)
    }

    /// Whether the mnemonic is `name`, ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.mnemonic.eq_ignore_ascii_case(name)
    }
}
