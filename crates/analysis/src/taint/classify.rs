use std::path::Path;

use dift_core::{
    instruction::InstructionFacts,
    operand::{Operand, OperandKind},
    register::{Gpr, Register},
};
use dift_utils::log::debug;

use super::{policy::TrackPolicy, propagator::Propagator, Row};

/// One propagation rule, with the rows it operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    RegToReg {
        written: Vec<Row>,
        read: Vec<Row>,
    },
    MemToReg {
        written: Vec<Row>,
        addr_regs: Vec<Row>,
        should_track: bool,
    },
    RegToMem {
        addr_regs: Vec<Row>,
        read: Vec<Row>,
    },
    Clear(Row),
    Exchange(Row, Row),
}

/// The propagation rules of one static instruction.
/// Plans only depend on the decoded instruction, so they are computed once
/// per instruction address and applied on every execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPlan {
    pub address: u64,
    pub steps: Vec<Step>,
    pub reads_memory: bool,
    pub writes_memory: bool,
    pub routine: String,
    /// File name of the image the instruction belongs to.
    pub image: String,
}

fn rows(gprs: &[Gpr]) -> Vec<Row> {
    gprs.iter().map(|r| r.index()).collect()
}

/// General-purpose registers read (or written) by register operands and by
/// address operands.
fn register_gprs(ops: &[&Operand], read: bool, written: bool) -> Vec<Gpr> {
    ops.iter()
        .filter(|op| op.has_access(read, written))
        .flat_map(|op| match op.kind {
            OperandKind::Register => op.gpr().into_iter().collect::<Vec<_>>(),
            OperandKind::Address => op.address_gprs().collect(),
            _ => vec![],
        })
        .collect()
}

/// Base and index registers of memory operands with the given access.
fn memory_gprs(ops: &[&Operand], read: bool, written: bool) -> Vec<Gpr> {
    ops.iter()
        .filter(|op| op.kind == OperandKind::Memory && op.has_access(read, written))
        .flat_map(|op| op.address_gprs())
        .collect()
}

impl InstructionPlan {
    /// Classify an instruction. Returns None for instructions that never
    /// propagate taint (branches, calls and no-ops).
    pub fn classify<P: TrackPolicy>(facts: &InstructionFacts, policy: &P) -> Option<Self> {
        if !facts.is_relevant() {
            return None;
        }

        let ops: Vec<&Operand> = facts.operands.iter().filter(|op| op.is_relevant()).collect();
        let reg_r = register_gprs(&ops, true, false);
        let reg_w = register_gprs(&ops, false, true);
        let mem_r = memory_gprs(&ops, true, false);
        let mem_w = memory_gprs(&ops, false, true);
        let reads_memory = ops
            .iter()
            .any(|op| op.kind == OperandKind::Memory && op.read);
        let writes_memory = ops
            .iter()
            .any(|op| op.kind == OperandKind::Memory && op.written);

        // explicit register operands, in operand order
        let explicit: Vec<Gpr> = ops.iter().filter_map(|op| op.gpr()).collect();
        let register_only = !reads_memory && !writes_memory;

        let mut steps = Vec::new();
        if reads_memory {
            steps.push(Step::MemToReg {
                written: rows(&reg_w),
                addr_regs: rows(&mem_r),
                should_track: policy.should_track(&mem_r),
            });
        } else if facts.is("xchg") && register_only && explicit.len() == 2 {
            steps.push(Step::Exchange(explicit[0].index(), explicit[1].index()));
        } else if !reg_w.is_empty() {
            steps.push(Step::RegToReg {
                written: rows(&reg_w),
                read: rows(&reg_r),
            });
        }

        if writes_memory {
            steps.push(Step::RegToMem {
                addr_regs: rows(&mem_w),
                read: rows(&reg_r),
            });
        }

        // xor eax, eax / sub rcx, rcx always produce zero; xor ah, al does not
        let zeroing = facts.is("xor") || facts.is("sub");
        let views: Vec<&Register> = ops
            .iter()
            .filter(|op| op.gpr().is_some())
            .filter_map(|op| op.reg.as_ref())
            .collect();
        if zeroing && register_only && views.len() >= 2 && views[0] == views[1] {
            steps.push(Step::Clear(explicit[0].index()));
        }

        let image = facts
            .image
            .as_deref()
            .map(|path| {
                Path::new(path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string())
            })
            .unwrap_or_default();

        Some(Self {
            address: facts.address,
            steps,
            reads_memory,
            writes_memory,
            routine: facts.routine.clone().unwrap_or_default(),
            image,
        })
    }

    /// Apply the plan for one execution of the instruction.
    /// A memory rule whose effective address is unknown is skipped.
    pub fn apply(&self, pg: &mut Propagator, read_ea: Option<u64>, write_ea: Option<u64>) {
        for step in self.steps.iter() {
            match step {
                Step::RegToReg { written, read } => pg.reg_to_reg(written, read),
                Step::MemToReg {
                    written,
                    addr_regs,
                    should_track,
                } => match read_ea {
                    Some(ea) => pg.mem_to_reg(written, addr_regs, ea, *should_track),
                    None => debug!(
                        ins = format_args!("{:#x}", self.address),
                        "no read address for load, skipped"
                    ),
                },
                Step::RegToMem { addr_regs, read } => match write_ea {
                    Some(ea) => pg.reg_to_mem(addr_regs, read, ea),
                    None => debug!(
                        ins = format_args!("{:#x}", self.address),
                        "no write address for store, skipped"
                    ),
                },
                Step::Clear(row) => pg.clear(*row),
                Step::Exchange(r1, r2) => pg.exchange(*r1, *r2),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dift_core::{
        instruction::{Category, InstructionFacts},
        operand::Operand,
        register::{Gpr, Register},
    };

    use crate::taint::{
        policy::{AlwaysTrack, StackFramePolicy},
        propagator::Propagator,
    };

    use super::{InstructionPlan, Step};

    fn reg(name: &str, read: bool, written: bool) -> Operand {
        Operand::register(name, read, written)
    }

    fn mem(base: Option<&str>, index: Option<&str>, read: bool, written: bool) -> Operand {
        Operand::memory(base.map(Register::from), index.map(Register::from), read, written)
    }

    fn flags() -> Operand {
        reg("rflags", false, true)
    }

    fn plan(mnemonic: &str, operands: Vec<Operand>) -> InstructionPlan {
        let facts = InstructionFacts::new(0x1000, mnemonic, operands);
        InstructionPlan::classify(&facts, &StackFramePolicy::default()).unwrap()
    }

    const RAX: usize = Gpr::Rax as usize;
    const RBX: usize = Gpr::Rbx as usize;
    const RCX: usize = Gpr::Rcx as usize;
    const RSP: usize = Gpr::Rsp as usize;
    const RBP: usize = Gpr::Rbp as usize;

    #[test]
    fn test_irrelevant_instructions() {
        let facts = InstructionFacts::new(0, "jmp", vec![reg("rax", true, false)]).with_category(
            Category {
                branch: true,
                ..Default::default()
            },
        );
        assert!(InstructionPlan::classify(&facts, &AlwaysTrack).is_none());
    }

    #[test]
    fn test_register_arithmetic() {
        // add eax, ebx
        let p = plan("add", vec![reg("eax", true, true), reg("ebx", true, false), flags()]);
        assert_eq!(
            p.steps,
            vec![Step::RegToReg {
                written: vec![RAX],
                read: vec![RAX, RBX],
            }]
        );
    }

    #[test]
    fn test_immediate_only_source() {
        // mov ecx, 5
        let p = plan("mov", vec![reg("ecx", false, true), Operand::immediate()]);
        assert_eq!(
            p.steps,
            vec![Step::RegToReg {
                written: vec![RCX],
                read: vec![],
            }]
        );
    }

    #[test]
    fn test_lea_reads_address_registers() {
        // lea rax, [rbx+rcx*4]
        let p = plan(
            "lea",
            vec![
                reg("rax", false, true),
                Operand::address(Some("rbx".into()), Some("rcx".into())),
            ],
        );
        assert_eq!(
            p.steps,
            vec![Step::RegToReg {
                written: vec![RAX],
                read: vec![RBX, RCX],
            }]
        );
        assert!(!p.reads_memory);
    }

    #[test]
    fn test_load() {
        // mov rax, [rbx+rcx]
        let p = plan(
            "mov",
            vec![reg("rax", false, true), mem(Some("rbx"), Some("rcx"), true, false)],
        );
        assert_eq!(
            p.steps,
            vec![Step::MemToReg {
                written: vec![RAX],
                addr_regs: vec![RBX, RCX],
                should_track: true,
            }]
        );
    }

    #[test]
    fn test_stack_load_is_untracked() {
        // mov rax, [rbp-8]
        let p = plan("mov", vec![reg("rax", false, true), mem(Some("rbp"), None, true, false)]);
        assert_eq!(
            p.steps,
            vec![Step::MemToReg {
                written: vec![RAX],
                addr_regs: vec![RBP],
                should_track: false,
            }]
        );
    }

    #[test]
    fn test_absolute_load_is_tracked() {
        // mov rax, [0x601040]
        let p = plan("mov", vec![reg("rax", false, true), mem(None, None, true, false)]);
        assert_eq!(
            p.steps,
            vec![Step::MemToReg {
                written: vec![RAX],
                addr_regs: vec![],
                should_track: true,
            }]
        );
    }

    #[test]
    fn test_store() {
        // mov [rbx], rax
        let p = plan("mov", vec![mem(Some("rbx"), None, false, true), reg("rax", true, false)]);
        assert_eq!(
            p.steps,
            vec![Step::RegToMem {
                addr_regs: vec![RBX],
                read: vec![RAX],
            }]
        );
        assert!(p.writes_memory);
    }

    #[test]
    fn test_push() {
        // push rax
        let p = plan(
            "push",
            vec![
                reg("rax", true, false),
                mem(Some("rsp"), None, false, true),
                reg("rsp", true, true),
            ],
        );
        assert_eq!(
            p.steps,
            vec![
                Step::RegToReg {
                    written: vec![RSP],
                    read: vec![RAX, RSP],
                },
                Step::RegToMem {
                    addr_regs: vec![RSP],
                    read: vec![RAX, RSP],
                },
            ]
        );
    }

    #[test]
    fn test_read_modify_write() {
        // add [rbx], eax
        let p = plan(
            "add",
            vec![mem(Some("rbx"), None, true, true), reg("eax", true, false), flags()],
        );
        assert_eq!(
            p.steps,
            vec![
                Step::MemToReg {
                    written: vec![],
                    addr_regs: vec![RBX],
                    should_track: true,
                },
                Step::RegToMem {
                    addr_regs: vec![RBX],
                    read: vec![RAX],
                },
            ]
        );
    }

    #[test]
    fn test_zeroing_idioms() {
        let p = plan("xor", vec![reg("eax", true, true), reg("eax", true, false), flags()]);
        assert_eq!(
            p.steps,
            vec![
                Step::RegToReg {
                    written: vec![RAX],
                    read: vec![RAX, RAX],
                },
                Step::Clear(RAX),
            ]
        );
        let p = plan("SUB", vec![reg("rcx", true, true), reg("rcx", true, false), flags()]);
        assert_eq!(p.steps.last(), Some(&Step::Clear(RCX)));
    }

    #[test]
    fn test_xor_with_other_register_is_not_cleared() {
        let p = plan("xor", vec![reg("eax", true, true), reg("ebx", true, false), flags()]);
        assert!(!p.steps.iter().any(|s| matches!(s, Step::Clear(_))));
    }

    #[test]
    fn test_xor_of_byte_halves_is_not_cleared() {
        for (dst, src) in [("ah", "al"), ("al", "ah")] {
            let p = plan("xor", vec![reg(dst, true, true), reg(src, true, false), flags()]);
            assert_eq!(
                p.steps,
                vec![Step::RegToReg {
                    written: vec![RAX],
                    read: vec![RAX, RAX],
                }]
            );
        }
        let p = plan("xor", vec![reg("ah", true, true), reg("al", true, false), flags()]);
        let mut pg = Propagator::new(16, 8);
        pg.seed(RAX, 3, 0x100);
        p.apply(&mut pg, None, None);
        assert!(pg.is_tainted(RAX, 3));
        // same byte view is still the zeroing idiom
        let p = plan("xor", vec![reg("bh", true, true), reg("bh", true, false), flags()]);
        assert_eq!(p.steps.last(), Some(&Step::Clear(RBX)));
    }

    #[test]
    fn test_exchange() {
        let p = plan("xchg", vec![reg("rax", true, true), reg("ebx", true, true)]);
        assert_eq!(p.steps, vec![Step::Exchange(RAX, RBX)]);
        // with memory it is a load and a store
        let p = plan("xchg", vec![mem(Some("rcx"), None, true, true), reg("rax", true, true)]);
        assert_eq!(p.steps.len(), 2);
    }

    #[test]
    fn test_location() {
        let facts = InstructionFacts::new(0x1000, "nop", vec![])
            .with_location("main", "/usr/lib/libcrypto.so.3");
        let p = InstructionPlan::classify(&facts, &AlwaysTrack).unwrap();
        assert_eq!(p.routine, "main");
        assert_eq!(p.image, "libcrypto.so.3");
        assert!(p.steps.is_empty());
    }

    #[test]
    fn test_apply_skips_missing_address() {
        let mut pg = Propagator::new(16, 8);
        let p = plan(
            "mov",
            vec![reg("rax", false, true), mem(Some("rbx"), None, true, false)],
        );
        p.apply(&mut pg, None, None);
        assert!(pg.table().live().is_empty());
        p.apply(&mut pg, Some(0x4000), None);
        assert_eq!(pg.table().row(RAX).len(), 1);
    }
}
