use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Number of architectural general-purpose registers.
pub const NUM_GPR: usize = 16;

/// An x86-64 general-purpose register in its canonical, full-width form.
/// The discriminant is the register's row in the taint table.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Gpr {
    Rax = 0,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Gpr {
    pub const ALL: [Gpr; NUM_GPR] = [
        Gpr::Rax,
        Gpr::Rcx,
        Gpr::Rdx,
        Gpr::Rbx,
        Gpr::Rsp,
        Gpr::Rbp,
        Gpr::Rsi,
        Gpr::Rdi,
        Gpr::R8,
        Gpr::R9,
        Gpr::R10,
        Gpr::R11,
        Gpr::R12,
        Gpr::R13,
        Gpr::R14,
        Gpr::R15,
    ];

    /// Row index of the register.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Gpr::Rax => "rax",
            Gpr::Rcx => "rcx",
            Gpr::Rdx => "rdx",
            Gpr::Rbx => "rbx",
            Gpr::Rsp => "rsp",
            Gpr::Rbp => "rbp",
            Gpr::Rsi => "rsi",
            Gpr::Rdi => "rdi",
            Gpr::R8 => "r8",
            Gpr::R9 => "r9",
            Gpr::R10 => "r10",
            Gpr::R11 => "r11",
            Gpr::R12 => "r12",
            Gpr::R13 => "r13",
            Gpr::R14 => "r14",
            Gpr::R15 => "r15",
        }
    }

    /// Resolve any name of a general-purpose register (including its 32, 16
    /// and 8-bit views) to the full-width register.
    pub fn from_alias(name: &str) -> Option<Gpr> {
        Gpr::parse_view(name).map(|(gpr, _)| gpr)
    }

    /// Resolve a register name to the full-width register and the part of
    /// it the name refers to.
    pub fn parse_view(name: &str) -> Option<(Gpr, View)> {
        use View::*;
        let name = name.to_ascii_lowercase();
        let view = match name.as_str() {
            "rax" => (Gpr::Rax, Qword),
            "eax" => (Gpr::Rax, Dword),
            "ax" => (Gpr::Rax, Word),
            "al" => (Gpr::Rax, Byte),
            "ah" => (Gpr::Rax, HighByte),
            "rcx" => (Gpr::Rcx, Qword),
            "ecx" => (Gpr::Rcx, Dword),
            "cx" => (Gpr::Rcx, Word),
            "cl" => (Gpr::Rcx, Byte),
            "ch" => (Gpr::Rcx, HighByte),
            "rdx" => (Gpr::Rdx, Qword),
            "edx" => (Gpr::Rdx, Dword),
            "dx" => (Gpr::Rdx, Word),
            "dl" => (Gpr::Rdx, Byte),
            "dh" => (Gpr::Rdx, HighByte),
            "rbx" => (Gpr::Rbx, Qword),
            "ebx" => (Gpr::Rbx, Dword),
            "bx" => (Gpr::Rbx, Word),
            "bl" => (Gpr::Rbx, Byte),
            "bh" => (Gpr::Rbx, HighByte),
            "rsp" => (Gpr::Rsp, Qword),
            "esp" => (Gpr::Rsp, Dword),
            "sp" => (Gpr::Rsp, Word),
            "spl" => (Gpr::Rsp, Byte),
            "rbp" => (Gpr::Rbp, Qword),
            "ebp" => (Gpr::Rbp, Dword),
            "bp" => (Gpr::Rbp, Word),
            "bpl" => (Gpr::Rbp, Byte),
            "rsi" => (Gpr::Rsi, Qword),
            "esi" => (Gpr::Rsi, Dword),
            "si" => (Gpr::Rsi, Word),
            "sil" => (Gpr::Rsi, Byte),
            "rdi" => (Gpr::Rdi, Qword),
            "edi" => (Gpr::Rdi, Dword),
            "di" => (Gpr::Rdi, Word),
            "dil" => (Gpr::Rdi, Byte),
            _ => {
                // r8 .. r15 with optional d/w/b/l suffix
                let rest = name.strip_prefix('r')?;
                let digits = rest.trim_end_matches(['d', 'w', 'b', 'l']);
                let view = match &rest[digits.len()..] {
                    "" => Qword,
                    "d" => Dword,
                    "w" => Word,
                    "b" | "l" => Byte,
                    _ => return None,
                };
                let gpr = match digits {
                    "8" => Gpr::R8,
                    "9" => Gpr::R9,
                    "10" => Gpr::R10,
                    "11" => Gpr::R11,
                    "12" => Gpr::R12,
                    "13" => Gpr::R13,
                    "14" => Gpr::R14,
                    "15" => Gpr::R15,
                    _ => return None,
                };
                (gpr, view)
            }
        };
        Some(view)
    }

    /// Name of a view of the register, e.g. `eax` for `(Rax, Dword)`.
    /// High-byte views only exist for rax, rcx, rdx and rbx; for the other
    /// registers they name the low byte.
    pub fn view_name(self, view: View) -> String {
        let full = self.name();
        match self {
            Gpr::Rax | Gpr::Rcx | Gpr::Rdx | Gpr::Rbx => {
                let letter = &full[1..2];
                match view {
                    View::Qword => full.to_string(),
                    View::Dword => format!("e{}x", letter),
                    View::Word => format!("{}x", letter),
                    View::Byte => format!("{}l", letter),
                    View::HighByte => format!("{}h", letter),
                }
            }
            Gpr::Rsp | Gpr::Rbp | Gpr::Rsi | Gpr::Rdi => {
                let short = &full[1..];
                match view {
                    View::Qword => full.to_string(),
                    View::Dword => format!("e{}", short),
                    View::Word => short.to_string(),
                    View::Byte | View::HighByte => format!("{}l", short),
                }
            }
            _ => match view {
                View::Qword => full.to_string(),
                View::Dword => format!("{}d", full),
                View::Word => format!("{}w", full),
                View::Byte | View::HighByte => format!("{}b", full),
            },
        }
    }
}

/// The part of a general-purpose register an operand names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    Qword,
    Dword,
    Word,
    /// bits 0..8
    Byte,
    /// bits 8..16 (ah, ch, dh, bh)
    HighByte,
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Gpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gpr::from_alias(s)
            .ok_or_else(|| format!("not a general-purpose register: {}", s))
    }
}

/// A register named by an operand.
/// Only general-purpose registers take part in taint propagation; anything
/// else (flags, instruction pointer, vector and segment registers) is kept
/// by name and ignored by the engine.
///
/// Two registers are equal only if they name the same view: `ah` and `al`
/// share a row in the taint table but are different registers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Register {
    Gpr(Gpr, View),
    Other(String),
}

impl Register {
    pub fn gpr(&self) -> Option<Gpr> {
        match self {
            Register::Gpr(gpr, _) => Some(*gpr),
            Register::Other(_) => None,
        }
    }

    pub fn view(&self) -> Option<View> {
        match self {
            Register::Gpr(_, view) => Some(*view),
            Register::Other(_) => None,
        }
    }
}

/// The full-width register.
impl From<Gpr> for Register {
    fn from(gpr: Gpr) -> Self {
        Register::Gpr(gpr, View::Qword)
    }
}

impl From<String> for Register {
    fn from(name: String) -> Self {
        match Gpr::parse_view(&name) {
            Some((gpr, view)) => Register::Gpr(gpr, view),
            None => Register::Other(name.to_ascii_lowercase()),
        }
    }
}

impl From<&str> for Register {
    fn from(name: &str) -> Self {
        Register::from(name.to_string())
    }
}

impl From<Register> for String {
    fn from(reg: Register) -> Self {
        reg.to_string()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Gpr(gpr, view) => f.write_str(&gpr.view_name(*view)),
            Register::Other(name) => f.write_str(name),
        }
    }
}
