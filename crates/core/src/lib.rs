pub mod error;
pub mod instruction;
pub mod operand;
pub mod register;
pub mod trace;
