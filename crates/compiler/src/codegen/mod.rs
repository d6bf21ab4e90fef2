//! MIPS-flavored code generation
//!
//! Consumes the CFG (re-walking each block's original statements; the
//! three-address form is only used by the `.cfg` dump) and the scope tree
//! (read-only, except for filling variable frame offsets during prologue
//! computation) to produce the `.s` text.
//!
//! # Conventions
//!
//! - Block labels are `label<N>` with `N` the program-wide block id;
//!   every function's epilogue is reachable as `epilogue_<name>`.
//! - Integer and pointer values return in `$v1`; float values in `$f0`.
//! - Call sites store arguments below `$sp` right-to-left (argument 0 in
//!   the lowest slot), drop `$sp` by the summed widths, `jal`, restore.
//! - Globals live in `.data` as `global_<name>`.
//!
//! # Module structure
//!
//! - `state.rs`: CodeGen struct and the fixed register pools
//! - `program.rs`: data section, frame layout, prologue/epilogue
//! - `expr.rs`: expression emission
//! - `statements.rs`: assignment, branch, return, and call statements

mod expr;
mod program;
mod state;
mod statements;

pub use state::CodeGen;
