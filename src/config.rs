//! Sizing knobs the original implementation hard-coded as preprocessor
//! constants (`picoc.h`'s `HEAP_SIZE`, `GLOBAL_TABLE_SIZE`, ...). The spec's
//! open questions flag these as things a real embedder needs to tune, so
//! they are collected into one struct instead of `const`s.

/// The largest power of ten that fits in an `i32` on this host, used by the
/// `%f` formatter in [`crate::str_slice`] to print the integer part of a
/// double by repeated division.
pub const LARGE_INT_POWER_OF_TEN: i64 = 1_000_000_000;

#[derive(Clone, Debug)]
pub struct InterpreterConfig {
    /// Size in bytes of the combined stack-side/free-list-side arena.
    pub heap_size: usize,
    /// Capacity of the global symbol table.
    pub global_table_size: usize,
    /// Capacity of each call frame's local symbol table.
    pub local_table_size: usize,
    /// Maximum nested call depth before a stack-exhaustion runtime error.
    pub stack_depth: usize,
    /// Maximum number of actual parameters a single call may pass.
    pub parameter_max: usize,
    /// Maximum number of functions and macros that may be registered at
    /// global scope over the process lifetime.
    pub max_functions: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            heap_size: 2048,
            global_table_size: 397,
            local_table_size: 11,
            stack_depth: 10,
            parameter_max: 10,
            max_functions: 200,
        }
    }
}
