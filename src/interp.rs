//! Ties every component together: the arena, the type interner, the value
//! store, the global table, the call stack, and the intrinsic registry.
//! Modeled as a struct threaded through by `&mut` rather than as module
//! statics, so two interpreters can coexist in one process (see the
//! concurrency notes in `SPEC_FULL.md` §5).

use std::collections::HashMap;

use tracing::instrument;

use crate::config::InterpreterConfig;
use crate::error::{InterpError, Location};
use crate::heap::Heap;
use crate::lexer::LexState;
use crate::str_slice::{SourceArena, SourceSlice};
use crate::table::{SetOutcome, Table};
use crate::value::{TypeInterner, Value, ValueRef, ValueStore};

pub type WriteSink = Box<dyn FnMut(&[u8])>;

/// A single call frame: the callee's local table and the arena marks to
/// restore on return. Frames are strictly LIFO.
pub struct Frame {
    pub locals: Table<ValueRef>,
    pub heap_mark: u32,
    pub value_stack_mark: u32,
}

pub struct IntrinsicEntry {
    pub name: String,
    pub return_type: crate::value::TypeId,
    pub param_types: Vec<crate::value::TypeId>,
    pub id: u32,
    pub dispatch: fn(&mut Interpreter, &[Value], &Location) -> Result<Value, InterpError>,
}

pub struct Interpreter {
    pub config: InterpreterConfig,
    pub sources: SourceArena,
    pub heap: Heap,
    pub types: TypeInterner,
    pub values: ValueStore,
    pub global: Table<ValueRef>,
    pub frames: Vec<Frame>,
    pub intrinsics: Vec<IntrinsicEntry>,
    intrinsics_by_name: HashMap<String, u32>,
    /// The shared return-value slot `return` writes into.
    pub return_slot: Option<Value>,
    pub write_sink: WriteSink,
    functions_registered: usize,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig, write_sink: WriteSink) -> Self {
        let heap = Heap::new(config.heap_size);
        let global = Table::new(config.global_table_size);
        Interpreter {
            heap,
            global,
            sources: SourceArena::new(),
            types: TypeInterner::new(),
            values: ValueStore::new(),
            frames: Vec::new(),
            intrinsics: Vec::new(),
            intrinsics_by_name: HashMap::new(),
            return_slot: None,
            write_sink,
            functions_registered: 0,
            config,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        (self.write_sink)(bytes);
    }

    pub fn intrinsic_by_name(&self, name: &str) -> Option<u32> {
        self.intrinsics_by_name.get(name).copied()
    }

    pub fn fatal(&self, lex: &LexState, msg: impl Into<String>) -> InterpError {
        InterpError::runtime(lex.loc(&self.sources), msg)
    }

    pub fn loc(&self, lex: &LexState) -> Location {
        lex.loc(&self.sources)
    }

    pub fn register_intrinsic(
        &mut self,
        name: &str,
        return_type: crate::value::TypeId,
        param_types: Vec<crate::value::TypeId>,
        id: u32,
        dispatch: fn(&mut Interpreter, &[Value], &Location) -> Result<Value, InterpError>,
    ) -> Result<(), InterpError> {
        let slot = self.intrinsics.len() as u32;
        self.intrinsics.push(IntrinsicEntry { name: name.to_string(), return_type, param_types, id, dispatch });
        self.intrinsics_by_name.insert(name.to_string(), slot);

        let key = self.register_source_text(format!("<intrinsic:{name}>"), Vec::new());
        let name_slice = self.intern_identifier(name);
        let fn_value = Value::transient(
            self.types.function,
            crate::value::Payload::Intrinsic(crate::value::IntrinsicValue { id: slot }),
        );
        let _ = key;
        let vref = self.values.alloc_bound(fn_value);
        self.global.set(name_slice, vref, &self.sources)?;
        Ok(())
    }

    /// Interns `text` as a tiny synthetic source buffer so identifiers used
    /// internally (e.g. by intrinsic registration) are ordinary
    /// `SourceSlice`s like everything else.
    pub fn intern_identifier(&mut self, text: &str) -> SourceSlice {
        let id = self.sources.register(format!("<builtin:{text}>"), text.as_bytes().to_vec());
        SourceSlice { source: id, start: 0, len: text.len() as u32 }
    }

    pub fn register_source_text(&mut self, filename: String, text: Vec<u8>) -> u32 {
        self.sources.register(filename, text)
    }

    #[instrument(level = "debug", skip(self), fields(filename))]
    pub fn push_frame(&mut self) -> Result<(), InterpError> {
        if self.frames.len() >= self.config.stack_depth {
            return Err(InterpError::runtime(
                Location { file: String::new(), line: 0 },
                format!("call stack exhausted (max depth {})", self.config.stack_depth),
            ));
        }
        let heap_mark = self.heap.push_frame();
        let value_stack_mark = self.values.push_frame();
        self.frames.push(Frame { locals: Table::new(self.config.local_table_size), heap_mark, value_stack_mark });
        Ok(())
    }

    pub fn pop_frame(&mut self) {
        let frame = self.frames.pop().expect("pop_frame without matching push_frame");
        for &(_, vref) in frame.locals.iter() {
            self.values.free(vref);
        }
        self.heap.pop_frame(frame.heap_mark);
        self.values.pop_frame(frame.value_stack_mark);
    }

    pub fn current_locals(&self) -> Option<&Table<ValueRef>> {
        self.frames.last().map(|f| &f.locals)
    }

    /// Local-then-global lookup, per the table design.
    pub fn lookup(&self, key: &SourceSlice) -> Option<ValueRef> {
        if let Some(frame) = self.frames.last() {
            if let Some(v) = frame.locals.get(key, &self.sources) {
                return Some(v);
            }
        }
        self.global.get(key, &self.sources)
    }

    pub fn declare_local(&mut self, key: SourceSlice, vref: ValueRef) -> Result<SetOutcome, InterpError> {
        let sources = &self.sources;
        let frame = self.frames.last_mut().expect("declare_local outside a call frame");
        frame.locals.set(key, vref, sources)
    }

    pub fn declare_global(&mut self, key: SourceSlice, vref: ValueRef) -> Result<SetOutcome, InterpError> {
        self.global.set(key, vref, &self.sources)
    }

    pub fn note_function_registered(&mut self) -> Result<(), InterpError> {
        if self.functions_registered >= self.config.max_functions {
            return Err(InterpError::runtime(
                Location { file: String::new(), line: 0 },
                format!("too many functions registered (max {})", self.config.max_functions),
            ));
        }
        self.functions_registered += 1;
        Ok(())
    }
}
