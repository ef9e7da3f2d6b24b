//! Type descriptors and the tagged value union they describe, plus the
//! arena that owns every live `Value` record.
//!
//! Payloads that need backing storage (array elements, unescaped string
//! bytes) live in the byte [`crate::heap::Heap`]; the `Value` record itself
//! (its type id + payload discriminant) lives in a [`ValueStore`] slab so
//! the rest of the crate can hold a small `Copy` [`ValueRef`] instead of a
//! raw pointer.

use std::collections::HashMap;

use crate::str_slice::SourceSlice;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseType {
    Void,
    Int,
    Fp,
    Char,
    String,
    Function,
    Macro,
    Pointer,
    Array,
    Type,
}

pub type TypeId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    pub base: BaseType,
    pub subtype: Option<TypeId>,
}

/// Type descriptors are shared and immutable once interned; their lifetime
/// is the whole interpreter's, same as the global arena.
pub struct TypeInterner {
    descs: Vec<TypeDesc>,
    by_desc: HashMap<TypeDesc, TypeId>,
    pub void: TypeId,
    pub int: TypeId,
    pub fp: TypeId,
    pub char_: TypeId,
    pub string: TypeId,
    pub function: TypeId,
    pub macro_: TypeId,
    pub type_: TypeId,
}

impl TypeInterner {
    pub fn new() -> Self {
        let mut descs = Vec::new();
        let mut by_desc = HashMap::new();
        let mut intern_base = |base: BaseType, descs: &mut Vec<TypeDesc>, by_desc: &mut HashMap<TypeDesc, TypeId>| {
            let desc = TypeDesc { base, subtype: None };
            let id = descs.len() as TypeId;
            descs.push(desc);
            by_desc.insert(desc, id);
            id
        };
        let void = intern_base(BaseType::Void, &mut descs, &mut by_desc);
        let int = intern_base(BaseType::Int, &mut descs, &mut by_desc);
        let fp = intern_base(BaseType::Fp, &mut descs, &mut by_desc);
        let char_ = intern_base(BaseType::Char, &mut descs, &mut by_desc);
        let string = intern_base(BaseType::String, &mut descs, &mut by_desc);
        let function = intern_base(BaseType::Function, &mut descs, &mut by_desc);
        let macro_ = intern_base(BaseType::Macro, &mut descs, &mut by_desc);
        let type_ = intern_base(BaseType::Type, &mut descs, &mut by_desc);
        TypeInterner { descs, by_desc, void, int, fp, char_, string, function, macro_, type_ }
    }

    fn intern(&mut self, desc: TypeDesc) -> TypeId {
        if let Some(&id) = self.by_desc.get(&desc) {
            return id;
        }
        let id = self.descs.len() as TypeId;
        self.descs.push(desc);
        self.by_desc.insert(desc, id);
        id
    }

    pub fn pointer_to(&mut self, subtype: TypeId) -> TypeId {
        self.intern(TypeDesc { base: BaseType::Pointer, subtype: Some(subtype) })
    }

    pub fn array_of(&mut self, subtype: TypeId) -> TypeId {
        self.intern(TypeDesc { base: BaseType::Array, subtype: Some(subtype) })
    }

    pub fn desc(&self, id: TypeId) -> TypeDesc {
        self.descs[id as usize]
    }

    pub fn base(&self, id: TypeId) -> BaseType {
        self.descs[id as usize].base
    }

    pub fn subtype(&self, id: TypeId) -> Option<TypeId> {
        self.descs[id as usize].subtype
    }

    /// "value type" per the spec's predicate: copyable by assignment
    /// without indirection.
    pub fn is_value_type(&self, id: TypeId) -> bool {
        matches!(self.base(id), BaseType::Int | BaseType::Fp | BaseType::String)
    }

    /// Size in bytes of one element for pointer arithmetic: 1 for `char`, 8
    /// for `double`/`float`, machine int size otherwise. Mirrors
    /// `crate::lvalue::elem_size`, which encodes the same layout for array
    /// storage.
    pub fn pointee_size(&self, id: TypeId) -> usize {
        match self.base(id) {
            BaseType::Char => 1,
            BaseType::Fp => 8,
            _ => std::mem::size_of::<i32>(),
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// A span of unescaped bytes living in the byte heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapSlice {
    pub offset: u32,
    pub len: u32,
}

/// Where a pointer value's storage comes from. `Raw` models "Segment ==
/// NULL": an opaque host-memory token only intrinsics may interpret;
/// dereferencing it from interpreted code is a semantic error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Raw(u64),
    Segment(ValueRef),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerValue {
    pub target: PointerTarget,
    pub offset: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionValue {
    pub body: SourceSlice,
    /// The raw `(type name, type name, ...)` span between the parentheses,
    /// re-lexed on each call to bind formal parameter names. Empty for an
    /// object-like macro.
    pub params: SourceSlice,
    pub filename: SourceSlice,
    pub start_line: u32,
    pub return_type: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntrinsicValue {
    pub id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Payload {
    Int(i32),
    Float(f64),
    Char(u8),
    Str(HeapSlice),
    Array { elem_count: u32, data: u32, elem_type: TypeId },
    Pointer(PointerValue),
    Function(FunctionValue),
    Macro(FunctionValue),
    Intrinsic(IntrinsicValue),
    /// A first-class reference to a type descriptor (the `Type` base).
    TypeValue(TypeId),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Value {
    pub ty: TypeId,
    pub payload: Payload,
    pub must_free: bool,
}

impl Value {
    pub fn transient(ty: TypeId, payload: Payload) -> Self {
        Value { ty, payload, must_free: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueRef {
    Stack(u32),
    Heap(u32),
}

/// Owns every live `Value` record: a stack side for expression temporaries
/// and call-frame bookkeeping (bulk-invalidated on frame pop), and a
/// free-list side for bound variables (freed individually on scope exit,
/// or left to live for the process if never freed, i.e. globals).
#[derive(Default)]
pub struct ValueStore {
    stack: Vec<Value>,
    heap_slots: Vec<Option<Value>>,
    free_list: Vec<u32>,
}

impl ValueStore {
    pub fn new() -> Self {
        ValueStore::default()
    }

    pub fn push_frame(&self) -> u32 {
        self.stack.len() as u32
    }

    pub fn pop_frame(&mut self, mark: u32) {
        self.stack.truncate(mark as usize);
    }

    pub fn alloc_stack(&mut self, value: Value) -> ValueRef {
        self.stack.push(value);
        ValueRef::Stack((self.stack.len() - 1) as u32)
    }

    pub fn alloc_bound(&mut self, mut value: Value) -> ValueRef {
        value.must_free = true;
        if let Some(idx) = self.free_list.pop() {
            self.heap_slots[idx as usize] = Some(value);
            ValueRef::Heap(idx)
        } else {
            self.heap_slots.push(Some(value));
            ValueRef::Heap((self.heap_slots.len() - 1) as u32)
        }
    }

    pub fn free(&mut self, r: ValueRef) {
        if let ValueRef::Heap(idx) = r {
            self.heap_slots[idx as usize] = None;
            self.free_list.push(idx);
        }
    }

    pub fn get(&self, r: ValueRef) -> &Value {
        match r {
            ValueRef::Stack(i) => &self.stack[i as usize],
            ValueRef::Heap(i) => self.heap_slots[i as usize].as_ref().expect("dangling ValueRef"),
        }
    }

    pub fn get_mut(&mut self, r: ValueRef) -> &mut Value {
        match r {
            ValueRef::Stack(i) => &mut self.stack[i as usize],
            ValueRef::Heap(i) => self.heap_slots[i as usize].as_mut().expect("dangling ValueRef"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_identity_is_shared() {
        let mut interner = TypeInterner::new();
        let p1 = interner.pointer_to(interner.int);
        let p2 = interner.pointer_to(interner.int);
        assert_eq!(p1, p2);
    }

    #[test]
    fn value_type_predicate() {
        let interner = TypeInterner::new();
        assert!(interner.is_value_type(interner.int));
        assert!(interner.is_value_type(interner.fp));
        assert!(interner.is_value_type(interner.string));
        assert!(!interner.is_value_type(interner.function));
    }

    #[test]
    fn store_round_trip() {
        let mut store = ValueStore::new();
        let mark = store.push_frame();
        store.alloc_stack(Value::transient(0, Payload::Int(1)));
        store.alloc_stack(Value::transient(0, Payload::Int(2)));
        store.pop_frame(mark);
        assert_eq!(store.push_frame(), mark);
    }

    #[test]
    fn bound_values_reuse_freed_slots() {
        let mut store = ValueStore::new();
        let a = store.alloc_bound(Value::transient(0, Payload::Int(1)));
        store.free(a);
        let b = store.alloc_bound(Value::transient(0, Payload::Int(2)));
        assert_eq!(a, b);
    }
}
