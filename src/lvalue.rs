//! Lvalues: storage locations that assignment, `&`, and `*` operate on.
//! A variable's whole record lives in the [`crate::value::ValueStore`]; an
//! array element lives as raw bytes in the byte heap, addressed by the
//! array's `ValueRef` plus an index.

use crate::error::{InterpError, Location};
use crate::interp::Interpreter;
use crate::value::{BaseType, Payload, PointerTarget, PointerValue, TypeId, Value, ValueRef};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Lvalue {
    Var(ValueRef),
    Element { array: ValueRef, index: i64 },
}

/// Either a transient rvalue or a location that can be read through or
/// written to. Mirrors "an lvalue is represented by a value whose payload
/// pointer addresses the storage to be written."
#[derive(Clone, Copy, Debug)]
pub enum Place {
    RValue(Value),
    LValue(Lvalue),
}

/// Placeholder used by lvalue operations that have no direct access to the
/// active lexer state, the same degraded-location pattern `Heap`/`Table`
/// already use for their own fatal errors; callers that do have a `LexState`
/// in scope (the parser) get full `(file, line)` in their own error paths
/// before these ever run.
fn no_location() -> Location {
    Location { file: String::new(), line: 0 }
}

impl Place {
    pub fn rvalue(ty: TypeId, payload: Payload) -> Self {
        Place::RValue(Value::transient(ty, payload))
    }

    pub fn to_value(&self, interp: &Interpreter) -> Result<Value, InterpError> {
        match self {
            Place::RValue(v) => Ok(*v),
            Place::LValue(lv) => read_lvalue(interp, *lv),
        }
    }

    pub fn as_lvalue(&self, interp: &Interpreter) -> Result<Lvalue, InterpError> {
        let _ = interp;
        match self {
            Place::LValue(lv) => Ok(*lv),
            Place::RValue(_) => Err(InterpError::semantic(no_location(), "expression is not an lvalue")),
        }
    }
}

pub fn elem_size(base: BaseType) -> usize {
    match base {
        BaseType::Char => 1,
        BaseType::Fp => 8,
        _ => 4,
    }
}

pub fn encode_scalar(interp: &mut Interpreter, base: BaseType, value: &Value, at: u32) {
    match (base, value.payload) {
        (BaseType::Int, Payload::Int(v)) => interp.heap.write_bytes(at, &v.to_le_bytes()),
        (BaseType::Char, Payload::Char(c)) => interp.heap.write_bytes(at, &[c]),
        (BaseType::Char, Payload::Int(v)) => interp.heap.write_bytes(at, &[v as u8]),
        (BaseType::Fp, Payload::Float(v)) => interp.heap.write_bytes(at, &v.to_le_bytes()),
        _ => unreachable!("encode_scalar called with mismatched base/payload"),
    }
}

pub fn decode_scalar(interp: &Interpreter, base: BaseType, ty: TypeId, at: u32) -> Value {
    match base {
        BaseType::Int => {
            let bytes: [u8; 4] = interp.heap.read_bytes(at, 4).try_into().unwrap();
            Value::transient(ty, Payload::Int(i32::from_le_bytes(bytes)))
        }
        BaseType::Char => {
            let bytes = interp.heap.read_bytes(at, 1);
            Value::transient(ty, Payload::Char(bytes[0]))
        }
        BaseType::Fp => {
            let bytes: [u8; 8] = interp.heap.read_bytes(at, 8).try_into().unwrap();
            Value::transient(ty, Payload::Float(f64::from_le_bytes(bytes)))
        }
        other => unreachable!("unsupported array element base type {other:?}"),
    }
}

pub fn read_lvalue(interp: &Interpreter, lv: Lvalue) -> Result<Value, InterpError> {
    match lv {
        Lvalue::Var(vref) => Ok(*interp.values.get(vref)),
        Lvalue::Element { array, index } => {
            let arr = *interp.values.get(array);
            let Payload::Array { elem_count, data, elem_type } = arr.payload else {
                return Err(InterpError::semantic(no_location(), "indexing a non-array value"));
            };
            if index < 0 || index as u32 >= elem_count {
                return Err(InterpError::runtime(
                    no_location(),
                    format!("array index {index} out of bounds (size {elem_count})"),
                ));
            }
            let base = interp.types.base(elem_type);
            let size = elem_size(base);
            let at = data + (index as u32) * size as u32;
            Ok(decode_scalar(interp, base, elem_type, at))
        }
    }
}

pub fn write_lvalue(interp: &mut Interpreter, lv: Lvalue, value: Value) -> Result<(), InterpError> {
    match lv {
        Lvalue::Var(vref) => {
            let slot = interp.values.get_mut(vref);
            slot.payload = value.payload;
            Ok(())
        }
        Lvalue::Element { array, index } => {
            let arr = *interp.values.get(array);
            let Payload::Array { elem_count, data, elem_type } = arr.payload else {
                return Err(InterpError::semantic(no_location(), "indexing a non-array value"));
            };
            if index < 0 || index as u32 >= elem_count {
                return Err(InterpError::runtime(
                    no_location(),
                    format!("array index {index} out of bounds (size {elem_count})"),
                ));
            }
            let base = interp.types.base(elem_type);
            let size = elem_size(base);
            let at = data + (index as u32) * size as u32;
            encode_scalar(interp, base, &value, at);
            Ok(())
        }
    }
}

/// Builds the pointer value `&lv`.
pub fn address_of(interp: &mut Interpreter, lv: Lvalue, pointee: TypeId) -> Value {
    let ptr_ty = interp.types.pointer_to(pointee);
    match lv {
        Lvalue::Var(vref) => Value::transient(
            ptr_ty,
            Payload::Pointer(PointerValue { target: PointerTarget::Segment(vref), offset: 0 }),
        ),
        Lvalue::Element { array, index } => Value::transient(
            ptr_ty,
            Payload::Pointer(PointerValue { target: PointerTarget::Segment(array), offset: index }),
        ),
    }
}

/// Resolves `*(ptr + extra)`: pointer dereference with an additional
/// integer offset (0 for a plain `*p`), per "[i] is *(p+i)".
pub fn deref_pointer(interp: &Interpreter, ptr: PointerValue, extra: i64) -> Result<Lvalue, InterpError> {
    let PointerTarget::Segment(vref) = ptr.target else {
        return Err(InterpError::semantic(
            no_location(),
            "dereferencing a raw host pointer from interpreted code",
        ));
    };
    let total_offset = ptr.offset + extra;
    let target = interp.values.get(vref);
    match target.payload {
        Payload::Array { .. } => Ok(Lvalue::Element { array: vref, index: total_offset }),
        _ => {
            if total_offset != 0 {
                return Err(InterpError::runtime(no_location(), "pointer arithmetic past a scalar value"));
            }
            Ok(Lvalue::Var(vref))
        }
    }
}
