//! Host functions registered into the global table under a `function`
//! type whose payload is `Payload::Intrinsic`. A call detects that marker
//! and, instead of lexing a body, hands `(result slot, declared return
//! type, id)` to the dispatch routine, reading arguments from the shared
//! parameter array the caller already populated.
//!
//! Four default intrinsics ship so the crate is runnable standalone, the
//! way an embedder's own registrations would be; they are ordinary
//! `register_intrinsic` calls, nothing privileged about them.

use crate::error::{InterpError, Location};
use crate::interp::Interpreter;
use crate::str_slice::format_double;
use crate::value::{BaseType, HeapSlice, Payload, Value};

fn string_bytes<'a>(interp: &'a Interpreter, v: &Value, loc: &Location) -> Result<&'a [u8], InterpError> {
    match v.payload {
        Payload::Str(HeapSlice { offset, len }) => Ok(interp.heap.read_bytes(offset, len)),
        _ => Err(InterpError::semantic(loc.clone(), "expected a string argument")),
    }
}

/// `%d %c %s %S %f`: `%s` a C-style string read until NUL, `%S` a
/// length-prefixed slice (our native string representation), `%f` a
/// double formatted to at most ten significant digits.
pub fn format_printf(interp: &mut Interpreter, format: &[u8], args: &[Value], loc: &Location) -> Result<(), InterpError> {
    let mut arg_iter = args.iter();
    let mut out = Vec::new();
    let mut i = 0;
    while i < format.len() {
        if format[i] != b'%' || i + 1 >= format.len() {
            out.push(format[i]);
            i += 1;
            continue;
        }
        let spec = format[i + 1];
        i += 2;
        let arg = arg_iter
            .next()
            .ok_or_else(|| InterpError::semantic(loc.clone(), "printf: too few arguments for format string"))?;
        match spec {
            b'd' => match arg.payload {
                Payload::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
                _ => return Err(InterpError::semantic(loc.clone(), "%d expects an int")),
            },
            b'c' => match arg.payload {
                Payload::Char(c) => out.push(c),
                Payload::Int(v) => out.push(v as u8),
                _ => return Err(InterpError::semantic(loc.clone(), "%c expects a char")),
            },
            b's' | b'S' => {
                let bytes = string_bytes(interp, arg, loc)?;
                match spec {
                    b's' => out.extend_from_slice(bytes.split(|&b| b == 0).next().unwrap_or(bytes)),
                    _ => out.extend_from_slice(bytes),
                }
            }
            b'f' => match arg.payload {
                Payload::Float(v) => out.extend_from_slice(format_double(v).as_bytes()),
                _ => return Err(InterpError::semantic(loc.clone(), "%f expects a float")),
            },
            b'%' => out.push(b'%'),
            other => {
                return Err(InterpError::semantic(loc.clone(), format!("unsupported format spec '%{}'", other as char)))
            }
        }
    }
    interp.write(&out);
    Ok(())
}

fn intrinsic_printf(interp: &mut Interpreter, args: &[Value], loc: &Location) -> Result<Value, InterpError> {
    let fmt = args.first().ok_or_else(|| InterpError::semantic(loc.clone(), "printf: missing format string"))?;
    let bytes = string_bytes(interp, fmt, loc)?.to_vec();
    format_printf(interp, &bytes, &args[1..], loc)?;
    Ok(Value::transient(interp.types.int, Payload::Int(0)))
}

fn intrinsic_putchar(interp: &mut Interpreter, args: &[Value], loc: &Location) -> Result<Value, InterpError> {
    let arg = args.first().ok_or_else(|| InterpError::semantic(loc.clone(), "putchar: missing argument"))?;
    let byte = match arg.payload {
        Payload::Char(c) => c,
        Payload::Int(v) => v as u8,
        _ => return Err(InterpError::semantic(loc.clone(), "putchar expects a char or int")),
    };
    interp.write(&[byte]);
    Ok(Value::transient(interp.types.int, Payload::Int(byte as i32)))
}

fn intrinsic_strlen(interp: &mut Interpreter, args: &[Value], loc: &Location) -> Result<Value, InterpError> {
    let arg = args.first().ok_or_else(|| InterpError::semantic(loc.clone(), "strlen: missing argument"))?;
    let bytes = string_bytes(interp, arg, loc)?;
    let len = bytes.split(|&b| b == 0).next().unwrap_or(bytes).len();
    Ok(Value::transient(interp.types.int, Payload::Int(len as i32)))
}

fn intrinsic_exit(_interp: &mut Interpreter, args: &[Value], _loc: &Location) -> Result<Value, InterpError> {
    let code = match args.first().map(|v| v.payload) {
        Some(Payload::Int(v)) => v,
        _ => 0,
    };
    std::process::exit(code);
}

/// Registers the default standard-library-ish intrinsics. Called once by
/// the driver before any source is scanned, exactly the contract an
/// embedder's own registrations follow.
pub fn register_defaults(interp: &mut Interpreter) -> Result<(), InterpError> {
    let int = interp.types.int;
    let void = interp.types.void;
    let string = interp.types.string;
    interp.register_intrinsic("printf", int, vec![string], 0, intrinsic_printf)?;
    interp.register_intrinsic("putchar", int, vec![int], 1, intrinsic_putchar)?;
    interp.register_intrinsic("strlen", int, vec![string], 2, intrinsic_strlen)?;
    interp.register_intrinsic("exit", void, vec![int], 3, intrinsic_exit)?;
    let _ = BaseType::Void;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpreterConfig;

    fn make_interp() -> (Interpreter, std::rc::Rc<std::cell::RefCell<Vec<u8>>>) {
        let out = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink_buf = out.clone();
        let interp = Interpreter::new(InterpreterConfig::default(), Box::new(move |b: &[u8]| sink_buf.borrow_mut().extend_from_slice(b)));
        (interp, out)
    }

    #[test]
    fn printf_formats_integer() {
        let (mut interp, out) = make_interp();
        register_defaults(&mut interp).unwrap();
        let loc = crate::error::Location { file: "t.c".into(), line: 1 };
        format_printf(&mut interp, b"n=%d!", &[Value::transient(interp.types.int, Payload::Int(42))], &loc).unwrap();
        assert_eq!(&*out.borrow(), b"n=42!");
    }
}
