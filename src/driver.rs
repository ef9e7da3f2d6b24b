//! Top-level "scan file, then run `main`" entry point. Out of the core per
//! the spec's scope note, but bundled here since this crate is the whole
//! embeddable unit rather than just the evaluator library.

use std::path::Path;

use tracing::instrument;

use crate::error::{InterpError, Location};
use crate::interp::Interpreter;
use crate::lexer::LexState;
use crate::parser::{call_function, scan_top_level};
use crate::value::{Payload, Value};

fn no_location() -> Location {
    Location { file: String::new(), line: 0 }
}

/// Reads `path`, registers its text as a source buffer, and parses it at
/// global scope: function bodies are captured as source slices, variable
/// initializers run immediately, exactly the "scan in RunIt=false mode,
/// but run global initializers" contract.
#[instrument(level = "debug", skip(interp))]
pub fn scan_file(interp: &mut Interpreter, path: impl AsRef<Path>) -> Result<(), InterpError> {
    let path = path.as_ref();
    let text = std::fs::read(path)
        .map_err(|e| InterpError::preprocessing(no_location(), format!("cannot open '{}': {e}", path.display())))?;
    let filename = path.display().to_string();
    let source = interp.register_source_text(filename, text);
    let len = interp.sources.len(source);
    let mut lex = LexState::new(source, 0, len, 1);
    scan_top_level(interp, &mut lex)
}

/// Looks up `main` in the global table and calls it with no arguments, the
/// way the driver does once every registered file has been scanned.
#[instrument(level = "debug", skip(interp))]
pub fn run_main(interp: &mut Interpreter) -> Result<Value, InterpError> {
    let main_name = interp.intern_identifier("main");
    let vref = interp
        .lookup(&main_name)
        .ok_or_else(|| InterpError::semantic(no_location(), "no 'main' function defined"))?;
    let callee = *interp.values.get(vref);
    let Payload::Function(func) = callee.payload else {
        return Err(InterpError::semantic(no_location(), "'main' is not a function"));
    };
    // `main` is invoked from outside any source file; the sentinel lexer
    // state stands in for the (nonexistent) call-site position.
    let call_site = LexState::intrinsic_sentinel(0);
    call_function(interp, &call_site, func, Vec::new())
}

/// Scans every file in order, then runs `main`. The shape of the typical
/// embedder's CLI per the external-interfaces contract.
pub fn run_files(interp: &mut Interpreter, paths: &[impl AsRef<Path>]) -> Result<Value, InterpError> {
    for path in paths {
        scan_file(interp, path)?;
    }
    run_main(interp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpreterConfig;
    use crate::intrinsics::register_defaults;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    fn make_interp() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink_buf = out.clone();
        let mut interp =
            Interpreter::new(InterpreterConfig::default(), Box::new(move |b: &[u8]| sink_buf.borrow_mut().extend_from_slice(b)));
        register_defaults(&mut interp).unwrap();
        (interp, out)
    }

    fn scan_str(interp: &mut Interpreter, filename: &str, text: &str) -> Result<(), InterpError> {
        let source = interp.register_source_text(filename.to_string(), text.as_bytes().to_vec());
        let len = interp.sources.len(source);
        let mut lex = LexState::new(source, 0, len, 1);
        scan_top_level(interp, &mut lex)
    }

    #[test]
    fn scans_and_runs_main() {
        let (mut interp, out) = make_interp();
        scan_str(&mut interp, "t.c", "int main(){ printf(\"%d\\n\", 2+3*4); }").unwrap();
        run_main(&mut interp).unwrap();
        let mut buf = Vec::new();
        buf.write_all(&out.borrow()).unwrap();
        assert_eq!(buf, b"14\n");
    }

    #[test]
    fn missing_main_is_an_error() {
        let (mut interp, _out) = make_interp();
        scan_str(&mut interp, "t.c", "int unused(){ return 0; }").unwrap();
        assert!(run_main(&mut interp).is_err());
    }
}
