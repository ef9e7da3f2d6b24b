//! Recursive-descent recognizer that also evaluates: there is no separate
//! AST. Every recognizer takes a `run` flag (the spec's "RunIt"); `false`
//! means "consume tokens to recognize the grammar, but skip side effects,
//! lookups, and allocation."

use crate::error::{InterpError, Location};
use crate::interp::Interpreter;
use crate::lexer::{LexState, Token, TokenPayload, TypeKeyword};
use crate::lvalue::{address_of, deref_pointer, read_lvalue, write_lvalue, Lvalue, Place};
use crate::str_slice::SourceSlice;
use crate::value::{BaseType, FunctionValue, Payload, PointerTarget, PointerValue, TypeId, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Normal,
    Break,
    Return,
}

fn loc(interp: &Interpreter, lex: &LexState) -> Location {
    interp.loc(lex)
}

fn syntax_err(interp: &Interpreter, lex: &LexState, msg: impl Into<String>) -> InterpError {
    InterpError::syntax(loc(interp, lex), msg)
}

fn semantic_err(interp: &Interpreter, lex: &LexState, msg: impl Into<String>) -> InterpError {
    InterpError::semantic(loc(interp, lex), msg)
}

fn runtime_err(interp: &Interpreter, lex: &LexState, msg: impl Into<String>) -> InterpError {
    InterpError::runtime(loc(interp, lex), msg)
}

fn peek(interp: &Interpreter, lex: &mut LexState) -> Result<Token, InterpError> {
    lex.peek_plain_token(&interp.sources)
}

fn next(interp: &Interpreter, lex: &mut LexState) -> Result<(Token, TokenPayload), InterpError> {
    lex.get_token(&interp.sources)
}

fn expect(interp: &Interpreter, lex: &mut LexState, tok: Token) -> Result<(), InterpError> {
    let (got, _) = next(interp, lex)?;
    if got == tok {
        Ok(())
    } else {
        Err(syntax_err(interp, lex, format!("expected {tok:?}, found {got:?}")))
    }
}

fn expect_identifier(interp: &Interpreter, lex: &mut LexState) -> Result<SourceSlice, InterpError> {
    match next(interp, lex)? {
        (Token::Identifier, TokenPayload::Ident(s)) => Ok(s),
        (got, _) => Err(syntax_err(interp, lex, format!("expected identifier, found {got:?}"))),
    }
}

fn dummy_value(interp: &Interpreter) -> Value {
    Value::transient(interp.types.int, Payload::Int(0))
}

fn int_value(interp: &Interpreter, v: i32) -> Value {
    Value::transient(interp.types.int, Payload::Int(v))
}

fn bool_value(interp: &Interpreter, v: bool) -> Value {
    int_value(interp, v as i32)
}

fn truthy(interp: &Interpreter, lex: &LexState, v: &Value) -> Result<bool, InterpError> {
    Ok(match v.payload {
        Payload::Int(i) => i != 0,
        Payload::Float(f) => f != 0.0,
        Payload::Char(c) => c != 0,
        Payload::Pointer(PointerValue { target: PointerTarget::Raw(0), .. }) => false,
        Payload::Pointer(_) => true,
        _ => return Err(semantic_err(interp, lex, "value used in a condition is not numeric")),
    })
}

// ---------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------

/// `type '*'*`
pub fn parse_type(interp: &mut Interpreter, lex: &mut LexState) -> Result<TypeId, InterpError> {
    let (tok, _) = next(interp, lex)?;
    let mut ty = match tok {
        Token::Type(TypeKeyword::Void) => interp.types.void,
        Token::Type(TypeKeyword::Int) => interp.types.int,
        Token::Type(TypeKeyword::Char) => interp.types.char_,
        Token::Type(TypeKeyword::Float) | Token::Type(TypeKeyword::Double) => interp.types.fp,
        got => return Err(syntax_err(interp, lex, format!("expected a type, found {got:?}"))),
    };
    while peek(interp, lex)? == Token::Asterisk {
        next(interp, lex)?;
        ty = interp.types.pointer_to(ty);
    }
    Ok(ty)
}

fn is_type_start(tok: Token) -> bool {
    matches!(tok, Token::Type(_))
}

fn zero_value_for(interp: &Interpreter, ty: TypeId) -> Value {
    match interp.types.base(ty) {
        BaseType::Fp => Value::transient(ty, Payload::Float(0.0)),
        BaseType::Char => Value::transient(ty, Payload::Char(0)),
        BaseType::Pointer => {
            Value::transient(ty, Payload::Pointer(PointerValue { target: PointerTarget::Raw(0), offset: 0 }))
        }
        _ => Value::transient(ty, Payload::Int(0)),
    }
}

// ---------------------------------------------------------------------
// Top level / driver entry points
// ---------------------------------------------------------------------

/// Parses an entire file at global scope: variable declarations take
/// effect immediately (initializers have no side effects beyond storage,
/// so there is no harm running them during the scan), function bodies are
/// captured as source slices without being parsed as statements.
pub fn scan_top_level(interp: &mut Interpreter, lex: &mut LexState) -> Result<(), InterpError> {
    loop {
        if peek(interp, lex)? == Token::Eof {
            return Ok(());
        }
        parse_top_level_item(interp, lex)?;
    }
}

fn parse_top_level_item(interp: &mut Interpreter, lex: &mut LexState) -> Result<(), InterpError> {
    match peek(interp, lex)? {
        Token::HashDefine => parse_define(interp, lex),
        Token::HashInclude => parse_include(interp, lex),
        tok if is_type_start(tok) => parse_global_declaration(interp, lex),
        got => Err(syntax_err(interp, lex, format!("expected a declaration, found {got:?}"))),
    }
}

fn parse_define(interp: &mut Interpreter, lex: &mut LexState) -> Result<(), InterpError> {
    expect(interp, lex, Token::HashDefine)?;
    let name = expect_identifier(interp, lex)?;
    let params = if peek(interp, lex)? == Token::LeftParen {
        parse_paren_span(interp, lex)?
    } else {
        SourceSlice::empty()
    };

    let body_start = lex.pos;
    let mut body_end = body_start;
    loop {
        match next(interp, lex)? {
            (Token::EndOfLine, _) | (Token::Eof, _) => break,
            _ => body_end = lex.pos,
        }
    }
    let body = SourceSlice { source: lex.source, start: body_start, len: body_end - body_start };

    let existing = interp.global.get(&name, &interp.sources);
    if let Some(vref) = existing {
        if matches!(interp.values.get(vref).payload, Payload::Macro(_) | Payload::Function(_)) {
            return Err(InterpError::preprocessing(
                loc(interp, lex),
                format!("redefinition of macro '{}'", name.as_str_lossy(&interp.sources)),
            ));
        }
    }

    let macro_value = Value::transient(
        interp.types.macro_,
        Payload::Macro(FunctionValue { body, params, filename: body, start_line: lex.line, return_type: interp.types.void }),
    );
    let vref = interp.values.alloc_bound(macro_value);
    interp.declare_global(name, vref)?;
    interp.note_function_registered()?;
    Ok(())
}

fn parse_include(interp: &mut Interpreter, lex: &mut LexState) -> Result<(), InterpError> {
    expect(interp, lex, Token::HashInclude)?;
    let path_slice = lex.lex_include_path(&interp.sources)?;
    let path = path_slice.as_str_lossy(&interp.sources);
    lex.skip_to_end_of_line(&interp.sources)?;

    let text = std::fs::read(&path)
        .map_err(|e| InterpError::preprocessing(loc(interp, lex), format!("cannot open '{path}': {e}")))?;
    let source = interp.register_source_text(path, text);
    let len = interp.sources.len(source);
    let mut inner = LexState::new(source, 0, len, 1);
    scan_top_level(interp, &mut inner)
}

/// Scans `(...)`, returning the inner span and leaving `lex` positioned
/// just after the closing paren. Assumes no nested parentheses, which
/// holds for both macro parameter lists and function parameter lists.
fn parse_paren_span(interp: &mut Interpreter, lex: &mut LexState) -> Result<SourceSlice, InterpError> {
    expect(interp, lex, Token::LeftParen)?;
    let start = lex.pos;
    let mut depth = 1u32;
    let mut end = start;
    loop {
        match next(interp, lex)? {
            (Token::LeftParen, _) => depth += 1,
            (Token::RightParen, _) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            (Token::Eof, _) => return Err(syntax_err(interp, lex, "expected ')'")),
            _ => {}
        }
        end = lex.pos;
    }
    Ok(SourceSlice { source: lex.source, start, len: end - start })
}

/// Scans `{...}` by brace depth, returning the inner span and leaving
/// `lex` positioned just after the matching closing brace.
fn capture_brace_block(interp: &mut Interpreter, lex: &mut LexState) -> Result<SourceSlice, InterpError> {
    expect(interp, lex, Token::LeftBrace)?;
    let start = lex.pos;
    let mut depth = 1u32;
    let mut end = start;
    loop {
        match next(interp, lex)? {
            (Token::LeftBrace, _) => depth += 1,
            (Token::RightBrace, _) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            (Token::Eof, _) => return Err(syntax_err(interp, lex, "expected '}'")),
            _ => {}
        }
        end = lex.pos;
    }
    Ok(SourceSlice { source: lex.source, start, len: end - start })
}

fn parse_global_declaration(interp: &mut Interpreter, lex: &mut LexState) -> Result<(), InterpError> {
    let base_ty = parse_type(interp, lex)?;
    let name = expect_identifier(interp, lex)?;

    if peek(interp, lex)? == Token::LeftParen {
        let params = parse_paren_span(interp, lex)?;
        let body = capture_brace_block(interp, lex)?;
        let func = Value::transient(
            interp.types.function,
            Payload::Function(FunctionValue { body, params, filename: body, start_line: lex.line, return_type: base_ty }),
        );
        let vref = interp.values.alloc_bound(func);
        interp.declare_global(name, vref)?;
        interp.note_function_registered()?;
        return Ok(());
    }

    let (ty, value) = parse_var_tail(interp, lex, base_ty, true)?;
    let _ = ty;
    let vref = interp.values.alloc_bound(value);
    interp.declare_global(name, vref)?;
    Ok(())
}

/// `('[' int ']')? ('=' initializer)? ';'`, shared between global and
/// local variable declarations. `run` controls whether the initializer is
/// actually evaluated (global declarations always pass `true`).
fn parse_var_tail(
    interp: &mut Interpreter,
    lex: &mut LexState,
    base_ty: TypeId,
    run: bool,
) -> Result<(TypeId, Value), InterpError> {
    if peek(interp, lex)? == Token::LeftBracket {
        next(interp, lex)?;
        let (tok, payload) = next(interp, lex)?;
        let count = match (tok, payload) {
            (Token::IntegerConstant, TokenPayload::Int(n)) if n >= 0 => n as u32,
            _ => return Err(syntax_err(interp, lex, "expected a non-negative array size")),
        };
        expect(interp, lex, Token::RightBracket)?;
        expect(interp, lex, Token::Semicolon)?;
        let array_ty = interp.types.array_of(base_ty);
        if !run {
            return Ok((array_ty, dummy_value(interp)));
        }
        let base = interp.types.base(base_ty);
        let elem_size = crate::lvalue::elem_size(base);
        let data = interp.heap.alloc(count as usize * elem_size)?;
        interp.heap.write_bytes(data, &vec![0u8; count as usize * elem_size]);
        let value = Value::transient(array_ty, Payload::Array { elem_count: count, data, elem_type: base_ty });
        return Ok((array_ty, value));
    }

    if peek(interp, lex)? == Token::Assign {
        next(interp, lex)?;
        let place = parse_assignment(interp, lex, run)?;
        expect(interp, lex, Token::Semicolon)?;
        if !run {
            return Ok((base_ty, dummy_value(interp)));
        }
        let value = place.to_value(interp)?;
        return Ok((base_ty, coerce(interp, lex, base_ty, value)?));
    }

    expect(interp, lex, Token::Semicolon)?;
    Ok((base_ty, if run { zero_value_for(interp, base_ty) } else { dummy_value(interp) }))
}

/// Truncating assignment conversion: narrowing copies by value, matching
/// "assignment to a narrower type truncates."
fn coerce(interp: &Interpreter, lex: &LexState, ty: TypeId, v: Value) -> Result<Value, InterpError> {
    let base = interp.types.base(ty);
    let payload = match (base, v.payload) {
        (BaseType::Int, Payload::Int(i)) => Payload::Int(i),
        (BaseType::Int, Payload::Float(f)) => Payload::Int(f as i32),
        (BaseType::Int, Payload::Char(c)) => Payload::Int(c as i32),
        (BaseType::Fp, Payload::Float(f)) => Payload::Float(f),
        (BaseType::Fp, Payload::Int(i)) => Payload::Float(i as f64),
        (BaseType::Fp, Payload::Char(c)) => Payload::Float(c as f64),
        (BaseType::Char, Payload::Char(c)) => Payload::Char(c),
        (BaseType::Char, Payload::Int(i)) => Payload::Char(i as u8),
        (BaseType::Char, Payload::Float(f)) => Payload::Char(f as u8),
        (BaseType::Pointer, Payload::Pointer(p)) => Payload::Pointer(p),
        (BaseType::String, Payload::Str(s)) => Payload::Str(s),
        (BaseType::Array, other) => other,
        (BaseType::Function, other) | (BaseType::Macro, other) | (BaseType::Type, other) => other,
        _ => return Err(semantic_err_static(lex, "incompatible types in assignment")),
    };
    Ok(Value::transient(ty, payload))
}

fn semantic_err_static(lex: &LexState, msg: impl Into<String>) -> InterpError {
    InterpError::semantic(Location { file: String::new(), line: lex.line }, msg)
}

// ---------------------------------------------------------------------
// Calls: interpreted functions, macros, intrinsics
// ---------------------------------------------------------------------

/// Re-lexes a captured `(type name, type name, ...)` span into formal
/// parameter `(type, name)` pairs.
fn parse_formal_params(interp: &mut Interpreter, params: SourceSlice) -> Result<Vec<(TypeId, SourceSlice)>, InterpError> {
    let mut lex = LexState::new(params.source, params.start, params.start + params.len, 0);
    let mut out = Vec::new();
    if peek(interp, &mut lex)? == Token::Eof {
        return Ok(out);
    }
    loop {
        let ty = parse_type(interp, &mut lex)?;
        let name = expect_identifier(interp, &mut lex)?;
        out.push((ty, name));
        match peek(interp, &mut lex)? {
            Token::Comma => {
                next(interp, &mut lex)?;
            }
            _ => break,
        }
    }
    Ok(out)
}

fn parse_formal_names(params: SourceSlice, interp: &mut Interpreter) -> Result<Vec<SourceSlice>, InterpError> {
    let mut lex = LexState::new(params.source, params.start, params.start + params.len, 0);
    let mut out = Vec::new();
    if peek(interp, &mut lex)? == Token::Eof {
        return Ok(out);
    }
    loop {
        let name = expect_identifier(interp, &mut lex)?;
        out.push(name);
        match peek(interp, &mut lex)? {
            Token::Comma => {
                next(interp, &mut lex)?;
            }
            _ => break,
        }
    }
    Ok(out)
}

/// Pushes a frame, binds actuals to formals, runs the body, pops the
/// frame, and returns the value left in the shared return slot. Public so
/// the driver can call `main` with no arguments the same way an interpreted
/// call site would.
pub fn call_function(interp: &mut Interpreter, lex: &LexState, func: FunctionValue, args: Vec<Value>) -> Result<Value, InterpError> {
    let formals = parse_formal_params(interp, func.params)?;
    if formals.len() != args.len() {
        return Err(semantic_err(
            interp,
            lex,
            format!("wrong argument count: expected {}, found {}", formals.len(), args.len()),
        ));
    }

    interp.push_frame()?;
    let bind_result = (|| -> Result<(), InterpError> {
        for ((ty, name), arg) in formals.into_iter().zip(args.into_iter()) {
            let coerced = coerce(interp, lex, ty, arg)?;
            let vref = interp.values.alloc_bound(coerced);
            interp.declare_local(name, vref)?;
        }
        Ok(())
    })();

    if let Err(e) = bind_result {
        interp.pop_frame();
        return Err(e);
    }

    let saved_return = interp.return_slot.take();
    let prior_default = zero_value_for(interp, func.return_type);
    interp.return_slot = Some(prior_default);

    let mut body_lex = LexState::new(func.body.source, func.body.start, func.body.start + func.body.len, func.start_line);
    let run_result = run_function_body(interp, &mut body_lex);

    let result = interp.return_slot.take().unwrap_or(prior_default);
    interp.return_slot = saved_return;
    interp.pop_frame();
    run_result?;
    Ok(coerce(interp, lex, func.return_type, result)?)
}

fn run_function_body(interp: &mut Interpreter, lex: &mut LexState) -> Result<(), InterpError> {
    loop {
        if peek(interp, lex)? == Token::Eof {
            return Ok(());
        }
        match parse_statement_or_declaration(interp, lex, true)? {
            Signal::Normal => continue,
            Signal::Break => return Err(runtime_err(interp, lex, "'break' outside a loop")),
            Signal::Return => return Ok(()),
        }
    }
}

/// Replaces every identifier token in `body` that matches a formal
/// parameter name with the corresponding actual argument's raw source
/// text, leaving everything else (including string/char literals) byte
/// for byte.
fn substitute_macro_body(body: &[u8], formals: &[Vec<u8>], actuals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b == b'"' || b == b'\'' {
            let quote = b;
            out.push(b);
            i += 1;
            while i < body.len() && body[i] != quote {
                if body[i] == b'\\' && i + 1 < body.len() {
                    out.push(body[i]);
                    out.push(body[i + 1]);
                    i += 2;
                } else {
                    out.push(body[i]);
                    i += 1;
                }
            }
            if i < body.len() {
                out.push(body[i]);
                i += 1;
            }
            continue;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < body.len() && (body[i].is_ascii_alphanumeric() || body[i] == b'_') {
                i += 1;
            }
            let word = &body[start..i];
            match formals.iter().position(|f| f == word) {
                Some(idx) => out.extend_from_slice(&actuals[idx]),
                None => out.extend_from_slice(word),
            }
            continue;
        }
        out.push(b);
        i += 1;
    }
    out
}

fn expand_macro(interp: &mut Interpreter, lex: &mut LexState, mac: FunctionValue, run: bool) -> Result<Place, InterpError> {
    expect(interp, lex, Token::LeftParen)?;
    let formal_names = parse_formal_names(mac.params, interp)?;
    let formal_bytes: Vec<Vec<u8>> = formal_names.iter().map(|s| s.bytes(&interp.sources).to_vec()).collect();

    let mut actual_bytes = Vec::new();
    if peek(interp, lex)? != Token::RightParen {
        loop {
            let start = lex.pos;
            parse_assignment(interp, lex, false)?;
            let end = lex.pos;
            let raw = SourceSlice { source: lex.source, start, len: end - start };
            actual_bytes.push(raw.bytes(&interp.sources).to_vec());
            if peek(interp, lex)? == Token::Comma {
                next(interp, lex)?;
            } else {
                break;
            }
        }
    }
    expect(interp, lex, Token::RightParen)?;

    if !run {
        return Ok(Place::RValue(dummy_value(interp)));
    }

    if actual_bytes.len() != formal_bytes.len() {
        return Err(semantic_err(
            interp,
            lex,
            format!("macro expects {} argument(s), found {}", formal_bytes.len(), actual_bytes.len()),
        ));
    }

    let body_bytes = mac.body.bytes(&interp.sources).to_vec();
    let expanded = substitute_macro_body(&body_bytes, &formal_bytes, &actual_bytes);
    let source = interp.register_source_text(format!("<macro expansion at line {}>", mac.start_line), expanded);
    let len = interp.sources.len(source);
    let mut expansion_lex = LexState::new(source, 0, len, mac.start_line);
    let result = parse_assignment(interp, &mut expansion_lex, true)?.to_value(interp)?;
    Ok(Place::RValue(result))
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

fn parse_statement_or_declaration(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    if is_type_start(peek(interp, lex)?) {
        parse_local_declaration(interp, lex, run)?;
        return Ok(Signal::Normal);
    }
    parse_statement(interp, lex, run)
}

fn parse_local_declaration(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<(), InterpError> {
    let base_ty = parse_type(interp, lex)?;
    let name = expect_identifier(interp, lex)?;
    let (ty, value) = parse_var_tail(interp, lex, base_ty, run)?;
    if run {
        let vref = interp.values.alloc_bound(value);
        interp.declare_local(name, vref)?;
    }
    let _ = ty;
    Ok(())
}

pub fn parse_statement(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    match peek(interp, lex)? {
        Token::LeftBrace => parse_compound(interp, lex, run),
        Token::Semicolon => {
            next(interp, lex)?;
            Ok(Signal::Normal)
        }
        Token::If => parse_if(interp, lex, run),
        Token::While => parse_while(interp, lex, run),
        Token::Do => parse_do_while(interp, lex, run),
        Token::For => parse_for(interp, lex, run),
        Token::Break => {
            next(interp, lex)?;
            expect(interp, lex, Token::Semicolon)?;
            Ok(if run { Signal::Break } else { Signal::Normal })
        }
        Token::Return => parse_return(interp, lex, run),
        Token::Switch => parse_switch(interp, lex, run),
        Token::Case => {
            next(interp, lex)?;
            parse_assignment(interp, lex, false)?;
            expect(interp, lex, Token::Colon)?;
            Ok(Signal::Normal)
        }
        Token::Default => {
            next(interp, lex)?;
            Ok(Signal::Normal)
        }
        _ => {
            parse_expression(interp, lex, run)?;
            expect(interp, lex, Token::Semicolon)?;
            Ok(Signal::Normal)
        }
    }
}

fn parse_compound(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::LeftBrace)?;
    let mut signal = Signal::Normal;
    let mut cur_run = run;
    loop {
        if peek(interp, lex)? == Token::RightBrace {
            next(interp, lex)?;
            return Ok(signal);
        }
        let s = parse_statement_or_declaration(interp, lex, cur_run)?;
        if cur_run {
            match s {
                Signal::Normal => {}
                Signal::Return => return Ok(Signal::Return),
                Signal::Break => {
                    signal = Signal::Break;
                    cur_run = false;
                }
            }
        }
    }
}

fn parse_if(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::If)?;
    expect(interp, lex, Token::LeftParen)?;
    let cond = parse_expression(interp, lex, run)?;
    expect(interp, lex, Token::RightParen)?;
    let cond_true = if run { truthy(interp, lex, &cond.to_value(interp)?)? } else { false };

    let then_signal = parse_statement(interp, lex, run && cond_true)?;

    if peek(interp, lex)? == Token::Else {
        next(interp, lex)?;
        let else_signal = parse_statement(interp, lex, run && !cond_true)?;
        return Ok(if run { if cond_true { then_signal } else { else_signal } } else { Signal::Normal });
    }
    Ok(if run && cond_true { then_signal } else { Signal::Normal })
}

fn parse_while(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::While)?;
    expect(interp, lex, Token::LeftParen)?;
    let cond_start = *lex;
    loop {
        *lex = cond_start;
        let cond = parse_expression(interp, lex, run)?;
        expect(interp, lex, Token::RightParen)?;
        let cond_true = if run { truthy(interp, lex, &cond.to_value(interp)?)? } else { false };
        let sig = parse_statement(interp, lex, run && cond_true)?;
        if !run || !cond_true {
            return Ok(Signal::Normal);
        }
        match sig {
            Signal::Normal => continue,
            Signal::Break => return Ok(Signal::Normal),
            Signal::Return => return Ok(Signal::Return),
        }
    }
}

fn parse_do_while(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::Do)?;
    let body_start = *lex;
    loop {
        *lex = body_start;
        let sig = parse_statement(interp, lex, run)?;
        expect(interp, lex, Token::While)?;
        expect(interp, lex, Token::LeftParen)?;
        let cond = parse_expression(interp, lex, run)?;
        expect(interp, lex, Token::RightParen)?;
        expect(interp, lex, Token::Semicolon)?;
        if !run {
            return Ok(Signal::Normal);
        }
        match sig {
            Signal::Break => return Ok(Signal::Normal),
            Signal::Return => return Ok(Signal::Return),
            Signal::Normal => {
                if truthy(interp, lex, &cond.to_value(interp)?)? {
                    continue;
                }
                return Ok(Signal::Normal);
            }
        }
    }
}

fn parse_for(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::For)?;
    expect(interp, lex, Token::LeftParen)?;
    if peek(interp, lex)? != Token::Semicolon {
        parse_expression(interp, lex, run)?;
    }
    expect(interp, lex, Token::Semicolon)?;
    let cond_start = *lex;

    loop {
        *lex = cond_start;
        let cond_true = if peek(interp, lex)? == Token::Semicolon {
            true
        } else {
            let cond = parse_expression(interp, lex, run)?;
            if run { truthy(interp, lex, &cond.to_value(interp)?)? } else { false }
        };
        expect(interp, lex, Token::Semicolon)?;
        let step_start = *lex;
        if peek(interp, lex)? != Token::RightParen {
            parse_expression(interp, lex, false)?;
        }
        expect(interp, lex, Token::RightParen)?;

        let sig = parse_statement(interp, lex, run && cond_true)?;
        if !run || !cond_true {
            return Ok(Signal::Normal);
        }
        match sig {
            Signal::Break => return Ok(Signal::Normal),
            Signal::Return => return Ok(Signal::Return),
            Signal::Normal => {
                *lex = step_start;
                if peek(interp, lex)? != Token::RightParen {
                    parse_expression(interp, lex, true)?;
                }
                continue;
            }
        }
    }
}

/// `switch`/`case`/`default` are recognized but not given case-value
/// matching semantics: the block executes straight through as if the
/// labels weren't there.
fn parse_switch(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::Switch)?;
    expect(interp, lex, Token::LeftParen)?;
    parse_expression(interp, lex, run)?;
    expect(interp, lex, Token::RightParen)?;
    parse_switch_body(interp, lex, run)
}

fn parse_switch_body(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::LeftBrace)?;
    let mut signal = Signal::Normal;
    let mut cur_run = run;
    loop {
        match peek(interp, lex)? {
            Token::RightBrace => {
                next(interp, lex)?;
                return Ok(signal);
            }
            Token::Case => {
                next(interp, lex)?;
                parse_assignment(interp, lex, false)?;
                expect(interp, lex, Token::Colon)?;
            }
            Token::Default => {
                next(interp, lex)?;
            }
            _ => {
                let s = parse_statement_or_declaration(interp, lex, cur_run)?;
                if cur_run {
                    match s {
                        Signal::Normal => {}
                        Signal::Return => return Ok(Signal::Return),
                        Signal::Break => {
                            signal = Signal::Break;
                            cur_run = false;
                        }
                    }
                }
            }
        }
    }
}

fn parse_return(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Signal, InterpError> {
    expect(interp, lex, Token::Return)?;
    if peek(interp, lex)? != Token::Semicolon {
        let place = parse_expression(interp, lex, run)?;
        if run {
            let v = place.to_value(interp)?;
            interp.return_slot = Some(v);
        }
    }
    expect(interp, lex, Token::Semicolon)?;
    if run {
        lex.pos = lex.end;
        Ok(Signal::Return)
    } else {
        Ok(Signal::Normal)
    }
}

// ---------------------------------------------------------------------
// Expressions: precedence climbing
// ---------------------------------------------------------------------

pub fn parse_expression(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    parse_assignment(interp, lex, run)
}

fn is_compound_assign(tok: Token) -> Option<Token> {
    Some(match tok {
        Token::PlusAssign => Token::Plus,
        Token::MinusAssign => Token::Minus,
        Token::AsteriskAssign => Token::Asterisk,
        Token::SlashAssign => Token::Slash,
        Token::PercentAssign => Token::Percent,
        Token::AmpersandAssign => Token::Ampersand,
        Token::PipeAssign => Token::Pipe,
        Token::CaretAssign => Token::Caret,
        _ => return None,
    })
}

/// `=` and the compound-assign forms; right-associative, returns the
/// assigned lvalue.
fn parse_assignment(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    let left = parse_logical_or(interp, lex, run)?;
    let tok = peek(interp, lex)?;
    if tok == Token::Assign {
        next(interp, lex)?;
        let right = parse_assignment(interp, lex, run)?;
        if !run {
            return Ok(Place::RValue(dummy_value(interp)));
        }
        let lv = left.as_lvalue(interp)?;
        let target_ty = read_lvalue(interp, lv)?.ty;
        let rv = coerce(interp, lex, target_ty, right.to_value(interp)?)?;
        write_lvalue(interp, lv, rv)?;
        return Ok(Place::LValue(lv));
    }
    if let Some(op) = is_compound_assign(tok) {
        next(interp, lex)?;
        let right = parse_assignment(interp, lex, run)?;
        if !run {
            return Ok(Place::RValue(dummy_value(interp)));
        }
        let lv = left.as_lvalue(interp)?;
        let cur = read_lvalue(interp, lv)?;
        let combined = apply_binop(interp, lex, op, cur, right.to_value(interp)?)?;
        let coerced = coerce(interp, lex, cur.ty, combined)?;
        write_lvalue(interp, lv, coerced)?;
        return Ok(Place::LValue(lv));
    }
    Ok(left)
}

macro_rules! left_assoc_level {
    ($name:ident, $next:ident, [$($tok:pat => $mk:expr),+ $(,)?]) => {
        fn $name(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
            let mut left = $next(interp, lex, run)?;
            loop {
                let op = match peek(interp, lex)? {
                    $($tok => $mk,)+
                    _ => return Ok(left),
                };
                next(interp, lex)?;
                let right = $next(interp, lex, run)?;
                if run {
                    let l = left.to_value(interp)?;
                    let r = right.to_value(interp)?;
                    left = Place::RValue(apply_binop(interp, lex, op, l, r)?);
                } else {
                    left = Place::RValue(dummy_value(interp));
                }
            }
        }
    };
}

left_assoc_level!(parse_bitor, parse_bitxor, [Token::Pipe => Token::Pipe]);
left_assoc_level!(parse_bitxor, parse_bitand, [Token::Caret => Token::Caret]);
left_assoc_level!(parse_bitand, parse_equality, [Token::Ampersand => Token::Ampersand]);
left_assoc_level!(parse_equality, parse_relational, [Token::Equal => Token::Equal, Token::NotEqual => Token::NotEqual]);
left_assoc_level!(
    parse_relational,
    parse_additive,
    [
        Token::LessThan => Token::LessThan,
        Token::LessEqual => Token::LessEqual,
        Token::GreaterThan => Token::GreaterThan,
        Token::GreaterEqual => Token::GreaterEqual,
    ]
);
left_assoc_level!(parse_additive, parse_multiplicative, [Token::Plus => Token::Plus, Token::Minus => Token::Minus]);
left_assoc_level!(
    parse_multiplicative,
    parse_unary,
    [Token::Asterisk => Token::Asterisk, Token::Slash => Token::Slash, Token::Percent => Token::Percent]
);

fn parse_logical_and(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    let mut left = parse_bitor(interp, lex, run)?;
    loop {
        if peek(interp, lex)? != Token::LogicalAnd {
            return Ok(left);
        }
        next(interp, lex)?;
        // Only a value actually feeding `&&` needs a truthiness test: a
        // plain `parse_bitor` result (e.g. a string-literal `printf`
        // argument) is never forced through `truthy`.
        let left_true = if run { truthy(interp, lex, &left.to_value(interp)?)? } else { false };
        // Short-circuits: once the left operand is known false, the right
        // is scanned but not evaluated for effect.
        let rhs_run = run && left_true;
        let right = parse_bitor(interp, lex, rhs_run)?;
        if run {
            let right_true = if rhs_run { truthy(interp, lex, &right.to_value(interp)?)? } else { false };
            left = Place::RValue(bool_value(interp, left_true && right_true));
        } else {
            left = Place::RValue(dummy_value(interp));
        }
    }
}

fn parse_logical_or(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    let mut left = parse_logical_and(interp, lex, run)?;
    loop {
        if peek(interp, lex)? != Token::LogicalOr {
            return Ok(left);
        }
        next(interp, lex)?;
        let left_true = if run { truthy(interp, lex, &left.to_value(interp)?)? } else { false };
        let rhs_run = run && !left_true;
        let right = parse_logical_and(interp, lex, rhs_run)?;
        if run {
            let right_true = if rhs_run { truthy(interp, lex, &right.to_value(interp)?)? } else { false };
            left = Place::RValue(bool_value(interp, left_true || right_true));
        } else {
            left = Place::RValue(dummy_value(interp));
        }
    }
}

fn parse_unary(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    match peek(interp, lex)? {
        Token::Plus => {
            next(interp, lex)?;
            parse_unary(interp, lex, run)
        }
        Token::Minus => {
            next(interp, lex)?;
            let v = parse_unary(interp, lex, run)?;
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            let val = v.to_value(interp)?;
            Ok(Place::RValue(match val.payload {
                Payload::Int(i) => Value::transient(val.ty, Payload::Int(-i)),
                Payload::Float(f) => Value::transient(val.ty, Payload::Float(-f)),
                Payload::Char(c) => Value::transient(interp.types.int, Payload::Int(-(c as i32))),
                _ => return Err(semantic_err(interp, lex, "unary '-' on a non-numeric value")),
            }))
        }
        Token::LogicalNot => {
            next(interp, lex)?;
            let v = parse_unary(interp, lex, run)?;
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            let t = truthy(interp, lex, &v.to_value(interp)?)?;
            Ok(Place::RValue(bool_value(interp, !t)))
        }
        Token::Tilde => {
            next(interp, lex)?;
            let v = parse_unary(interp, lex, run)?;
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            match v.to_value(interp)?.payload {
                Payload::Int(i) => Ok(Place::RValue(int_value(interp, !i))),
                _ => Err(semantic_err(interp, lex, "unary '~' on a non-integer value")),
            }
        }
        Token::Asterisk => {
            next(interp, lex)?;
            let v = parse_unary(interp, lex, run)?;
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            match v.to_value(interp)?.payload {
                Payload::Pointer(p) => Ok(Place::LValue(deref_pointer(interp, p, 0)?)),
                _ => Err(semantic_err(interp, lex, "'*' applied to a non-pointer value")),
            }
        }
        Token::Ampersand => {
            next(interp, lex)?;
            let v = parse_unary(interp, lex, run)?;
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            let lv = v.as_lvalue(interp)?;
            let pointee_ty = read_lvalue(interp, lv)?.ty;
            Ok(Place::RValue(address_of(interp, lv, pointee_ty)))
        }
        Token::Increment | Token::Decrement => {
            let tok = peek(interp, lex)?;
            next(interp, lex)?;
            let v = parse_unary(interp, lex, run)?;
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            let lv = v.as_lvalue(interp)?;
            let cur = read_lvalue(interp, lv)?;
            let op = if tok == Token::Increment { Token::Plus } else { Token::Minus };
            let updated = apply_binop(interp, lex, op, cur, int_value(interp, 1))?;
            let coerced = coerce(interp, lex, cur.ty, updated)?;
            write_lvalue(interp, lv, coerced)?;
            Ok(Place::LValue(lv))
        }
        _ => parse_postfix(interp, lex, run),
    }
}

fn parse_postfix(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    let mut place = parse_primary(interp, lex, run)?;
    loop {
        match peek(interp, lex)? {
            Token::LeftBracket => {
                next(interp, lex)?;
                let index_place = parse_expression(interp, lex, run)?;
                expect(interp, lex, Token::RightBracket)?;
                if !run {
                    place = Place::RValue(dummy_value(interp));
                    continue;
                }
                let index = match index_place.to_value(interp)?.payload {
                    Payload::Int(i) => i as i64,
                    Payload::Char(c) => c as i64,
                    _ => return Err(semantic_err(interp, lex, "array index must be an integer")),
                };
                place = index_into(interp, lex, place, index)?;
            }
            Token::Increment | Token::Decrement => {
                let tok = peek(interp, lex)?;
                next(interp, lex)?;
                if !run {
                    continue;
                }
                let lv = place.as_lvalue(interp)?;
                let cur = read_lvalue(interp, lv)?;
                let op = if tok == Token::Increment { Token::Plus } else { Token::Minus };
                let updated = apply_binop(interp, lex, op, cur, int_value(interp, 1))?;
                let coerced = coerce(interp, lex, cur.ty, updated)?;
                write_lvalue(interp, lv, coerced)?;
                place = Place::RValue(cur);
            }
            Token::Dot | Token::Arrow => {
                // structs/unions are out of scope; recognized only so the
                // grammar doesn't choke on the token, per the non-goals.
                return Err(semantic_err(interp, lex, "member access is not supported (no struct/union support)"));
            }
            _ => return Ok(place),
        }
    }
}

fn index_into(interp: &mut Interpreter, lex: &mut LexState, base: Place, index: i64) -> Result<Place, InterpError> {
    match base {
        Place::LValue(Lvalue::Var(vref)) => {
            let v = *interp.values.get(vref);
            match v.payload {
                Payload::Array { .. } => Ok(Place::LValue(Lvalue::Element { array: vref, index })),
                Payload::Pointer(p) => Ok(Place::LValue(deref_pointer(interp, p, index)?)),
                _ => Err(semantic_err(interp, lex, "indexing a non-array, non-pointer value")),
            }
        }
        Place::RValue(v) => match v.payload {
            Payload::Pointer(p) => Ok(Place::LValue(deref_pointer(interp, p, index)?)),
            _ => Err(semantic_err(interp, lex, "indexing a non-array, non-pointer value")),
        },
        Place::LValue(Lvalue::Element { .. }) => Err(semantic_err(interp, lex, "cannot index a scalar")),
    }
}

fn parse_call_args(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Vec<Value>, InterpError> {
    expect(interp, lex, Token::LeftParen)?;
    let mut args = Vec::new();
    if peek(interp, lex)? != Token::RightParen {
        loop {
            let place = parse_assignment(interp, lex, run)?;
            if run {
                if args.len() >= interp.config.parameter_max {
                    return Err(semantic_err(
                        interp,
                        lex,
                        format!("too many arguments in call (max {})", interp.config.parameter_max),
                    ));
                }
                args.push(place.to_value(interp)?);
            }
            if peek(interp, lex)? == Token::Comma {
                next(interp, lex)?;
            } else {
                break;
            }
        }
    }
    expect(interp, lex, Token::RightParen)?;
    Ok(args)
}

fn parse_primary(interp: &mut Interpreter, lex: &mut LexState, run: bool) -> Result<Place, InterpError> {
    match next(interp, lex)? {
        (Token::IntegerConstant, TokenPayload::Int(v)) => Ok(Place::RValue(int_value(interp, v as i32))),
        (Token::FpConstant, TokenPayload::Float(v)) => Ok(Place::RValue(Value::transient(interp.types.fp, Payload::Float(v)))),
        (Token::CharacterConstant, TokenPayload::Char(c)) => Ok(Place::RValue(Value::transient(interp.types.char_, Payload::Char(c)))),
        (Token::StringConstant, TokenPayload::Str(raw)) => {
            if !run {
                return Ok(Place::RValue(dummy_value(interp)));
            }
            let unescaped = crate::lexer::unescape(raw.bytes(&interp.sources));
            let offset = interp.heap.alloc(unescaped.len().max(1))?;
            interp.heap.write_bytes(offset, &unescaped);
            Ok(Place::RValue(Value::transient(
                interp.types.string,
                Payload::Str(crate::value::HeapSlice { offset, len: unescaped.len() as u32 }),
            )))
        }
        (Token::LeftParen, _) => {
            let inner = parse_expression(interp, lex, run)?;
            expect(interp, lex, Token::RightParen)?;
            Ok(inner)
        }
        (Token::Identifier, TokenPayload::Ident(name)) => parse_identifier_expr(interp, lex, name, run),
        (got, _) => Err(syntax_err(interp, lex, format!("unexpected token {got:?} in expression"))),
    }
}

fn parse_identifier_expr(interp: &mut Interpreter, lex: &mut LexState, name: SourceSlice, run: bool) -> Result<Place, InterpError> {
    if peek(interp, lex)? != Token::LeftParen {
        if !run {
            return Ok(Place::RValue(dummy_value(interp)));
        }
        let vref = interp
            .lookup(&name)
            .ok_or_else(|| semantic_err(interp, lex, format!("undeclared identifier '{}'", name.as_str_lossy(&interp.sources))))?;
        return Ok(Place::LValue(Lvalue::Var(vref)));
    }

    // Call syntax. In skip mode we don't require the callee to exist: just
    // consume a generically-shaped argument list.
    if !run {
        parse_call_args(interp, lex, false)?;
        return Ok(Place::RValue(dummy_value(interp)));
    }

    let vref = interp
        .lookup(&name)
        .ok_or_else(|| semantic_err(interp, lex, format!("call to undeclared '{}'", name.as_str_lossy(&interp.sources))))?;
    let callee = *interp.values.get(vref);
    match callee.payload {
        Payload::Macro(mac) => expand_macro(interp, lex, mac, true),
        Payload::Function(func) => {
            let args = parse_call_args(interp, lex, true)?;
            Ok(Place::RValue(call_function(interp, lex, func, args)?))
        }
        Payload::Intrinsic(intr) => {
            let args = parse_call_args(interp, lex, true)?;
            let entry_idx = intr.id as usize;
            if args.len() != interp.intrinsics[entry_idx].param_types.len() {
                return Err(semantic_err(
                    interp,
                    lex,
                    format!(
                        "wrong argument count calling '{}': expected {}, found {}",
                        interp.intrinsics[entry_idx].name,
                        interp.intrinsics[entry_idx].param_types.len(),
                        args.len()
                    ),
                ));
            }
            let dispatch = interp.intrinsics[entry_idx].dispatch;
            let call_loc = loc(interp, lex);
            let result = dispatch(interp, &args, &call_loc)?;
            Ok(Place::RValue(result))
        }
        _ => Err(semantic_err(interp, lex, format!("'{}' is not callable", name.as_str_lossy(&interp.sources)))),
    }
}

// ---------------------------------------------------------------------
// Binary operator application with the documented implicit conversions
// ---------------------------------------------------------------------

fn apply_binop(interp: &mut Interpreter, lex: &LexState, op: Token, l: Value, r: Value) -> Result<Value, InterpError> {
    // Pointer arithmetic: `ptr + int` / `ptr - int`, scaled by pointee size.
    if let (Payload::Pointer(p), Payload::Int(i)) = (l.payload, r.payload) {
        if matches!(op, Token::Plus | Token::Minus) {
            let delta = if op == Token::Plus { i as i64 } else { -(i as i64) };
            return Ok(Value::transient(l.ty, Payload::Pointer(PointerValue { target: p.target, offset: p.offset + delta })));
        }
    }
    if let (Payload::Int(i), Payload::Pointer(p)) = (l.payload, r.payload) {
        if op == Token::Plus {
            return Ok(Value::transient(r.ty, Payload::Pointer(PointerValue { target: p.target, offset: p.offset + i as i64 })));
        }
    }

    match op {
        Token::Equal | Token::NotEqual | Token::LessThan | Token::LessEqual | Token::GreaterThan | Token::GreaterEqual => {
            return compare(interp, lex, op, l, r);
        }
        _ => {}
    }

    // Bitwise ops require integers; char promotes to int.
    if matches!(op, Token::Ampersand | Token::Pipe | Token::Caret) {
        let li = as_int(interp, lex, l)?;
        let ri = as_int(interp, lex, r)?;
        let v = match op {
            Token::Ampersand => li & ri,
            Token::Pipe => li | ri,
            Token::Caret => li ^ ri,
            _ => unreachable!(),
        };
        return Ok(int_value(interp, v));
    }

    // If either operand is `fp`, the other promotes to `fp`.
    if matches!(l.payload, Payload::Float(_)) || matches!(r.payload, Payload::Float(_)) {
        let lf = as_float(interp, lex, l)?;
        let rf = as_float(interp, lex, r)?;
        let v = match op {
            Token::Plus => lf + rf,
            Token::Minus => lf - rf,
            Token::Asterisk => lf * rf,
            Token::Slash => {
                if rf == 0.0 {
                    return Err(runtime_err(interp, lex, "floating-point division by zero"));
                }
                lf / rf
            }
            _ => return Err(semantic_err(interp, lex, "unsupported operator on floating-point operands")),
        };
        return Ok(Value::transient(interp.types.fp, Payload::Float(v)));
    }

    let li = as_int(interp, lex, l)?;
    let ri = as_int(interp, lex, r)?;
    let v = match op {
        Token::Plus => li.wrapping_add(ri),
        Token::Minus => li.wrapping_sub(ri),
        Token::Asterisk => li.wrapping_mul(ri),
        Token::Slash => {
            if ri == 0 {
                return Err(runtime_err(interp, lex, "division by zero"));
            }
            li.wrapping_div(ri)
        }
        Token::Percent => {
            if ri == 0 {
                return Err(runtime_err(interp, lex, "division by zero"));
            }
            li.wrapping_rem(ri)
        }
        _ => return Err(semantic_err(interp, lex, format!("unsupported operator {op:?}"))),
    };
    Ok(int_value(interp, v))
}

fn apply_ordering(op: Token, ordering: std::cmp::Ordering) -> bool {
    match op {
        Token::Equal => ordering == std::cmp::Ordering::Equal,
        Token::NotEqual => ordering != std::cmp::Ordering::Equal,
        Token::LessThan => ordering == std::cmp::Ordering::Less,
        Token::LessEqual => ordering != std::cmp::Ordering::Greater,
        Token::GreaterThan => ordering == std::cmp::Ordering::Greater,
        Token::GreaterEqual => ordering != std::cmp::Ordering::Less,
        _ => unreachable!(),
    }
}

/// Swaps the operand order of a relational operator, for reusing a
/// `pointer op int` routine when the pointer is the right operand.
fn mirror_op(op: Token) -> Token {
    match op {
        Token::LessThan => Token::GreaterThan,
        Token::GreaterThan => Token::LessThan,
        Token::LessEqual => Token::GreaterEqual,
        Token::GreaterEqual => Token::LessEqual,
        other => other,
    }
}

/// Orders two pointer values: same segment, compare by offset; otherwise
/// the null pointer (`Raw(0)`, offset 0) is ordered below every non-null
/// pointer so `p == 0`/`p != 0` never has to fatal, and two unrelated
/// non-null pointers are simply unequal (direction is unspecified, as in
/// C itself).
fn pointer_ordering(a: PointerValue, b: PointerValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.target, b.target) {
        (PointerTarget::Raw(x), PointerTarget::Raw(y)) => {
            (x as i64 + a.offset).cmp(&(y as i64 + b.offset))
        }
        (PointerTarget::Segment(va), PointerTarget::Segment(vb)) if va == vb => a.offset.cmp(&b.offset),
        _ => {
            let a_null = matches!(a.target, PointerTarget::Raw(0)) && a.offset == 0;
            let b_null = matches!(b.target, PointerTarget::Raw(0)) && b.offset == 0;
            match (a_null, b_null) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => Ordering::Less, // unrelated non-null pointers: merely "not equal"
            }
        }
    }
}

/// `pointer == 0` / `pointer != 0` (the ordinary C null check) and, for a
/// raw host pointer, ordering against an arbitrary integer address.
fn compare_pointer_int(interp: &Interpreter, lex: &LexState, op: Token, p: PointerValue, i: i32) -> Result<bool, InterpError> {
    if i == 0 {
        let is_null = matches!(p.target, PointerTarget::Raw(0)) && p.offset == 0;
        let ordering = if is_null { std::cmp::Ordering::Equal } else { std::cmp::Ordering::Greater };
        return Ok(apply_ordering(op, ordering));
    }
    match p.target {
        PointerTarget::Raw(addr) => {
            let ordering = (addr as i64 + p.offset).cmp(&(i as i64));
            Ok(apply_ordering(op, ordering))
        }
        PointerTarget::Segment(_) => {
            Err(semantic_err(interp, lex, "pointer into interpreted memory compared against a non-zero integer"))
        }
    }
}

fn compare(interp: &mut Interpreter, lex: &LexState, op: Token, l: Value, r: Value) -> Result<Value, InterpError> {
    match (l.payload, r.payload) {
        (Payload::Pointer(a), Payload::Pointer(b)) => {
            return Ok(bool_value(interp, apply_ordering(op, pointer_ordering(a, b))));
        }
        (Payload::Pointer(p), Payload::Int(i)) => {
            return Ok(bool_value(interp, compare_pointer_int(interp, lex, op, p, i)?));
        }
        (Payload::Int(i), Payload::Pointer(p)) => {
            return Ok(bool_value(interp, compare_pointer_int(interp, lex, mirror_op(op), p, i)?));
        }
        _ => {}
    }

    let ordering = if matches!(l.payload, Payload::Float(_)) || matches!(r.payload, Payload::Float(_)) {
        as_float(interp, lex, l)?.partial_cmp(&as_float(interp, lex, r)?)
    } else if let (Payload::Str(a), Payload::Str(b)) = (l.payload, r.payload) {
        let ab = interp.heap.read_bytes(a.offset, a.len).to_vec();
        let bb = interp.heap.read_bytes(b.offset, b.len).to_vec();
        Some(ab.cmp(&bb))
    } else {
        as_int(interp, lex, l)?.partial_cmp(&as_int(interp, lex, r)?)
    };
    let ordering = ordering.ok_or_else(|| semantic_err(interp, lex, "values are not comparable"))?;
    Ok(bool_value(interp, apply_ordering(op, ordering)))
}

fn as_int(interp: &Interpreter, lex: &LexState, v: Value) -> Result<i32, InterpError> {
    match v.payload {
        Payload::Int(i) => Ok(i),
        Payload::Char(c) => Ok(c as i32),
        Payload::Float(f) => Ok(f as i32),
        _ => Err(semantic_err(interp, lex, "expected a numeric value")),
    }
}

fn as_float(interp: &Interpreter, lex: &LexState, v: Value) -> Result<f64, InterpError> {
    match v.payload {
        Payload::Float(f) => Ok(f),
        Payload::Int(i) => Ok(i as f64),
        Payload::Char(c) => Ok(c as f64),
        _ => Err(semantic_err(interp, lex, "expected a numeric value")),
    }
}

