//! Cross-module behavioral tests: the end-to-end programs and quantified
//! properties from the design, collected in one place the way the teacher
//! crate collects its own format tests.

use rstest::rstest;
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::InterpreterConfig;
use crate::intrinsics::register_defaults;
use crate::interp::Interpreter;
use crate::lexer::{LexState, Token};
use crate::parser::{parse_statement, scan_top_level};
use crate::str_slice::SourceArena;

fn make_interp() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink_buf = out.clone();
    let mut interp =
        Interpreter::new(InterpreterConfig::default(), Box::new(move |b: &[u8]| sink_buf.borrow_mut().extend_from_slice(b)));
    register_defaults(&mut interp).unwrap();
    (interp, out)
}

fn run_program(source: &str) -> String {
    let (mut interp, out) = make_interp();
    let src_id = interp.register_source_text("t.c".into(), source.as_bytes().to_vec());
    let len = interp.sources.len(src_id);
    let mut lex = LexState::new(src_id, 0, len, 1);
    scan_top_level(&mut interp, &mut lex).unwrap();
    crate::driver::run_main(&mut interp).unwrap();
    let bytes = out.borrow().clone();
    String::from_utf8(bytes).unwrap()
}

#[rstest]
#[case::arithmetic_precedence("int main(){ printf(\"%d\\n\", 2+3*4); }", "14\n")]
#[case::recursive_factorial(
    "int fact(int n){ if(n<2) return 1; return n*fact(n-1); } int main(){ printf(\"%d\\n\", fact(5)); }",
    "120\n"
)]
#[case::array_sum(
    "int main(){ int a[3]; a[0]=7; a[1]=8; a[2]=9; int s=0; int i; for(i=0;i<3;i=i+1) s=s+a[i]; printf(\"%d\\n\", s); }",
    "24\n"
)]
#[case::pointer_write("int main(){ int x=1; int *p=&x; *p=42; printf(\"%d\\n\", x); }", "42\n")]
#[case::object_like_macro("#define SQ(x) ((x)*(x))\nint main(){ printf(\"%d\\n\", SQ(3+4)); }", "49\n")]
#[case::while_with_break(
    "int main(){ int i=0; while(i<3){ if(i==1) break; i=i+1; } printf(\"%d\\n\", i); }",
    "1\n"
)]
fn end_to_end_programs(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(run_program(source), expected);
}

#[test]
fn string_constant_payload_round_trips_escape_free_bytes() {
    let mut arena = SourceArena::new();
    for body in ["hello world", "x", "", "with spaces and 123"] {
        let text = format!("\"{body}\"");
        let id = arena.register("t.c".into(), text.into_bytes());
        let len = arena.len(id);
        let mut lex = LexState::new(id, 0, len, 1);
        let (tok, payload) = lex.get_token(&arena).unwrap();
        assert_eq!(tok, Token::StringConstant);
        let crate::lexer::TokenPayload::Str(slice) = payload else {
            panic!("expected a string payload");
        };
        assert_eq!(slice.bytes(&arena), body.as_bytes());
    }
}

#[test]
fn operator_precedence_matches_math() {
    for (a, b, c) in [(1, 2, 3), (10, 0, 5), (-4, 3, 7), (0, 0, 0), (5, -2, -3)] {
        let expected = a + b * c;
        let source = format!("int main(){{ printf(\"%d\\n\", {a} + {b} * {c}); }}");
        assert_eq!(run_program(&source), format!("{expected}\n"));
    }
}

#[test]
fn loop_fixpoint_runs_body_exactly_k_times() {
    for k in 0..5 {
        let source = format!(
            "int main(){{ int i=0; int n=0; while(i<{k}){{ n=n+1; i=i+1; }} printf(\"%d\\n\", n); }}"
        );
        assert_eq!(run_program(&source), format!("{k}\n"));
    }
}

/// Parsing a statement in skip mode then in run mode leaves the lexer at
/// the same cursor position either way — control flow decisions never
/// change how much source text a statement consumes.
#[test]
fn skip_and_run_leave_the_same_cursor() {
    let (mut interp, _out) = make_interp();
    let text = "{ int x = 1; if (x) { x = x + 1; } else { x = x - 1; } }";
    let id = interp.register_source_text("t.c".into(), text.as_bytes().to_vec());
    let len = interp.sources.len(id);

    let mut skip_lex = LexState::new(id, 0, len, 1);
    parse_statement(&mut interp, &mut skip_lex, false).unwrap();

    let mut run_lex = LexState::new(id, 0, len, 1);
    interp.push_frame().unwrap();
    parse_statement(&mut interp, &mut run_lex, true).unwrap();
    interp.pop_frame();

    assert_eq!(skip_lex.pos, run_lex.pos);
}

#[test]
fn call_beyond_parameter_max_is_an_error() {
    let (mut interp, _out) = make_interp();
    interp.config.parameter_max = 2;
    let id = interp.register_source_text(
        "t.c".into(),
        b"int sum3(int a,int b,int c){ return a+b+c; } int main(){ return sum3(1,2,3); }".to_vec(),
    );
    let len = interp.sources.len(id);
    let mut lex = LexState::new(id, 0, len, 1);
    scan_top_level(&mut interp, &mut lex).unwrap();
    assert!(crate::driver::run_main(&mut interp).is_err());
}

#[test]
fn registering_beyond_max_functions_is_an_error() {
    let (mut interp, _out) = make_interp();
    interp.config.max_functions = 1;
    let id = interp.register_source_text(
        "t.c".into(),
        b"int f(){ return 1; } int g(){ return 2; } int main(){ return f(); }".to_vec(),
    );
    let len = interp.sources.len(id);
    let mut lex = LexState::new(id, 0, len, 1);
    assert!(scan_top_level(&mut interp, &mut lex).is_err());
}
