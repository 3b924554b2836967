use bytebeat::error::CompileError;
use bytebeat::formula::{BytebeatCompiler, Program, ProgramCompiler};

fn amp(source: &str, t: u64) -> u8 {
    let formula = BytebeatCompiler
        .compile(source)
        .unwrap_or_else(|e| panic!("{source}: {e}"));
    (formula.evaluate(t).unwrap() & 0xFF) as u8
}

#[test]
fn test_well_known_tunes() {
    let tune = "(t*(t>>8|t>>9)&46&t>>8)^(t&t>>13|t>>6)";
    assert_eq!(amp(tune, 12345), 225);
    assert_eq!(amp(tune, 65536), 0);
    assert_eq!(amp(tune, 200000), 53);

    let tune = "t*((t>>12|t>>8)&63&t>>4)";
    assert_eq!(amp(tune, 12345), 171);
}

#[test]
fn test_literal_forms() {
    assert_eq!(amp("0xff", 0), 255);
    assert_eq!(amp("0b1010", 0), 10);
    assert_eq!(amp("2.5 * 4", 0), 10);
}

#[test]
fn test_unsigned_shift_and_power() {
    assert_eq!(amp("(t - 5) >>> 28", 0), 15);
    assert_eq!(amp("2 ** 3 ** 2", 0), 0, "2^9 = 512, low byte 0");
    assert_eq!(amp("2 ** 7", 0), 128);
}

#[test]
fn test_math_namespace_is_optional() {
    for t in [0u64, 17, 1000] {
        assert_eq!(
            amp("Math.floor(Math.sin(t) * 100)", t),
            amp("floor(sin(t) * 100)", t)
        );
    }
    assert_eq!(amp("Math.PI * 10", 0), 31);
}

#[test]
fn test_source_decorations() {
    assert_eq!(amp("// ramp\nt & 255 ;", 300), 44);
    assert_eq!(amp("t\n  // trailing note", 3), 3);
}

#[test]
fn test_compile_error_kinds() {
    assert!(matches!(
        BytebeatCompiler.compile("foo(t)"),
        Err(CompileError::UnknownFunction(_))
    ));
    assert!(matches!(
        BytebeatCompiler.compile("pow(t)"),
        Err(CompileError::Arity { expected: 2, found: 1, .. })
    ));
    assert!(matches!(
        BytebeatCompiler.compile("y"),
        Err(CompileError::UnknownIdentifier(_))
    ));
    assert!(matches!(
        BytebeatCompiler.compile("t t"),
        Err(CompileError::Syntax { .. })
    ));

    let huge = vec!["t"; 5000].join("+");
    assert!(matches!(
        BytebeatCompiler.compile(&huge),
        Err(CompileError::TooComplex(_))
    ));
}
