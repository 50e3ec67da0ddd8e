//! Host-literal parser: accepted grammar, rejected input, error offsets

use matbridge_codec::{LiteralError, parse};
use matbridge_core::{ArrayData, Complex64, Mapping, MapKey, NdArray, Scalar, Value};

fn ok(text: &str) -> Value {
    match parse(text) {
        Ok(v) => v,
        Err(e) => panic!("failed to parse {:?}: {}", text, e),
    }
}

fn err(text: &str) -> LiteralError {
    match parse(text) {
        Ok(v) => panic!("{:?} unexpectedly parsed as {:?}", text, v),
        Err(e) => e,
    }
}

#[test]
fn test_constants() {
    assert_eq!(ok("None"), Value::Null);
    assert_eq!(ok("True"), Value::Bool(true));
    assert_eq!(ok("False"), Value::Bool(false));
    assert!(matches!(ok("nan"), Value::Float(x) if x.is_nan()));
    assert_eq!(ok("np.inf"), Value::Float(f64::INFINITY));
    assert_eq!(ok("-inf"), Value::Float(f64::NEG_INFINITY));
}

#[test]
fn test_integers() {
    assert_eq!(ok("42"), Value::Int(42));
    assert_eq!(ok("-7"), Value::Int(-7));
    assert_eq!(ok("1_000_000"), Value::Int(1_000_000));
    assert_eq!(ok("0xff"), Value::Int(255));
    assert_eq!(ok("-9223372036854775808"), Value::Int(i64::MIN));
    assert!(err("9223372036854775808").message.contains("out of range"));
}

#[test]
fn test_floats_and_calls() {
    assert_eq!(ok("2.5"), Value::Float(2.5));
    assert_eq!(ok("1e-3"), Value::Float(0.001));
    assert_eq!(ok("float('inf')"), Value::Float(f64::INFINITY));
    assert_eq!(ok("float('-inf')"), Value::Float(f64::NEG_INFINITY));
    assert!(matches!(ok("float('nan')"), Value::Float(x) if x.is_nan()));
    assert_eq!(ok("float(3)"), Value::Float(3.0));
}

#[test]
fn test_complex() {
    assert_eq!(ok("1j"), Value::Complex(Complex64::new(0.0, 1.0)));
    assert_eq!(ok("(1+2j)"), Value::Complex(Complex64::new(1.0, 2.0)));
    assert_eq!(ok("-1.5-2j"), Value::Complex(Complex64::new(-1.5, -2.0)));
    assert_eq!(
        ok("complex(float('inf'), 1.0)"),
        Value::Complex(Complex64::new(f64::INFINITY, 1.0))
    );
    assert_eq!(ok("complex(3)"), Value::Complex(Complex64::new(3.0, 0.0)));
    assert!(matches!(ok("(1+infj)"), Value::Complex(c) if c.im.is_infinite()));
}

#[test]
fn test_strings() {
    assert_eq!(ok("'abc'"), Value::str("abc"));
    assert_eq!(ok(r#""it's""#), Value::str("it's"));
    assert_eq!(ok(r"'a\nb'"), Value::str("a\nb"));
    assert_eq!(ok(r"r'a\nb'"), Value::str(r"a\nb"));
    assert_eq!(ok("'ab' \"cd\" 'e'"), Value::str("abcde"));
    assert_eq!(ok(r"'é'"), Value::str("é"));
}

#[test]
fn test_containers() {
    assert_eq!(
        ok("[1, 2.5, 'x', None]"),
        Value::Seq(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::str("x"),
            Value::Null
        ])
    );
    assert_eq!(ok("[]"), Value::Seq(vec![]));
    assert_eq!(ok("(1,)"), Value::Seq(vec![Value::Int(1)]));
    assert_eq!(ok("()"), Value::Seq(vec![]));
    assert_eq!(ok("(1)"), Value::Int(1));
    assert_eq!(ok("[1, 2,]"), Value::Seq(vec![Value::Int(1), Value::Int(2)]));
    assert_eq!(
        ok("{1, 2, 2}"),
        Value::Set(vec![Value::Int(1), Value::Int(2)])
    );
    assert_eq!(ok("set()"), Value::Set(vec![]));
    assert_eq!(ok("{}"), Value::Map(Mapping::new()));
}

#[test]
fn test_dicts() {
    assert_eq!(
        ok("{'a': 1, 'b': [True]}"),
        Value::map([
            ("a", Value::Int(1)),
            ("b", Value::Seq(vec![Value::Bool(true)]))
        ])
    );
    assert_eq!(
        ok("dict(a=1, b='x')"),
        Value::map([("a", Value::Int(1)), ("b", Value::str("x"))])
    );

    let mut keyed = Mapping::new();
    keyed.insert(MapKey::Int(1), Value::str("one"));
    keyed.insert(MapKey::Bool(true), Value::Null);
    assert_eq!(ok("{1: 'one', True: None}"), Value::Map(keyed));

    assert!(err("{[1]: 2}").message.contains("unhashable"));
}

#[test]
fn test_numpy_arrays() {
    let a = ok("np.array([[1, 2], [3, 4]], dtype='int32')");
    assert_eq!(
        a,
        Value::Array(NdArray::new(vec![2, 2], ArrayData::Int32(vec![1, 2, 3, 4])).unwrap())
    );

    let m = ok("np.matrix([[1.5, 2.5]])");
    assert_eq!(
        m,
        Value::Matrix(NdArray::new(vec![1, 2], ArrayData::Float64(vec![1.5, 2.5])).unwrap())
    );

    let b = ok("np.array([True, False], dtype=np.bool_)");
    assert_eq!(
        b,
        Value::Array(NdArray::vector(ArrayData::Bool(vec![true, false])))
    );

    let empty = ok("np.array([])");
    assert_eq!(empty, Value::Array(NdArray::vector(ArrayData::Float64(vec![]))));

    let vector_matrix = ok("numpy.matrix([1, 2])");
    assert!(matches!(vector_matrix, Value::Matrix(ref m) if m.shape() == [1, 2]));

    assert!(err("np.array([[1, 2], [3]])").message.contains("rectangular"));
    assert!(err("np.array(['a'])").message.contains("numbers"));
    assert!(err("np.array([1], dtype='object')").message.contains("dtype"));
}

#[test]
fn test_numpy_scalars() {
    assert_eq!(ok("np.int8(-5)"), Value::Scalar(Scalar::Int8(-5)));
    assert_eq!(ok("np.float32(1.5)"), Value::Scalar(Scalar::Float32(1.5)));
    assert_eq!(ok("np.uint64(7)"), Value::Scalar(Scalar::UInt64(7)));
    assert_eq!(ok("np.bool_(1)"), Value::Bool(true));
    assert_eq!(ok("-np.int16(4)"), Value::Scalar(Scalar::Int16(-4)));
    assert!(err("np.uint8(300)").message.contains("uint8"));
}

#[test]
fn test_rejects_arbitrary_code() {
    assert!(err("__import__('os').system('ls')").message.contains("not allowed"));
    assert!(err("open('/etc/passwd')").message.contains("not allowed"));
    assert!(err("x").message.contains("not allowed"));
    assert!(err("1 + 2").message.contains("imaginary"));
    assert!(err("[1] * 3").message.contains("unexpected character"));
    assert!(err("'a'.upper()").message.contains("trailing"));
}

#[test]
fn test_unsupported_marker() {
    let e = err("unsupported('function_handle')");
    assert!(e.message.contains("function_handle"));
    assert_eq!(e.offset, 0);
}

#[test]
fn test_staged_reads_need_a_loader() {
    let e = err("sio.loadmat('/tmp/x.mat')['obj']");
    assert!(e.message.contains("not readable"));
    let e = err("pd.read_csv('/tmp/x.csv')");
    assert!(e.message.contains("not readable"));
}

#[test]
fn test_error_offsets() {
    assert_eq!(err("[1, 2").offset, 5);
    assert_eq!(err("1 2").offset, 2);
    assert_eq!(err("").offset, 0);
    assert_eq!(err("[1, foo]").offset, 4);
}

#[test]
fn test_deep_nesting_is_bounded() {
    let text = format!("{}{}", "[".repeat(500), "]".repeat(500));
    assert!(err(&text).message.contains("nested"));
}

#[test]
fn test_sign_chain_is_bounded() {
    let text = format!("{}1", "-".repeat(100_000));
    assert!(err(&text).message.contains("nested"));

    let text = format!("{}1", "+".repeat(100_000));
    assert!(err(&text).message.contains("nested"));

    // Short chains still fold
    assert_eq!(ok("--1"), Value::Int(1));
    assert_eq!(ok("-+-2.5"), Value::Float(2.5));
}

#[test]
fn test_display_parses_back() {
    let values = vec![
        Value::Null,
        Value::Int(-3),
        Value::Float(0.1),
        Value::Float(f64::NEG_INFINITY),
        Value::Complex(Complex64::new(2.0, -3.5)),
        Value::str("it's a\ttab"),
        Value::Seq(vec![Value::Bool(true), Value::str("x")]),
        Value::set(vec![Value::Int(1), Value::Int(2)]),
        Value::set(vec![]),
        Value::map([("a", Value::Int(1)), ("b", Value::Seq(vec![]))]),
        Value::Scalar(Scalar::UInt16(9)),
        Value::Matrix(NdArray::new(vec![2, 2], ArrayData::Int32(vec![1, 2, 3, 4])).unwrap()),
        Value::Array(NdArray::new(vec![2, 1], ArrayData::Float64(vec![1.5, -2.0])).unwrap()),
        Value::Array(NdArray::vector(ArrayData::Float32(vec![0.5]))),
    ];
    for value in values {
        assert_eq!(ok(&value.to_string()), value, "text: {}", value);
    }
}
