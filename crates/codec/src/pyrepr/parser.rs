//! Recursive-descent parser over host-literal tokens

use super::lexer::{Token, TokenKind};
use super::{LiteralError, StagedLoader};
use matbridge_core::{ArrayData, Complex64, Dtype, Element, MapKey, Mapping, NdArray, Scalar, Value};

/// Deepest nesting accepted before giving up
const MAX_DEPTH: usize = 128;

/// Arguments of a whitelisted call
struct Args {
    positional: Vec<(Value, usize)>,
    keywords: Vec<(String, Value, usize)>,
    /// Offset of the callee name
    offset: usize,
}

impl Args {
    fn expect_arity(&self, name: &str, min: usize, max: usize) -> Result<(), LiteralError> {
        let n = self.positional.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(LiteralError::new(
                format!("{}() takes {} arguments, got {}", name, expected, n),
                self.offset,
            ));
        }
        Ok(())
    }

    fn no_keywords(&self, name: &str) -> Result<(), LiteralError> {
        match self.keywords.first() {
            Some((key, _, at)) => Err(LiteralError::new(
                format!("{}() got an unexpected keyword argument '{}'", name, key),
                *at,
            )),
            None => Ok(()),
        }
    }

    fn string(&self, index: usize, name: &str) -> Result<String, LiteralError> {
        match self.positional.get(index) {
            Some((Value::Str(s), _)) => Ok(s.clone()),
            Some((other, at)) => Err(LiteralError::new(
                format!("{}() expects a string, got {}", name, other.type_name()),
                *at,
            )),
            None => Err(LiteralError::new(
                format!("{}() is missing an argument", name),
                self.offset,
            )),
        }
    }

    fn dtype(&self) -> Result<Option<Dtype>, LiteralError> {
        let mut dtype = None;
        for (key, value, at) in &self.keywords {
            match (key.as_str(), value) {
                ("dtype", Value::Str(name)) => {
                    dtype = Some(Dtype::from_name(name).ok_or_else(|| {
                        LiteralError::new(format!("unknown dtype '{}'", name), *at)
                    })?);
                }
                _ => {
                    return Err(LiteralError::new(
                        format!("unexpected keyword argument '{}'", key),
                        *at,
                    ));
                }
            }
        }
        Ok(dtype)
    }
}

fn int_value(n: i128, at: usize) -> Result<Value, LiteralError> {
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| LiteralError::new(format!("integer {} is out of range", n), at))
}

/// Real and imaginary parts of a numeric value
fn complex_parts(value: &Value) -> Option<Complex64> {
    match value.as_element()? {
        Element::Bool(b) => Some(Complex64::new(if b { 1.0 } else { 0.0 }, 0.0)),
        Element::Int(n) => Some(Complex64::new(n as f64, 0.0)),
        Element::Float(x) => Some(Complex64::new(x, 0.0)),
        Element::Complex(c) => Some(c),
    }
}

fn negate(value: Value, at: usize) -> Result<Value, LiteralError> {
    let negated = match value {
        Value::Int(n) => n.checked_neg().map(Value::Int),
        Value::Bool(b) => Some(Value::Int(-(b as i64))),
        Value::Float(x) => Some(Value::Float(-x)),
        Value::Complex(c) => Some(Value::Complex(Complex64::new(-c.re, -c.im))),
        Value::Scalar(s) => {
            let element = match s.element() {
                Element::Int(n) => Element::Int(-n),
                Element::Float(x) => Element::Float(-x),
                other => other,
            };
            Scalar::from_element(s.dtype(), element).map(Value::Scalar)
        }
        other => {
            return Err(LiteralError::new(
                format!("bad operand type for unary -: {}", other.type_name()),
                at,
            ));
        }
    };
    negated.ok_or_else(|| LiteralError::new("negation overflows", at))
}

fn parse_float_text(text: &str) -> Option<f64> {
    match text.trim().to_ascii_lowercase().as_str() {
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        other => other.replace('_', "").parse().ok(),
    }
}

/// Canonical spelling of a dotted callee (`numpy.array` -> `np.array`)
fn canonical_callee(path: &str) -> String {
    for (long, short) in [("numpy.", "np."), ("scipy.io.", "sio."), ("pandas.", "pd.")] {
        if let Some(rest) = path.strip_prefix(long) {
            return format!("{}{}", short, rest);
        }
    }
    path.to_string()
}

// ============================================================================
// Array construction
// ============================================================================

/// Shape implied by the first item at every nesting level
fn nested_shape(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut current = value;
    while let Value::Seq(items) = current {
        shape.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    shape
}

fn flatten(
    value: &Value,
    shape: &[usize],
    out: &mut Vec<Element>,
    at: usize,
) -> Result<(), LiteralError> {
    match (value, shape.split_first()) {
        (Value::Seq(items), Some((&len, rest))) if items.len() == len => {
            for item in items {
                flatten(item, rest, out, at)?;
            }
            Ok(())
        }
        (Value::Seq(_), _) => Err(LiteralError::new("array data is not rectangular", at)),
        (leaf, None) => match leaf.as_element() {
            Some(element) => {
                out.push(element);
                Ok(())
            }
            None => Err(LiteralError::new(
                format!("array elements must be numbers, got {}", leaf.type_name()),
                at,
            )),
        },
        (_, Some(_)) => Err(LiteralError::new("array data is not rectangular", at)),
    }
}

fn infer_dtype(elements: &[Element]) -> Dtype {
    if elements.iter().any(|e| matches!(e, Element::Complex(_))) {
        Dtype::Complex128
    } else if elements.iter().any(|e| matches!(e, Element::Float(_))) {
        Dtype::Float64
    } else if elements.iter().any(|e| matches!(e, Element::Int(_))) {
        Dtype::Int64
    } else if elements.is_empty() {
        Dtype::Float64
    } else {
        Dtype::Bool
    }
}

fn build_array(data: Value, dtype: Option<Dtype>, at: usize) -> Result<NdArray, LiteralError> {
    let array_err = |e: matbridge_core::ArrayError| LiteralError::new(e.to_string(), at);
    match data {
        Value::Array(a) | Value::Matrix(a) => match dtype {
            Some(dtype) => a.cast(dtype).map_err(array_err),
            None => Ok(a),
        },
        other => {
            let shape = nested_shape(&other);
            let mut elements = Vec::new();
            flatten(&other, &shape, &mut elements, at)?;
            // An explicit dtype converts straight from the literal elements
            let dtype = dtype.unwrap_or_else(|| infer_dtype(&elements));
            let data = ArrayData::from_elements(dtype, &elements).map_err(array_err)?;
            NdArray::new(shape, data).map_err(array_err)
        }
    }
}

fn build_matrix(array: NdArray, at: usize) -> Result<NdArray, LiteralError> {
    let shape = match array.shape() {
        [] => vec![1, 1],
        [n] => vec![1, *n],
        [r, c] => vec![*r, *c],
        _ => return Err(LiteralError::new("matrix must be 2-dimensional", at)),
    };
    array
        .reshaped(shape)
        .map_err(|e| LiteralError::new(e.to_string(), at))
}

/// `np.<dtype>(x)`
fn typed_scalar(dtype: Dtype, value: &Value, at: usize) -> Result<Value, LiteralError> {
    let element = value.as_element().ok_or_else(|| {
        LiteralError::new(
            format!("np.{}() expects a number, got {}", dtype, value.type_name()),
            at,
        )
    })?;
    let out_of_range =
        || LiteralError::new(format!("{} cannot be represented as {}", value, dtype), at);
    match dtype {
        Dtype::Bool => Ok(Value::Bool(match element {
            Element::Bool(b) => b,
            Element::Int(n) => n != 0,
            Element::Float(x) => x != 0.0,
            Element::Complex(c) => c.re != 0.0 || c.im != 0.0,
        })),
        Dtype::Complex128 => complex_parts(value)
            .map(Value::Complex)
            .ok_or_else(out_of_range),
        dtype => Scalar::from_element(dtype, element)
            .map(Value::Scalar)
            .ok_or_else(out_of_range),
    }
}

fn iterable_items(value: Value, name: &str, at: usize) -> Result<Vec<Value>, LiteralError> {
    match value {
        Value::Seq(items) | Value::Set(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Map(map) => Ok(map.keys().map(|k| k.to_value()).collect()),
        other => Err(LiteralError::new(
            format!("{}() argument is not iterable: {}", name, other.type_name()),
            at,
        )),
    }
}

// ============================================================================
// Parser
// ============================================================================

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    /// Source length, the offset reported for errors at end of input
    end: usize,
    depth: usize,
    loader: &'a dyn StagedLoader,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, end: usize, loader: &'a dyn StagedLoader) -> Self {
        Parser {
            tokens,
            pos: 0,
            end,
            depth: 0,
            loader,
        }
    }

    /// Parse exactly one expression covering the whole input
    pub fn parse(mut self) -> Result<Value, LiteralError> {
        if self.tokens.is_empty() {
            return Err(LiteralError::new("empty input", 0));
        }
        let value = self.parse_expr()?;
        if let Some(token) = self.current_token() {
            return Err(LiteralError::new("unexpected trailing input", token.offset));
        }
        Ok(value)
    }

    fn parse_expr(&mut self) -> Result<Value, LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(LiteralError::new("literal is nested too deeply", self.offset()));
        }
        let result = self.parse_sum();
        self.depth -= 1;
        result
    }

    /// `real +/- imaginary`, the only binary form accepted
    fn parse_sum(&mut self) -> Result<Value, LiteralError> {
        let left_at = self.offset();
        let left = self.parse_unary()?;
        let sign = if self.consume_punct('+') {
            1.0
        } else if self.consume_punct('-') {
            -1.0
        } else {
            return Ok(left);
        };
        let right_at = self.offset();
        let right = self.parse_unary()?;

        let left = match &left {
            Value::Int(_) | Value::Float(_) | Value::Complex(_) => complex_parts(&left),
            _ => None,
        }
        .ok_or_else(|| {
            LiteralError::new(
                format!("left operand must be a number, got {}", left.type_name()),
                left_at,
            )
        })?;
        let Value::Complex(right) = right else {
            return Err(LiteralError::new(
                "right operand must be an imaginary number",
                right_at,
            ));
        };
        Ok(Value::Complex(Complex64::new(
            left.re + sign * right.re,
            left.im + sign * right.im,
        )))
    }

    fn parse_unary(&mut self) -> Result<Value, LiteralError> {
        let at = self.offset();
        if self.consume_punct('-') {
            // Negate integer literals before narrowing so i64::MIN parses
            if let Some(TokenKind::Int(n)) = self.peek_kind(0) {
                let n = *n;
                self.pos += 1;
                return int_value(-n, at);
            }
            let value = self.parse_operand()?;
            return negate(value, at);
        }
        if self.consume_punct('+') {
            let value = self.parse_operand()?;
            if value.as_element().is_none() {
                return Err(LiteralError::new(
                    format!("bad operand type for unary +: {}", value.type_name()),
                    at,
                ));
            }
            return Ok(value);
        }
        self.parse_atom()
    }

    /// Operand of a unary sign; sign chains count against the nesting limit
    fn parse_operand(&mut self) -> Result<Value, LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(LiteralError::new("literal is nested too deeply", self.offset()));
        }
        let result = self.parse_unary();
        self.depth -= 1;
        result
    }

    fn parse_atom(&mut self) -> Result<Value, LiteralError> {
        let Some(token) = self.advance_token() else {
            return Err(LiteralError::new("unexpected end of input", self.end));
        };
        let at = token.offset;
        match token.kind {
            TokenKind::Int(n) => int_value(n, at),
            TokenKind::Float(x) => Ok(Value::Float(x)),
            TokenKind::Imag(x) => Ok(Value::Complex(Complex64::new(0.0, x))),
            TokenKind::Str(mut s) => {
                // Adjacent literals concatenate
                while let Some(TokenKind::Str(next)) = self.peek_kind(0) {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Value::Str(s))
            }
            TokenKind::Punct('(') => self.parse_tuple(),
            TokenKind::Punct('[') => Ok(Value::Seq(self.parse_items(']')?)),
            TokenKind::Punct('{') => self.parse_braces(),
            TokenKind::Name(name) => self.parse_name(name, at),
            TokenKind::Punct(c) => Err(LiteralError::new(format!("unexpected '{}'", c), at)),
        }
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed
    fn parse_items(&mut self, close: char) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        loop {
            if self.consume_punct(close) {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            if self.consume_punct(close) {
                return Ok(items);
            }
            self.expect_punct(',')?;
        }
    }

    fn parse_tuple(&mut self) -> Result<Value, LiteralError> {
        if self.consume_punct(')') {
            return Ok(Value::Seq(Vec::new()));
        }
        let first = self.parse_expr()?;
        if self.consume_punct(')') {
            return Ok(first);
        }
        self.expect_punct(',')?;
        let mut items = vec![first];
        items.extend(self.parse_items(')')?);
        Ok(Value::Seq(items))
    }

    fn parse_braces(&mut self) -> Result<Value, LiteralError> {
        if self.consume_punct('}') {
            return Ok(Value::Map(Mapping::new()));
        }
        let key_at = self.offset();
        let first = self.parse_expr()?;
        if !self.consume_punct(':') {
            // A set display
            let mut items = vec![first];
            if !self.consume_punct('}') {
                self.expect_punct(',')?;
                items.extend(self.parse_items('}')?);
            }
            return Ok(Value::set(items));
        }

        let mut map = Mapping::new();
        let mut key = (first, key_at);
        loop {
            let value = self.parse_expr()?;
            let map_key = MapKey::from_value(&key.0).ok_or_else(|| {
                LiteralError::new(
                    format!("unhashable dict key of type {}", key.0.type_name()),
                    key.1,
                )
            })?;
            map.insert(map_key, value);
            if self.consume_punct('}') {
                return Ok(Value::Map(map));
            }
            self.expect_punct(',')?;
            if self.consume_punct('}') {
                return Ok(Value::Map(map));
            }
            let at = self.offset();
            key = (self.parse_expr()?, at);
            self.expect_punct(':')?;
        }
    }

    fn parse_name(&mut self, first: String, at: usize) -> Result<Value, LiteralError> {
        let mut path = first;
        while self.consume_punct('.') {
            match self.advance_token() {
                Some(Token {
                    kind: TokenKind::Name(part),
                    ..
                }) => {
                    path.push('.');
                    path.push_str(&part);
                }
                Some(token) => {
                    return Err(LiteralError::new("expected a name after '.'", token.offset));
                }
                None => return Err(LiteralError::new("expected a name after '.'", self.end)),
            }
        }
        let path = canonical_callee(&path);

        if self.check_punct('(') {
            let args = self.parse_args(at)?;
            return self.call(&path, args);
        }
        let value = match path.as_str() {
            "None" => Value::Null,
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            "nan" | "np.nan" | "math.nan" => Value::Float(f64::NAN),
            "inf" | "np.inf" | "math.inf" => Value::Float(f64::INFINITY),
            "nanj" => Value::Complex(Complex64::new(0.0, f64::NAN)),
            "infj" => Value::Complex(Complex64::new(0.0, f64::INFINITY)),
            other => {
                return Err(LiteralError::new(
                    format!("name '{}' is not allowed", other),
                    at,
                ));
            }
        };
        Ok(value)
    }

    /// Dtype given as a string or a (dotted) name, returned as its name
    fn parse_dtype_spec(&mut self) -> Result<Value, LiteralError> {
        let at = self.offset();
        match self.advance_token() {
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(Value::Str(s)),
            Some(Token {
                kind: TokenKind::Name(mut name),
                ..
            }) => {
                while self.consume_punct('.') {
                    match self.advance_token() {
                        Some(Token {
                            kind: TokenKind::Name(part),
                            ..
                        }) => name = part,
                        _ => return Err(LiteralError::new("invalid dtype", at)),
                    }
                }
                Ok(Value::Str(name))
            }
            _ => Err(LiteralError::new("invalid dtype", at)),
        }
    }

    fn parse_args(&mut self, callee_at: usize) -> Result<Args, LiteralError> {
        self.expect_punct('(')?;
        let mut args = Args {
            positional: Vec::new(),
            keywords: Vec::new(),
            offset: callee_at,
        };
        loop {
            if self.consume_punct(')') {
                return Ok(args);
            }
            let at = self.offset();
            let keyword = match (self.peek_kind(0), self.peek_kind(1)) {
                (Some(TokenKind::Name(name)), Some(TokenKind::Punct('='))) => Some(name.clone()),
                _ => None,
            };
            match keyword {
                Some(name) => {
                    self.pos += 2;
                    let value = if name == "dtype" {
                        self.parse_dtype_spec()?
                    } else {
                        self.parse_expr()?
                    };
                    args.keywords.push((name, value, at));
                }
                None => {
                    if !args.keywords.is_empty() {
                        return Err(LiteralError::new(
                            "positional argument follows keyword argument",
                            at,
                        ));
                    }
                    let value = self.parse_expr()?;
                    args.positional.push((value, at));
                }
            }
            if self.consume_punct(')') {
                return Ok(args);
            }
            self.expect_punct(',')?;
        }
    }

    fn call(&mut self, name: &str, args: Args) -> Result<Value, LiteralError> {
        let at = args.offset;
        match name {
            "complex" => {
                args.no_keywords(name)?;
                args.expect_arity(name, 0, 2)?;
                // complex(a, b) == a + b*1j, also for complex a and b
                let mut result = Complex64::new(0.0, 0.0);
                for (i, (value, value_at)) in args.positional.iter().enumerate() {
                    let c = complex_parts(value).ok_or_else(|| {
                        LiteralError::new(
                            format!(
                                "complex() argument must be a number, not {}",
                                value.type_name()
                            ),
                            *value_at,
                        )
                    })?;
                    if i == 0 {
                        result.re += c.re;
                        result.im += c.im;
                    } else {
                        result.re -= c.im;
                        result.im += c.re;
                    }
                }
                Ok(Value::Complex(result))
            }
            "float" => {
                args.no_keywords(name)?;
                args.expect_arity(name, 0, 1)?;
                let Some((value, value_at)) = args.positional.first() else {
                    return Ok(Value::Float(0.0));
                };
                let x = match value {
                    Value::Str(s) => parse_float_text(s),
                    other => match other.as_element() {
                        Some(Element::Bool(b)) => Some(if b { 1.0 } else { 0.0 }),
                        Some(Element::Int(n)) => Some(n as f64),
                        Some(Element::Float(x)) => Some(x),
                        Some(Element::Complex(_)) | None => None,
                    },
                };
                x.map(Value::Float).ok_or_else(|| {
                    LiteralError::new(
                        format!("could not convert {} to float", value),
                        *value_at,
                    )
                })
            }
            "set" | "tuple" | "list" => {
                args.no_keywords(name)?;
                args.expect_arity(name, 0, 1)?;
                let items = match args.positional.into_iter().next() {
                    Some((value, value_at)) => iterable_items(value, name, value_at)?,
                    None => Vec::new(),
                };
                Ok(if name == "set" {
                    Value::set(items)
                } else {
                    Value::Seq(items)
                })
            }
            "dict" => {
                args.expect_arity(name, 0, 1)?;
                let mut map = match args.positional.into_iter().next() {
                    Some((Value::Map(map), _)) => map,
                    Some((other, value_at)) => {
                        return Err(LiteralError::new(
                            format!("dict() expects a mapping, got {}", other.type_name()),
                            value_at,
                        ));
                    }
                    None => Mapping::new(),
                };
                for (key, value, _) in args.keywords {
                    map.insert(MapKey::Str(key), value);
                }
                Ok(Value::Map(map))
            }
            "np.array" | "np.asarray" | "array" => {
                args.expect_arity(name, 1, 1)?;
                let dtype = args.dtype()?;
                let data = args.positional.into_iter().next().map(|(v, _)| v);
                let array = build_array(data.unwrap_or(Value::Null), dtype, at)?;
                Ok(Value::Array(array))
            }
            "np.matrix" | "matrix" => {
                args.expect_arity(name, 1, 1)?;
                let dtype = args.dtype()?;
                let data = args.positional.into_iter().next().map(|(v, _)| v);
                let array = build_array(data.unwrap_or(Value::Null), dtype, at)?;
                Ok(Value::Matrix(build_matrix(array, at)?))
            }
            "sio.loadmat" | "loadmat" => {
                args.no_keywords(name)?;
                args.expect_arity(name, 1, 1)?;
                let path = args.string(0, name)?;
                self.expect_punct('[')?;
                let var_at = self.offset();
                let var = match self.advance_token() {
                    Some(Token {
                        kind: TokenKind::Str(s),
                        ..
                    }) => s,
                    _ => {
                        return Err(LiteralError::new(
                            "loadmat() result must be indexed by a variable name",
                            var_at,
                        ));
                    }
                };
                self.expect_punct(']')?;
                self.loader
                    .load_mat(&path, &var)
                    .map_err(|e| LiteralError::new(e.to_string(), at))
            }
            "pd.read_csv" | "read_csv" => {
                args.no_keywords(name)?;
                args.expect_arity(name, 1, 1)?;
                let path = args.string(0, name)?;
                self.loader
                    .read_csv(&path)
                    .map(Value::Table)
                    .map_err(|e| LiteralError::new(e.to_string(), at))
            }
            "unsupported" => {
                let class = args.string(0, name)?;
                Err(LiteralError::new(
                    format!("target value of class '{}' has no host equivalent", class),
                    at,
                ))
            }
            other => {
                let dtype = other.strip_prefix("np.").and_then(Dtype::from_name);
                match dtype {
                    Some(dtype) => {
                        args.no_keywords(other)?;
                        args.expect_arity(other, 1, 1)?;
                        let (value, value_at) = &args.positional[0];
                        typed_scalar(dtype, value, *value_at)
                    }
                    None => Err(LiteralError::new(
                        format!("call to '{}' is not allowed", other),
                        at,
                    )),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------------

    fn current_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    /// Offset of the current token, or end of input
    fn offset(&self) -> usize {
        self.current_token().map(|t| t.offset).unwrap_or(self.end)
    }

    fn advance_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn check_punct(&self, c: char) -> bool {
        matches!(self.peek_kind(0), Some(TokenKind::Punct(p)) if *p == c)
    }

    fn consume_punct(&mut self, c: char) -> bool {
        if self.check_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), LiteralError> {
        if self.consume_punct(c) {
            Ok(())
        } else if self.current_token().is_none() {
            Err(LiteralError::new(
                format!("expected '{}', found end of input", c),
                self.end,
            ))
        } else {
            Err(LiteralError::new(format!("expected '{}'", c), self.offset()))
        }
    }
}
