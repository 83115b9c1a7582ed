use crate::value::{encode, TypedValue, Value, ValueType};
use crate::{BridgeError, Result};

/// Caller-declared logical type for one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Integer,
    BigInt,
    Float,
    Decimal,
    Uuid,
    Json,
    Timestamp,
    Date,
    Bytes,
    Text,
}

/// Optional per-argument type metadata. `native` carries an explicit
/// backend type family (fixed width/signedness) and wins over the scalar
/// kind's default when present.
#[derive(Debug, Clone, Default)]
pub struct TypeHint {
    pub kind: Option<ScalarKind>,
    pub native: Option<ValueType>,
    pub nullable: bool,
    pub list: bool,
}

impl TypeHint {
    pub fn of(kind: ScalarKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn native(ty: ValueType) -> Self {
        Self {
            native: Some(ty),
            ..Default::default()
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }
}

/// One positional argument: an engine value plus optional type metadata.
#[derive(Debug, Clone)]
pub struct QueryArg {
    pub value: Value,
    pub hint: Option<TypeHint>,
}

impl QueryArg {
    pub fn plain(value: Value) -> Self {
        Self { value, hint: None }
    }

    pub fn hinted(value: Value, hint: TypeHint) -> Self {
        Self {
            value,
            hint: Some(hint),
        }
    }
}

/// Engine-agnostic parameterized query.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub args: Vec<QueryArg>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(text: impl Into<String>, args: Vec<QueryArg>) -> Self {
        Self {
            text: text.into(),
            args,
        }
    }
}

/// Backend-ready query text with named, typed parameters. Ephemeral; nothing
/// is cached across calls.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub text: String,
    pub parameters: Vec<(String, TypedValue)>,
}

enum Placeholder {
    /// `$<N>`, 1-based, stored as the argument index it references
    Ordinal(usize),
    /// `?`, consumed left to right
    Sequential,
}

/// Rewrite placeholders to synthetic `$p<k>` names and bind each occurrence
/// to an encoded typed value. Queries without placeholders pass through
/// untouched.
pub fn prepare(query: &Query) -> Result<PreparedQuery> {
    let (text, placeholders) = scan_placeholders(&query.text, query.args.len())?;
    if placeholders.is_empty() {
        return Ok(PreparedQuery {
            text,
            parameters: Vec::new(),
        });
    }

    let mut parameters = Vec::with_capacity(placeholders.len());
    let mut next_sequential = 0usize;
    for (position, placeholder) in placeholders.iter().enumerate() {
        let arg_index = match placeholder {
            Placeholder::Ordinal(index) => *index,
            Placeholder::Sequential => {
                let index = next_sequential;
                next_sequential += 1;
                index
            }
        };
        let arg = &query.args[arg_index];
        let target = resolve_type(arg.hint.as_ref(), &arg.value);
        let encoded = encode(&arg.value, &target)?;
        parameters.push((format!("$p{}", position + 1), encoded));
    }

    Ok(PreparedQuery { text, parameters })
}

/// Single left-to-right scan. The query text is opaque apart from the two
/// placeholder shapes; mixing both shapes in one query is rejected.
fn scan_placeholders(text: &str, arg_count: usize) -> Result<(String, Vec<Placeholder>)> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut placeholders = Vec::new();
    let mut saw_ordinal = false;
    let mut saw_sequential = false;
    let mut sequential_count = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'$' => {
                let digits_end = scan_digits(bytes, i + 1);
                if digits_end > i + 1 {
                    let n: usize = text[i + 1..digits_end]
                        .parse()
                        .map_err(|_| BridgeError::PlaceholderOutOfRange { index: 0, arg_count })?;
                    if n == 0 || n > arg_count {
                        return Err(BridgeError::PlaceholderOutOfRange { index: n, arg_count });
                    }
                    saw_ordinal = true;
                    placeholders.push(Placeholder::Ordinal(n - 1));
                    out.push_str(&format!("$p{}", placeholders.len()));
                    i = digits_end;
                } else {
                    out.push('$');
                    i += 1;
                }
            }
            b'?' => {
                saw_sequential = true;
                sequential_count += 1;
                placeholders.push(Placeholder::Sequential);
                out.push_str(&format!("$p{}", placeholders.len()));
                i += 1;
            }
            b => {
                // Multi-byte chars never start with b'$' or b'?', so byte
                // stepping is safe here
                let ch_len = utf8_len(b);
                out.push_str(&text[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    if saw_ordinal && saw_sequential {
        return Err(BridgeError::MixedPlaceholders);
    }
    if sequential_count > arg_count {
        return Err(BridgeError::TooManyPlaceholders {
            needed: sequential_count,
            supplied: arg_count,
        });
    }
    Ok((out, placeholders))
}

fn scan_digits(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Type resolution precedence: explicit native family, then the declared
/// scalar kind's default, then a shape-based fallback from the value itself.
fn resolve_type(hint: Option<&TypeHint>, value: &Value) -> ValueType {
    let base = hint
        .and_then(|h| h.native.clone())
        .or_else(|| hint.and_then(|h| h.kind).map(kind_default))
        .unwrap_or_else(|| infer_type(value));
    let base = if hint.map(|h| h.list).unwrap_or(false) {
        ValueType::List(Box::new(base))
    } else {
        base
    };
    if hint.map(|h| h.nullable).unwrap_or(false) {
        ValueType::Optional(Box::new(base))
    } else {
        base
    }
}

fn kind_default(kind: ScalarKind) -> ValueType {
    match kind {
        ScalarKind::Bool => ValueType::Bool,
        // Unclassified integers default to 32-bit signed
        ScalarKind::Integer => ValueType::Int32,
        // Unclassified big-integers default to 64-bit signed
        ScalarKind::BigInt => ValueType::Int64,
        ScalarKind::Float => ValueType::Float64,
        ScalarKind::Decimal => ValueType::Decimal,
        ScalarKind::Uuid => ValueType::Uuid,
        ScalarKind::Json => ValueType::Json,
        ScalarKind::Timestamp => ValueType::Timestamp,
        ScalarKind::Date => ValueType::Date,
        ScalarKind::Bytes => ValueType::Bytes,
        ScalarKind::Text => ValueType::Text,
    }
}

fn infer_type(value: &Value) -> ValueType {
    match value {
        Value::Null => ValueType::Int32, // Default
        Value::Bool(_) => ValueType::Bool,
        Value::Int64(v) => {
            if i32::try_from(*v).is_ok() {
                ValueType::Int32
            } else {
                ValueType::Int64
            }
        }
        Value::Float64(_) => ValueType::Float64,
        Value::Decimal(_) => ValueType::Decimal,
        Value::Text(_) => ValueType::Text,
        Value::Bytes(_) => ValueType::Bytes,
        Value::Timestamp(_) => ValueType::Timestamp,
        Value::Date(_) => ValueType::Date,
        Value::Uuid(_) => ValueType::Uuid,
        Value::Json(_) => ValueType::Json,
        Value::List(items) => {
            let item = items.first().map(infer_type).unwrap_or(ValueType::Text);
            ValueType::List(Box::new(item))
        }
    }
}
