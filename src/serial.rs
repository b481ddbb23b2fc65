//! Binary encoding of compiled expressions.
//!
//! Lets a host persist compiled forms and warm a fresh [`Engine`](crate::Engine)
//! with [`Engine::preload()`](crate::Engine::preload) instead of recompiling.
//! The format is a 32-byte fixed header followed by a bincode payload.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"OOXP"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! The format version must match exactly. Decoding re-checks the structural
//! invariants of the compiled form (dense 1-based ids, every id covered once
//! by the group tree in order, one connective per multi-member group).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    CompiledExpression, Connective, Fingerprint, Group, MapKey, Operator, PNode, PathStep,
    Primitive, RecordSchema, ResolvedPath, Rhs, Schema, Subexpr,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"OOXP";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when encoding a [`CompiledExpression`] to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode compiled expression: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when decoding a [`CompiledExpression`] from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a compiled expression: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Serialized type hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedExpression {
    metadata: ExpressionMetadata,
    source: String,
    fingerprint: Fingerprint,
    subexprs: Vec<SerializedSubexpr>,
    tree: Group,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExpressionMetadata {
    subexpr_count: usize,
    source_digest: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedSubexpr {
    id: u32,
    offset: usize,
    steps: Vec<PathStep>,
    leaf: SerializedSchema,
    op: Operator,
    rhs: Rhs,
    rhs_type: Primitive,
    connective: Option<Connective>,
}

#[derive(Debug, Serialize, Deserialize)]
enum SerializedSchema {
    Primitive(Primitive),
    Set(Primitive),
    List(Primitive),
    ListOfRecords(Vec<(String, SerializedSchema)>),
    Map(MapKey, Primitive),
    Record(Vec<(String, SerializedSchema)>),
}

// ---------------------------------------------------------------------------
// Schema conversion
// ---------------------------------------------------------------------------

fn serialize_schema(schema: &Schema) -> SerializedSchema {
    match schema {
        Schema::Primitive(p) => SerializedSchema::Primitive(*p),
        Schema::Set(p) => SerializedSchema::Set(*p),
        Schema::List(p) => SerializedSchema::List(*p),
        Schema::ListOfRecords(record) => SerializedSchema::ListOfRecords(serialize_fields(record)),
        Schema::Map(k, v) => SerializedSchema::Map(*k, *v),
        Schema::Record(record) => SerializedSchema::Record(serialize_fields(record)),
    }
}

fn serialize_fields(record: &RecordSchema) -> Vec<(String, SerializedSchema)> {
    record
        .fields()
        .map(|(name, schema)| (name.to_owned(), serialize_schema(schema)))
        .collect()
}

fn deserialize_schema(schema: SerializedSchema) -> Schema {
    match schema {
        SerializedSchema::Primitive(p) => Schema::Primitive(p),
        SerializedSchema::Set(p) => Schema::Set(p),
        SerializedSchema::List(p) => Schema::List(p),
        SerializedSchema::ListOfRecords(fields) => Schema::ListOfRecords(deserialize_fields(fields)),
        SerializedSchema::Map(k, v) => Schema::Map(k, v),
        SerializedSchema::Record(fields) => Schema::Record(deserialize_fields(fields)),
    }
}

fn deserialize_fields(fields: Vec<(String, SerializedSchema)>) -> RecordSchema {
    fields
        .into_iter()
        .fold(RecordSchema::new(), |record, (name, schema)| {
            record.field(&name, deserialize_schema(schema))
        })
}

// ---------------------------------------------------------------------------
// CompiledExpression <-> SerializedExpression
// ---------------------------------------------------------------------------

fn expression_to_serialized(compiled: &CompiledExpression) -> SerializedExpression {
    let subexprs = compiled
        .subexprs
        .iter()
        .map(|se| SerializedSubexpr {
            id: se.id,
            offset: se.offset,
            steps: se.lhs.steps.clone(),
            leaf: serialize_schema(&se.lhs.leaf),
            op: se.op.clone(),
            rhs: se.rhs.clone(),
            rhs_type: se.rhs_type,
            connective: se.connective,
        })
        .collect();

    SerializedExpression {
        metadata: ExpressionMetadata {
            subexpr_count: compiled.subexprs.len(),
            source_digest: *blake3::hash(compiled.source.as_bytes()).as_bytes(),
        },
        source: compiled.source.clone(),
        fingerprint: compiled.fingerprint.clone(),
        subexprs,
        tree: compiled.tree.clone(),
    }
}

fn serialized_to_expression(ser: SerializedExpression) -> Result<CompiledExpression, DeserializeError> {
    validate(&ser)?;

    let subexprs = ser
        .subexprs
        .into_iter()
        .map(|se| Subexpr {
            id: se.id,
            offset: se.offset,
            lhs: ResolvedPath {
                steps: se.steps,
                leaf: deserialize_schema(se.leaf),
            },
            op: se.op,
            rhs: se.rhs,
            rhs_type: se.rhs_type,
            connective: se.connective,
        })
        .collect();

    Ok(CompiledExpression {
        source: ser.source,
        subexprs,
        tree: ser.tree,
        fingerprint: ser.fingerprint,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(ser: &SerializedExpression) -> Result<(), DeserializeError> {
    let count = ser.subexprs.len();

    if ser.metadata.subexpr_count != count {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} subexpressions but payload has {count}",
            ser.metadata.subexpr_count
        )));
    }
    if blake3::hash(ser.source.as_bytes()).as_bytes() != &ser.metadata.source_digest {
        return Err(DeserializeError::Validation(
            "source text does not match its digest".to_owned(),
        ));
    }
    if count == 0 {
        return Err(DeserializeError::Validation(
            "expression has no subexpressions".to_owned(),
        ));
    }

    for (i, se) in ser.subexprs.iter().enumerate() {
        if se.id as usize != i + 1 {
            return Err(DeserializeError::Validation(format!(
                "subexpression at position {i} has id {} (ids must be dense from 1)",
                se.id
            )));
        }
        if !matches!(se.steps.first(), Some(PathStep::Field(_))) {
            return Err(DeserializeError::Validation(format!(
                "subexpression {} has a path that does not start with a field",
                se.id
            )));
        }
    }

    let mut next = 1_u32;
    validate_group(&ser.tree, count, &mut next)?;
    if next as usize != count + 1 {
        return Err(DeserializeError::Validation(format!(
            "group tree covers {} of {count} subexpressions",
            next - 1
        )));
    }

    Ok(())
}

/// Walk `group` in order, requiring ids to continue from `next`.
fn validate_group(group: &Group, count: usize, next: &mut u32) -> Result<(), DeserializeError> {
    let mut members = 0_usize;
    for child in &group.children {
        match child {
            PNode::Subexprs { first, last } => {
                if *first != *next || first > last || *last as usize > count {
                    return Err(DeserializeError::Validation(format!(
                        "subexpression range {first}..={last} out of order or out of bounds"
                    )));
                }
                members += (last - first) as usize + 1;
                *next = last + 1;
            }
            PNode::Group(inner) => {
                validate_group(inner, count, next)?;
                members += 1;
            }
        }
    }

    match (members, group.connective) {
        (0, _) => Err(DeserializeError::Validation("empty group".to_owned())),
        (1, Some(c)) => Err(DeserializeError::Validation(format!(
            "single-member group carries connective '{c}'"
        ))),
        (n, None) if n > 1 => Err(DeserializeError::Validation(format!(
            "group of {n} members has no connective"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) {
    let hash = blake3::hash(payload);
    let hash_bytes = hash.as_bytes();

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    #[allow(clippy::cast_possible_truncation)]
    let payload_len = payload.len() as u32;
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash_bytes[..16]);
}

#[allow(clippy::cast_possible_truncation)]
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] engine version, bytes[8..12] flags
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

// ---------------------------------------------------------------------------
// Public encode/decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(compiled: &CompiledExpression) -> Result<Vec<u8>, SerializeError> {
    let serialized = expression_to_serialized(compiled);
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<CompiledExpression, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + payload_len as usize;
    if bytes.len() < payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];

    if blake3::hash(payload).as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedExpression, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;

    tracing::debug!(
        subexprs = serialized.subexprs.len(),
        schema = %serialized.fingerprint,
        "decoded compiled expression"
    );
    serialized_to_expression(serialized)
}
