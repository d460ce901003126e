//! Instruction set, program record, and the two container formats (§4.7).
//!
//! `ProgramBc` is the only artifact that outlives compilation (§3 "Lifecycles"). Everything in
//! this module is shared between `yasny-compiler` (which produces it) and `yasny-runtime`
//! (which executes it).

use crate::diagnostic::{Diagnostic, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed opcode set (§4.7). A sum type per the "tree uniformity" design note (§9) rather
/// than a generic `{op, args}` pair — each variant carries exactly the operands its opcode
/// needs, which the compiler and VM can both pattern-match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Const(Value),
    ConstNull,
    Load(u16),
    Store(u16),
    GLoad(u16),
    GStore(u16),
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unconditional jump to an absolute instruction index, back-patched (§4.6).
    Jmp(usize),
    /// Jump if the popped value is falsy.
    JmpFalse(usize),
    Call { name: String, argc: u8 },
    Ret,
    MakeList(u16),
    /// Expects `2n` stack items alternating key/value from the bottom.
    MakeDict(u16),
    IndexGet,
    IndexSet,
    Len,
    Halt,
}

/// `{name, params (names only), local_count, instructions}` (§3).
///
/// `is_async` is not part of the reference opcode set (§4.7 lists no spawn-aware variant of
/// `CALL`); it is carried on the function record itself so the VM can decide, purely from the
/// callee's record, whether `CALL` should execute the body inline or submit it to the task
/// worker pool and return a handle (§4.8, §9 example 5: calling an async function directly
/// yields a `Task`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBc {
    pub name: String,
    pub params: Vec<String>,
    pub local_count: u16,
    pub instructions: Vec<Instruction>,
    pub is_async: bool,
}

/// `{functions: name→function, entry: function, global_count}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBc {
    pub functions: BTreeMap<String, FunctionBc>,
    pub entry: FunctionBc,
    pub global_count: u16,
}

const BYTECODE_MAGIC: &[u8; 8] = b"YASNYBC1";
const APP_BUNDLE_MAGIC: &[u8; 8] = b"YASNYAP1";
const APP_BUNDLE_VERSION: u8 = 1;

/// Encode a program into the bytecode container: 8-byte magic, little-endian u32 length,
/// then a `bincode` payload. `BTreeMap` in `ProgramBc` keeps the encoding byte-stable for a
/// given program (round-trip invariant, §8).
pub fn encode_program(program: &ProgramBc) -> Result<Vec<u8>> {
    let payload = bincode::serialize(program)
        .map_err(|e| Diagnostic::new(format!("не удалось сериализовать байткод: {e}")))?;
    let mut out = Vec::with_capacity(8 + 4 + payload.len());
    out.extend_from_slice(BYTECODE_MAGIC);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a bytecode container produced by [`encode_program`]. Fatal on magic/length mismatch
/// (§7 "container errors").
pub fn decode_program(bytes: &[u8]) -> Result<ProgramBc> {
    let payload = read_framed(bytes, BYTECODE_MAGIC, "байткод")?;
    bincode::deserialize(payload)
        .map_err(|e| Diagnostic::new(format!("повреждённый байткод: {e}")))
}

/// Metadata blob embedded in an application bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
}

/// Encode an application bundle: magic `YASNYAP1`, version byte, length-prefixed metadata
/// blob, length-prefixed embedded bytecode container (§4.7).
pub fn encode_bundle(metadata: &AppMetadata, program: &ProgramBc) -> Result<Vec<u8>> {
    let metadata_bytes = bincode::serialize(metadata)
        .map_err(|e| Diagnostic::new(format!("не удалось сериализовать метаданные: {e}")))?;
    let bytecode = encode_program(program)?;

    let mut out = Vec::with_capacity(8 + 1 + 4 + metadata_bytes.len() + 4 + bytecode.len());
    out.extend_from_slice(APP_BUNDLE_MAGIC);
    out.push(APP_BUNDLE_VERSION);
    out.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&metadata_bytes);
    out.extend_from_slice(&(bytecode.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytecode);
    Ok(out)
}

/// Decode an application bundle back into its metadata and program.
pub fn decode_bundle(bytes: &[u8]) -> Result<(AppMetadata, ProgramBc)> {
    if bytes.len() < 9 || &bytes[0..8] != APP_BUNDLE_MAGIC {
        return Err(Diagnostic::new("неверная сигнатура пакета приложения"));
    }
    let version = bytes[8];
    if version != APP_BUNDLE_VERSION {
        return Err(Diagnostic::new(format!(
            "неподдерживаемая версия пакета приложения: {version}"
        )));
    }
    let rest = &bytes[9..];
    let (metadata_bytes, rest) = read_length_prefixed(rest, "метаданные пакета")?;
    let metadata: AppMetadata = bincode::deserialize(metadata_bytes)
        .map_err(|e| Diagnostic::new(format!("повреждённые метаданные пакета: {e}")))?;
    let (bytecode_bytes, _) = read_length_prefixed(rest, "байткод пакета")?;
    let program = decode_program(bytecode_bytes)?;
    Ok((metadata, program))
}

fn read_framed<'a>(bytes: &'a [u8], magic: &[u8; 8], what: &str) -> Result<&'a [u8]> {
    if bytes.len() < 8 || &bytes[0..8] != magic {
        return Err(Diagnostic::new(format!("неверная сигнатура контейнера: {what}")));
    }
    let (payload, _) = read_length_prefixed(&bytes[8..], what)?;
    Ok(payload)
}

fn read_length_prefixed<'a>(bytes: &'a [u8], what: &str) -> Result<(&'a [u8], &'a [u8])> {
    if bytes.len() < 4 {
        return Err(Diagnostic::new(format!(
            "усечённый контейнер: отсутствует длина ({what})"
        )));
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let body = &bytes[4..];
    if body.len() < len {
        return Err(Diagnostic::new(format!(
            "усечённый контейнер: заявлено {len} байт, доступно {} ({what})",
            body.len()
        )));
    }
    Ok((&body[..len], &body[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> ProgramBc {
        let mut functions = BTreeMap::new();
        functions.insert(
            "main".to_string(),
            FunctionBc {
                name: "main".to_string(),
                params: vec![],
                local_count: 0,
                instructions: vec![Instruction::ConstNull, Instruction::Ret],
                is_async: false,
            },
        );
        ProgramBc {
            functions,
            entry: FunctionBc {
                name: "__entry__".to_string(),
                params: vec![],
                local_count: 0,
                instructions: vec![
                    Instruction::Call { name: "main".to_string(), argc: 0 },
                    Instruction::Pop,
                    Instruction::Halt,
                ],
                is_async: false,
            },
            global_count: 0,
        }
    }

    #[test]
    fn program_round_trips_through_container() {
        let program = sample_program();
        let encoded = encode_program(&program).unwrap();
        assert_eq!(&encoded[0..8], BYTECODE_MAGIC);
        let decoded = decode_program(&encoded).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let err = decode_program(b"NOTVALID").unwrap_err();
        assert!(err.message.contains("сигнатура"));
    }

    #[test]
    fn bundle_round_trips() {
        let program = sample_program();
        let meta = AppMetadata { name: "demo".to_string(), version: "1.0".to_string() };
        let encoded = encode_bundle(&meta, &program).unwrap();
        assert_eq!(&encoded[0..8], APP_BUNDLE_MAGIC);
        let (decoded_meta, decoded_program) = decode_bundle(&encoded).unwrap();
        assert_eq!(decoded_meta, meta);
        assert_eq!(decoded_program, program);
    }

    #[test]
    fn bundle_rejects_version_mismatch() {
        let program = sample_program();
        let meta = AppMetadata { name: "demo".to_string(), version: "1.0".to_string() };
        let mut encoded = encode_bundle(&meta, &program).unwrap();
        encoded[8] = 2;
        let err = decode_bundle(&encoded).unwrap_err();
        assert!(err.message.contains("версия"));
    }
}
