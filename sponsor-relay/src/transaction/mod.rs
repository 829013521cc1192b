//! Wire-format transaction decoding
//!
//! Parses signed or partially-signed transactions (legacy and version 0
//! messages) into an ordered list of instructions with their resolved
//! account keys. Decoding is pure; any malformed input is an error and
//! nothing is partially accepted.

mod reader;

use base64::{engine::general_purpose, Engine as _};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use reader::Reader;

/// Size of one ed25519 signature in the signature block
pub const SIGNATURE_LEN: usize = 64;

/// High bit of the first message byte marks a versioned message
const VERSION_PREFIX_MASK: u8 = 0x80;

// ============================================================================
// TYPES
// ============================================================================

/// Errors raised while decoding a transaction
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("truncated buffer while reading {field} at offset {offset}")]
    Truncated { field: &'static str, offset: usize },

    #[error("invalid compact-u16 for {field} at offset {offset}")]
    InvalidCompactU16 { field: &'static str, offset: usize },

    #[error("unsupported transaction version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid message header: {0}")]
    InvalidHeader(String),

    #[error("instruction {instruction} references account index {index} but only {available} account keys exist")]
    AccountIndexOutOfRange {
        instruction: usize,
        index: u8,
        available: usize,
    },

    #[error("instruction {instruction} references program index {index} but only {available} account keys exist")]
    ProgramIndexOutOfRange {
        instruction: usize,
        index: u8,
        available: usize,
    },

    #[error("address lookup tables are not supported ({0} table(s) referenced)")]
    AddressLookupTablesUnsupported(usize),

    #[error("{0} trailing byte(s) after message")]
    TrailingBytes(usize),
}

/// Message format of a decoded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVersion {
    Legacy,
    V0,
}

/// Three-byte message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// Account referenced by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRef {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// One decoded instruction: target program, referenced accounts, opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountRef>,
    pub data: Vec<u8>,
}

impl Instruction {
    /// Address of the `index`-th referenced account, if present
    pub fn account(&self, index: usize) -> Option<&Pubkey> {
        self.accounts.get(index).map(|account| &account.pubkey)
    }
}

/// Fully decoded transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub version: MessageVersion,
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<Instruction>,
}

impl DecodedTransaction {
    /// The fee payer is always the first account key
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    /// The transaction signature is the fee payer's signature (base58)
    pub fn signature(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|signature| bs58::encode(signature).into_string())
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Decodes a base64-encoded wire transaction
pub fn decode_base64(encoded: &str) -> Result<DecodedTransaction, DecodeError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    decode(&bytes)
}

/// Decodes a wire transaction
///
/// # Arguments
///
/// * `bytes` - Signature block followed by the serialized message
///
/// # Returns
///
/// * `Ok(DecodedTransaction)` - Every instruction with resolved accounts
/// * `Err(DecodeError)` - Malformed, truncated or unsupported transaction
pub fn decode(bytes: &[u8]) -> Result<DecodedTransaction, DecodeError> {
    let mut reader = Reader::new(bytes);

    let signature_count = reader.read_compact_u16("signature count")?;
    let mut signatures = Vec::with_capacity(signature_count.min(16));
    for _ in 0..signature_count {
        signatures.push(reader.read_array::<SIGNATURE_LEN>("signature")?);
    }

    let version = match reader.peek_u8("message prefix")? {
        prefix if prefix & VERSION_PREFIX_MASK != 0 => {
            reader.read_u8("message prefix")?;
            match prefix & !VERSION_PREFIX_MASK {
                0 => MessageVersion::V0,
                other => return Err(DecodeError::UnsupportedVersion(other)),
            }
        }
        _ => MessageVersion::Legacy,
    };

    let header = MessageHeader {
        num_required_signatures: reader.read_u8("message header")?,
        num_readonly_signed_accounts: reader.read_u8("message header")?,
        num_readonly_unsigned_accounts: reader.read_u8("message header")?,
    };

    let key_count = reader.read_compact_u16("account key count")?;
    let mut account_keys = Vec::with_capacity(key_count.min(256));
    for _ in 0..key_count {
        account_keys.push(Pubkey::new_from_array(reader.read_array::<32>("account key")?));
    }

    validate_header(&header, account_keys.len(), signatures.len())?;

    let recent_blockhash = reader.read_array::<32>("recent blockhash")?;

    let instruction_count = reader.read_compact_u16("instruction count")?;
    let mut instructions = Vec::with_capacity(instruction_count.min(64));
    for position in 0..instruction_count {
        let program_index = reader.read_u8("program id index")?;
        let account_index_count = reader.read_compact_u16("instruction account count")?;
        let account_indexes = reader.read_bytes(account_index_count, "instruction account indexes")?;
        let data_len = reader.read_compact_u16("instruction data length")?;
        let data = reader.read_bytes(data_len, "instruction data")?;

        let program_id = *account_keys.get(program_index as usize).ok_or(
            DecodeError::ProgramIndexOutOfRange {
                instruction: position,
                index: program_index,
                available: account_keys.len(),
            },
        )?;

        let accounts = account_indexes
            .iter()
            .map(|&index| -> Result<AccountRef, DecodeError> {
                let pubkey = account_keys.get(index as usize).ok_or(
                    DecodeError::AccountIndexOutOfRange {
                        instruction: position,
                        index,
                        available: account_keys.len(),
                    },
                )?;
                Ok(AccountRef {
                    pubkey: *pubkey,
                    is_signer: is_signer(&header, index as usize),
                    is_writable: is_writable(&header, index as usize, account_keys.len()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        instructions.push(Instruction {
            program_id,
            accounts,
            data: data.to_vec(),
        });
    }

    if version == MessageVersion::V0 {
        // Looked-up addresses live on-chain; instructions referencing them
        // cannot be resolved from the wire bytes alone.
        let table_count = reader.read_compact_u16("address table lookup count")?;
        if table_count > 0 {
            return Err(DecodeError::AddressLookupTablesUnsupported(table_count));
        }
    }

    if reader.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(DecodedTransaction {
        signatures,
        version,
        header,
        account_keys,
        recent_blockhash,
        instructions,
    })
}

/// Extracts the first signature of a wire transaction as base58
///
/// Only the signature block is read, so the message may be in any format.
pub fn first_signature(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut reader = Reader::new(bytes);
    let signature_count = reader.read_compact_u16("signature count")?;
    if signature_count == 0 {
        return Err(DecodeError::InvalidHeader(
            "no signatures in transaction".to_string(),
        ));
    }
    let signature = reader.read_array::<SIGNATURE_LEN>("signature")?;
    Ok(bs58::encode(signature).into_string())
}

/// Re-encodes raw transaction bytes as base58 (block-builder wire encoding)
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

fn validate_header(
    header: &MessageHeader,
    key_count: usize,
    signature_count: usize,
) -> Result<(), DecodeError> {
    let required = header.num_required_signatures as usize;

    if required == 0 {
        return Err(DecodeError::InvalidHeader(
            "transaction requires no signatures (missing fee payer)".to_string(),
        ));
    }
    if required != signature_count {
        return Err(DecodeError::InvalidHeader(format!(
            "header requires {} signature(s) but {} provided",
            required, signature_count
        )));
    }
    if required > key_count {
        return Err(DecodeError::InvalidHeader(format!(
            "header requires {} signer(s) but only {} account keys exist",
            required, key_count
        )));
    }
    if header.num_readonly_signed_accounts as usize >= required {
        return Err(DecodeError::InvalidHeader(
            "fee payer must be writable".to_string(),
        ));
    }
    if header.num_readonly_unsigned_accounts as usize > key_count - required {
        return Err(DecodeError::InvalidHeader(format!(
            "{} readonly unsigned account(s) exceed {} unsigned keys",
            header.num_readonly_unsigned_accounts,
            key_count - required
        )));
    }
    Ok(())
}

fn is_signer(header: &MessageHeader, index: usize) -> bool {
    index < header.num_required_signatures as usize
}

fn is_writable(header: &MessageHeader, index: usize, key_count: usize) -> bool {
    let required = header.num_required_signatures as usize;
    if index < required {
        index < required - header.num_readonly_signed_accounts as usize
    } else {
        index < key_count - header.num_readonly_unsigned_accounts as usize
    }
}
