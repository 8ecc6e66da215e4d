// Copyright (c) 2024 The Botho Foundation

//! Argument encoding for entry functions and views.
//!
//! Each argument is encoded on its own with BCS: `u64` is 8 bytes
//! little-endian, vectors carry a ULEB128 length prefix.

use serde::{de::DeserializeOwned, Serialize};

use super::{LedgerError, LedgerResult};

/// A typed entry function argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionArgument {
    U64(u64),
    Bytes(Vec<u8>),
    U64Vector(Vec<u64>),
}

impl TransactionArgument {
    pub fn encode(&self) -> LedgerResult<Vec<u8>> {
        match self {
            TransactionArgument::U64(v) => to_bytes(v),
            TransactionArgument::Bytes(bytes) => to_bytes(bytes),
            TransactionArgument::U64Vector(values) => to_bytes(values),
        }
    }
}

/// Encode a list of arguments in order.
pub fn encode_args(args: &[TransactionArgument]) -> LedgerResult<Vec<Vec<u8>>> {
    args.iter().map(TransactionArgument::encode).collect()
}

fn to_bytes<T: Serialize + ?Sized>(value: &T) -> LedgerResult<Vec<u8>> {
    bcs::to_bytes(value).map_err(|e| LedgerError::Codec(e.to_string()))
}

/// Decodes a function's argument list in declaration order.
pub struct ArgDecoder<'a> {
    args: std::slice::Iter<'a, Vec<u8>>,
    position: usize,
}

impl<'a> ArgDecoder<'a> {
    pub fn new(args: &'a [Vec<u8>]) -> Self {
        Self {
            args: args.iter(),
            position: 0,
        }
    }

    pub fn u64(&mut self) -> LedgerResult<u64> {
        self.next()
    }

    pub fn bytes(&mut self) -> LedgerResult<Vec<u8>> {
        self.next()
    }

    pub fn u64_vector(&mut self) -> LedgerResult<Vec<u64>> {
        self.next()
    }

    /// Fail if arguments remain unconsumed.
    pub fn finish(mut self) -> LedgerResult<()> {
        match self.args.next() {
            None => Ok(()),
            Some(_) => Err(LedgerError::Codec(format!(
                "too many arguments: expected {}",
                self.position
            ))),
        }
    }

    fn next<T: DeserializeOwned>(&mut self) -> LedgerResult<T> {
        let position = self.position;
        let arg = self
            .args
            .next()
            .ok_or_else(|| LedgerError::Codec(format!("missing argument {}", position)))?;
        self.position += 1;
        bcs::from_bytes(arg)
            .map_err(|e| LedgerError::Codec(format!("argument {}: {}", position, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_is_little_endian() {
        assert_eq!(
            TransactionArgument::U64(1001).encode().unwrap(),
            vec![0xe9, 0x03, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_long_byte_vector_uses_multibyte_length() {
        let encoded = TransactionArgument::Bytes(vec![7; 200]).encode().unwrap();
        assert_eq!(&encoded[..2], &[0xc8, 0x01]);
        assert_eq!(encoded.len(), 202);

        let args = vec![encoded];
        let mut decoder = ArgDecoder::new(&args);
        assert_eq!(decoder.bytes().unwrap(), vec![7; 200]);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_decode_collect_header_arguments() {
        let args = encode_args(&[
            TransactionArgument::U64(1001),
            TransactionArgument::U64(42),
            TransactionArgument::Bytes(vec![1; 32]),
            TransactionArgument::Bytes(vec![2; 32]),
            TransactionArgument::U64Vector(vec![5, 6]),
        ])
        .unwrap();

        let mut decoder = ArgDecoder::new(&args);
        assert_eq!(decoder.u64().unwrap(), 1001);
        assert_eq!(decoder.u64().unwrap(), 42);
        assert_eq!(decoder.bytes().unwrap(), vec![1; 32]);
        assert_eq!(decoder.bytes().unwrap(), vec![2; 32]);
        assert_eq!(decoder.u64_vector().unwrap(), vec![5, 6]);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        let truncated = vec![vec![1, 2, 3]];
        assert!(ArgDecoder::new(&truncated).u64().is_err());

        let trailing = vec![vec![0; 9]];
        assert!(ArgDecoder::new(&trailing).u64().is_err());

        let missing: Vec<Vec<u8>> = vec![];
        assert!(ArgDecoder::new(&missing).u64().is_err());

        let extra =
            encode_args(&[TransactionArgument::U64(1), TransactionArgument::U64(2)]).unwrap();
        let mut decoder = ArgDecoder::new(&extra);
        decoder.u64().unwrap();
        assert!(decoder.finish().is_err());

        let short_vector = vec![vec![2, 1, 0, 0, 0, 0, 0, 0, 0]];
        assert!(ArgDecoder::new(&short_vector).u64_vector().is_err());
    }

    #[test]
    fn test_overflowing_and_noncanonical_lengths_rejected() {
        let mut overflowing = vec![0x80; 9];
        overflowing.push(0x7e);
        assert!(ArgDecoder::new(&[overflowing]).bytes().is_err());

        // Zero written with a redundant continuation byte
        let noncanonical = vec![vec![0x80, 0x00]];
        assert!(ArgDecoder::new(&noncanonical).bytes().is_err());

        let canonical = vec![vec![0x00]];
        assert_eq!(ArgDecoder::new(&canonical).bytes().unwrap(), Vec::<u8>::new());
    }
}
