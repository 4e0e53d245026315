pub mod cr_tables;
pub mod exec_page;
pub mod lower;
pub mod x86_64;

pub use exec_page::{ExecPagePool, EntryFn, EXEC_AREA_DEFAULT_SIZE, JIT_BUFSIZE};
pub use lower::{append_insn_output, lower_page};

use thiserror::Error;

/// Compile-path failures. Everything except `ExecAreaMap` downgrades a
/// page to interpretation; a mapping failure is fatal to the VM.
#[derive(Debug, Error)]
pub enum JitError {
    #[error("executable area mapping failed: {0}")]
    ExecAreaMap(#[from] std::io::Error),

    #[error("executable area exhausted")]
    CodeBufferExhausted,

    #[error("block exceeds the chunk limit")]
    TooManyChunks,

    #[error("op buffer overflow in {name}: {used} bytes in a {cap} byte bucket")]
    OpBufferOverflow {
        name: &'static str,
        used: usize,
        cap: usize,
    },
}

/// Destination for emitted host code. Implemented by op-record buffers
/// (`Vec<u8>`) and by the block output cursor.
pub trait CodeSink {
    fn put_u8(&mut self, b: u8);
    /// Current write position, in the sink's own coordinates.
    fn pos(&self) -> usize;
    fn patch8(&mut self, at: usize, b: u8);
    fn patch32(&mut self, at: usize, v: u32);

    fn put_u16(&mut self, v: u16) {
        for b in v.to_le_bytes() {
            self.put_u8(b);
        }
    }

    fn put_u32(&mut self, v: u32) {
        for b in v.to_le_bytes() {
            self.put_u8(b);
        }
    }

    fn put_u64(&mut self, v: u64) {
        for b in v.to_le_bytes() {
            self.put_u8(b);
        }
    }
}

impl CodeSink for Vec<u8> {
    fn put_u8(&mut self, b: u8) {
        self.push(b);
    }

    fn pos(&self) -> usize {
        self.len()
    }

    fn patch8(&mut self, at: usize, b: u8) {
        self[at] = b;
    }

    fn patch32(&mut self, at: usize, v: u32) {
        self[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
}
