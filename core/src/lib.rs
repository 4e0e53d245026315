pub mod block;
pub mod cpu;
pub mod ctx;
pub mod dump;
pub mod hash;
pub mod hreg;
pub mod insn;
pub mod op;

pub use block::{InsnPatch, JitBlock, JitChunk, JIT_MAX_CHUNKS};
pub use cpu::{CpuPpc, MtsEntry, MtsFlags, PpcHookFn, PpcInsnFn, PpcMemOpFn};
pub use ctx::JitContext;
pub use hreg::HregMap;
pub use op::{Op, OpKind, OpPool, OP_BUF_SIZES, OP_INV, OP_POOL_NR};
