pub mod block_cache;
pub mod compile;
pub mod run;

pub use block_cache::BlockCache;
pub use compile::{compile_page, recompile_block, CodePage, CompileError, GuestPageFetch};
pub use run::{ExitReason, JitStats, PpcJit};
