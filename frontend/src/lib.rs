pub mod ppc32;

pub use ppc32::{decode, EmitFn, InsnTag, DECODE_TABLE};
