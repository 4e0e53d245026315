//! IR dump — human-readable text for the per-slot op lists.
//!
//! Compile-time diagnostics only; the formatter names host registers
//! generically (`h<N>`) since the core is backend-agnostic.

use std::fmt::Write;

use crate::op::{Op, OpKind, OP_INV};
use crate::JitContext;

fn reg(r: i32) -> String {
    if r == OP_INV {
        "-".to_string()
    } else {
        format!("h{r}")
    }
}

/// One-line rendering of a single op record.
pub fn format_op(op: &Op) -> String {
    let p = op.param;
    match op.kind {
        OpKind::Invalid => "invalid".to_string(),
        OpKind::InsnOutput => {
            let mut s = format!("insn_output {:?} [{} bytes", op.name, op.buf.len());
            if !op.patches.is_empty() {
                write!(s, ", {} patch(es)", op.patches.len()).unwrap();
            }
            s.push(']');
            s
        }
        OpKind::BranchTarget => "branch_target".to_string(),
        OpKind::BranchJump => "branch_jump".to_string(),
        OpKind::EndOfBlock => "eob".to_string(),
        OpKind::LoadGpr => format!("load_gpr {} <- r{}", reg(p[0]), p[1]),
        OpKind::StoreGpr => format!("store_gpr r{} <- {}", p[1], reg(p[0])),
        OpKind::UpdateFlags => format!(
            "update_flags cr{} ({})",
            p[0],
            if p[1] != 0 { "signed" } else { "unsigned" }
        ),
        OpKind::RequireFlags => {
            if p[0] == OP_INV {
                "require_flags all".to_string()
            } else {
                format!("require_flags cr{}", p[0])
            }
        }
        OpKind::TrashFlags => "trash_flags".to_string(),
        OpKind::AlterHostReg => format!("alter_host_reg {}", reg(p[0])),
        OpKind::MoveHostReg => format!("move_host_reg {} <- {}", reg(p[0]), reg(p[1])),
        OpKind::SetHostRegImm32 => {
            format!("set_host_reg {} <- {:#x}", reg(p[0]), p[1] as u32)
        }
    }
}

/// Dump the non-empty op lists of the page being compiled.
pub fn dump_ops(ctx: &JitContext, start_ia: u32) -> String {
    let mut out = String::new();
    for (slot, ops) in ctx.op_lists.iter().enumerate() {
        if ops.is_empty() {
            continue;
        }
        let ia = start_ia + (slot << 2) as u32;
        writeln!(out, "{ia:#010x}:").unwrap();
        for op in ops {
            writeln!(out, "  {}", format_op(op)).unwrap();
        }
    }
    out
}
