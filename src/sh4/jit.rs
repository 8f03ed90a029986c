//! SH4 basic-block decode cache.
//!
//! The jit-backed dispatch path looks up (or decodes) the basic block at PC,
//! runs it and charges the block's precomputed cycle cost in one step.  A
//! block is the instruction run from its entry point up to and including the
//! first control transfer (plus its delay slot).  Execution reuses the
//! interpreter's semantic functions, so behaviour is identical to the
//! interpreter modulo where in the block event deadlines are observed.
//!
//! Guest stores into code are not tracked individually: anything that
//! restructures the caches (a CCR write) throws the whole cache away, and a
//! size-bounded GC runs at frame boundaries.

use std::collections::HashMap;
use std::rc::Rc;

use super::exec;
use super::inst::{self, InstGroup, OpDef};
use super::Sh4;
use crate::error::DcResult;
use crate::hw::HwDevices;
use crate::sched::Clock;

/// Longest run of instructions in one block.
const MAX_BLOCK_INSTS: usize = 32;

/// Cache size bound; the GC clears everything past this.
const MAX_CACHED_BLOCKS: usize = 4096;

struct BlockOp {
    raw: u16,
    op: &'static OpDef,
}

pub struct JitBlock {
    pub start_pc: u32,
    /// Precomputed cost of the whole block, in CPU cycles.
    pub cycle_count: u32,
    ops: Vec<BlockOp>,
}

impl JitBlock {
    pub fn inst_count(&self) -> usize {
        self.ops.len()
    }
}

pub struct CodeCache {
    blocks: HashMap<u32, Rc<JitBlock>>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }

    pub fn find(&self, pc: u32) -> Option<Rc<JitBlock>> {
        self.blocks.get(&pc).cloned()
    }

    pub fn insert(&mut self, pc: u32, block: Rc<JitBlock>) {
        self.blocks.insert(pc, block);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop every cached block.  CCR writes land here.
    pub fn invalidate_all(&mut self) {
        if !self.blocks.is_empty() {
            log::debug!("jit: invalidating {} cached blocks", self.blocks.len());
            self.blocks.clear();
        }
    }

    /// Frame-boundary housekeeping: bound the cache size.
    pub fn gc(&mut self) {
        if self.blocks.len() > MAX_CACHED_BLOCKS {
            log::debug!("jit: cache grew to {} blocks, clearing", self.blocks.len());
            self.blocks.clear();
        }
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `op` ends the block it appears in (not counting its delay slot).
fn ends_block(op: &OpDef) -> bool {
    op.is_branch || matches!(op.name, "trapa" | "sleep" | "rte" | "invalid")
}

/// Decode the basic block at `pc`.
pub fn compile(sh4: &mut Sh4, hw: &mut HwDevices, pc: u32) -> DcResult<JitBlock> {
    let mut ops = Vec::new();
    let mut cycle_count = 0u32;
    let mut cursor = pc;

    // pairing state local to the block; blocks always start on a fresh
    // issue slot
    let mut last_group = InstGroup::Co;
    let mut paired = false;
    let mut charge = |op: &OpDef| {
        if paired || op.group == InstGroup::Co || op.group == last_group {
            paired = false;
            last_group = op.group;
            op.issue as u32
        } else {
            paired = true;
            last_group = op.group;
            0
        }
    };

    loop {
        let raw = super::mem::fetch_inst(sh4, hw, cursor)?;
        let op = inst::decode(raw);
        cycle_count += charge(op);
        let done = ends_block(op);
        let delayed = op.delayed;
        ops.push(BlockOp { raw, op });
        cursor = cursor.wrapping_add(2);

        if done {
            if delayed {
                let slot_raw = super::mem::fetch_inst(sh4, hw, cursor)?;
                let slot_op = inst::decode(slot_raw);
                cycle_count += charge(slot_op);
                ops.push(BlockOp {
                    raw: slot_raw,
                    op: slot_op,
                });
            }
            break;
        }
        if ops.len() >= MAX_BLOCK_INSTS {
            break;
        }
    }

    Ok(JitBlock {
        start_pc: pc,
        cycle_count: cycle_count.max(1),
        ops,
    })
}

/// Execute a compiled block.  Stops early if an instruction redirects PC
/// through an exception; the remaining ops belong to the abandoned path.
pub fn exec_block(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    block: &JitBlock,
) -> DcResult<()> {
    for entry in &block.ops {
        exec::do_exec_inst(sh4, clk, hw, entry.raw, entry.op)?;
        if sh4.block_abort {
            break;
        }
    }
    sh4.cycles_executed += block.cycle_count as u64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_rom::BootRom;
    use crate::flash_rom::FlashRom;

    const BASE: u32 = 0x8c01_0000;

    fn machine_with(program: &[u16]) -> (Sh4, Clock, HwDevices) {
        let mut clk = Clock::new();
        let mut sh4 = Sh4::new(&mut clk);
        let mut hw = HwDevices::new(
            &mut clk,
            BootRom::from_bytes(vec![0u8; 16]),
            FlashRom::ephemeral(),
            None,
            None,
        )
        .unwrap();
        for (idx, &word) in program.iter().enumerate() {
            hw.mem.write_16((BASE & 0xff_ffff) + idx as u32 * 2, word);
        }
        sh4.pc = BASE;
        (sh4, clk, hw)
    }

    #[test]
    fn test_block_ends_after_branch_and_slot() {
        let (mut sh4, _clk, mut hw) = machine_with(&[
            0xe105, // mov #5, r1
            0x7103, // add #3, r1
            0xa004, // bra
            0x0009, // slot nop
            0xe2ff, // unreachable
        ]);
        let block = compile(&mut sh4, &mut hw, BASE).unwrap();
        assert_eq!(block.inst_count(), 4);
        assert!(block.cycle_count >= 1);
    }

    #[test]
    fn test_block_execution_matches_interpreter() {
        let program = [
            0xe105, // mov #5, r1
            0x7103, // add #3, r1
            0xa001, // bra +2
            0x7101, // slot: add #1, r1
            0xe2ff, // skipped
            0x7110, // target: add #16, r1
        ];

        // interpreter reference
        let (mut sh4_a, mut clk_a, mut hw_a) = machine_with(&program);
        for _ in 0..5 {
            exec::exec_one(&mut sh4_a, &mut clk_a, &mut hw_a).unwrap();
        }

        // block execution
        let (mut sh4_b, mut clk_b, mut hw_b) = machine_with(&program);
        let block = compile(&mut sh4_b, &mut hw_b, BASE).unwrap();
        exec_block(&mut sh4_b, &mut clk_b, &mut hw_b, &block).unwrap();
        let pc = sh4_b.pc;
        let block2 = compile(&mut sh4_b, &mut hw_b, pc).unwrap();
        exec_block(&mut sh4_b, &mut clk_b, &mut hw_b, &block2).unwrap();

        assert_eq!(sh4_a.gen_reg(1), sh4_b.gen_reg(1));
        assert_eq!(sh4_a.pc, sh4_b.pc);
        assert_eq!(sh4_b.gen_reg(1), 5 + 3 + 1 + 16);
    }

    #[test]
    fn test_cache_roundtrip_and_invalidate() {
        let (mut sh4, _clk, mut hw) = machine_with(&[0x0009, 0x000b, 0x0009]);
        let block = Rc::new(compile(&mut sh4, &mut hw, BASE).unwrap());
        sh4.jit_cache.insert(BASE, Rc::clone(&block));

        assert!(sh4.jit_cache.find(BASE).is_some());
        assert!(sh4.jit_cache.find(BASE + 2).is_none());

        sh4.jit_cache.invalidate_all();
        assert!(sh4.jit_cache.is_empty());
    }

    #[test]
    fn test_ccr_write_invalidates_cache() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009, 0x000b, 0x0009]);
        let block = Rc::new(compile(&mut sh4, &mut hw, BASE).unwrap());
        sh4.jit_cache.insert(BASE, block);

        super::super::reg::write(&mut sh4, &mut clk, 0xff00_001c, 4, 0x0909).unwrap();
        assert!(sh4.jit_cache.is_empty());
    }

    #[test]
    fn test_straight_line_block_is_capped() {
        let program = vec![0x0009u16; 64];
        let (mut sh4, _clk, mut hw) = machine_with(&program);
        let block = compile(&mut sh4, &mut hw, BASE).unwrap();
        assert_eq!(block.inst_count(), MAX_BLOCK_INSTS);
    }

    #[test]
    fn test_gc_bounds_cache() {
        let (mut sh4, _clk, mut hw) = machine_with(&[0x000b, 0x0009]);
        let block = Rc::new(compile(&mut sh4, &mut hw, BASE).unwrap());
        for idx in 0..(MAX_CACHED_BLOCKS + 1) {
            sh4.jit_cache.insert(idx as u32 * 2, Rc::clone(&block));
        }
        sh4.jit_cache.gc();
        assert!(sh4.jit_cache.is_empty());
    }
}
