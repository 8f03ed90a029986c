//! SH4 DMA controller transfer helpers.
//!
//! The maple frame processor moves its command lists and responses through
//! DMA channel 2.  Guest software always points these transfers at main
//! RAM; anything else is reported rather than silently dropped.

use crate::error::{DcResult, ErrorRecord};
use crate::mem::{addr, Memory};

fn ram_offset(address: u32, len: usize) -> DcResult<u32> {
    let phys = address & addr::PHYS_MASK;
    if phys < addr::AREA3_FIRST || phys > addr::AREA3_LAST {
        return Err(
            ErrorRecord::unimplemented("DMA transfer outside of main RAM")
                .address(address)
                .length(len as u32),
        );
    }
    Ok(phys & addr::AREA3_MASK)
}

/// DMA a buffer into guest RAM.
pub fn transfer_to_mem(mem: &mut Memory, address: u32, data: &[u8]) -> DcResult<()> {
    let at = ram_offset(address, data.len())?;
    mem.write_block(at, data);
    Ok(())
}

/// DMA a buffer out of guest RAM.
pub fn transfer_from_mem(mem: &Memory, address: u32, out: &mut [u8]) -> DcResult<()> {
    let at = ram_offset(address, out.len())?;
    mem.read_block(at, out);
    Ok(())
}

/// Convenience: fetch one little-endian DWORD.
pub fn read_dword(mem: &Memory, address: u32) -> DcResult<u32> {
    let mut bytes = [0u8; 4];
    transfer_from_mem(mem, address, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}
