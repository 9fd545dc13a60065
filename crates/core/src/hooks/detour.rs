//! In-process detours
//!
//! [`DetourPatcher`] is the [`PatchService`] used outside tests. It copies
//! whole instructions from the target's prologue into a nearby trampoline,
//! re-encoding relative operands with `iced-x86`, and appends a jump back
//! to the first untouched instruction. Activation overwrites the prologue
//! with a jump to the replacement; removal restores the saved bytes.

use dashmap::DashMap;
use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Decoder, DecoderOptions, FlowControl, Instruction,
    InstructionBlock,
};
use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};

use super::patch::{HookError, PatchService};
use super::trampoline::{self, SLOT_SIZE};

new_key_type! {
    /// Handle for an installed detour
    pub struct DetourKey;
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("framejack detours support x86 and x86-64 only");

#[cfg(target_arch = "x86_64")]
const BITNESS: u32 = 64;
#[cfg(target_arch = "x86")]
const BITNESS: u32 = 32;

/// Length of the jump written over the target
#[cfg(target_arch = "x86_64")]
pub const JUMP_LEN: usize = 14;
#[cfg(target_arch = "x86")]
pub const JUMP_LEN: usize = 5;

/// Bytes decoded from the target when looking for instruction boundaries
const MAX_PROLOGUE: usize = 32;

/// Encode an unconditional jump placed at `from` that lands on `to`
///
/// x86-64 uses `jmp [rip+0]` followed by the absolute address, so the
/// replacement may live anywhere. x86 uses `jmp rel32`.
#[cfg(target_arch = "x86_64")]
pub fn jump_bytes(_from: usize, to: usize) -> [u8; JUMP_LEN] {
    let mut bytes = [0u8; JUMP_LEN];
    bytes[..6].copy_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
    bytes[6..].copy_from_slice(&(to as u64).to_le_bytes());
    bytes
}

#[cfg(target_arch = "x86")]
pub fn jump_bytes(from: usize, to: usize) -> [u8; JUMP_LEN] {
    let rel = (to as i32).wrapping_sub(from as i32 + JUMP_LEN as i32);
    let mut bytes = [0u8; JUMP_LEN];
    bytes[0] = 0xE9;
    bytes[1..].copy_from_slice(&rel.to_le_bytes());
    bytes
}

/// Prologue instructions re-encoded for a new address
#[derive(Debug)]
pub struct Relocated {
    /// Encoded instructions
    pub code: Vec<u8>,
    /// Number of original bytes they replace
    pub consumed: usize,
}

/// Re-encode the instructions covering the first `min_len` bytes of `code`
///
/// `code` was read from `ip`; the output is valid at `new_ip`.
pub fn relocate_prologue(
    code: &[u8],
    ip: u64,
    new_ip: u64,
    min_len: usize,
) -> Result<Relocated, HookError> {
    let mut decoder = Decoder::with_ip(BITNESS, code, ip, DecoderOptions::NONE);
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut consumed = 0usize;

    while consumed < min_len {
        if !decoder.can_decode() {
            return Err(HookError::RelocationFailed(format!(
                "ran out of bytes after {} of {}",
                consumed, min_len
            )));
        }

        let instr = decoder.decode();
        if instr.is_invalid() {
            return Err(HookError::RelocationFailed(format!(
                "invalid instruction at {:x}",
                instr.ip()
            )));
        }

        consumed += instr.len();
        let ends_function = matches!(
            instr.flow_control(),
            FlowControl::Return | FlowControl::Interrupt | FlowControl::Exception
        );
        instructions.push(instr);

        if ends_function && consumed < min_len {
            return Err(HookError::RelocationFailed(format!(
                "function at {:x} is shorter than {} bytes",
                ip, min_len
            )));
        }
    }

    // A branch back into the overwritten bytes would land mid-jump
    let patched = (ip + 1)..(ip + consumed as u64);
    if let Some(branch) = instructions.iter().find(|instr| {
        matches!(
            instr.flow_control(),
            FlowControl::ConditionalBranch | FlowControl::UnconditionalBranch | FlowControl::Call
        ) && patched.contains(&instr.near_branch_target())
    }) {
        return Err(HookError::RelocationFailed(format!(
            "branch at {:x} targets the patched range",
            branch.ip()
        )));
    }

    let block = InstructionBlock::new(&instructions, new_ip);
    let encoded = BlockEncoder::encode(BITNESS, block, BlockEncoderOptions::NONE)
        .map_err(|e| HookError::RelocationFailed(e.to_string()))?;

    Ok(Relocated {
        code: encoded.code_buffer,
        consumed,
    })
}

struct DetourEntry {
    name: String,
    target: usize,
    replacement: usize,
    trampoline: usize,
    /// Bytes overwritten by the activation jump
    saved: Vec<u8>,
    active: bool,
}

/// Detour-based patch service
pub struct DetourPatcher {
    entries: RwLock<SlotMap<DetourKey, DetourEntry>>,
    names: DashMap<String, DetourKey>,
}

impl Default for DetourPatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DetourPatcher {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(SlotMap::with_key()),
            names: DashMap::new(),
        }
    }

    /// Number of installed detours
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, name: &str) -> Result<DetourKey, HookError> {
        self.names
            .get(name)
            .map(|key| *key)
            .ok_or_else(|| HookError::NotFound(name.to_string()))
    }
}

/// Overwrite code bytes at `address`
///
/// # Safety
/// `address` must point to at least `bytes.len()` bytes of mapped code.
unsafe fn write_code(address: usize, bytes: &[u8]) -> Result<(), HookError> {
    let _guard = region::protect_with_handle(
        address as *const u8,
        bytes.len(),
        region::Protection::READ_WRITE_EXECUTE,
    )
    .map_err(|e| HookError::MemoryProtection(e.to_string()))?;

    std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
    Ok(())
}

impl PatchService for DetourPatcher {
    #[tracing::instrument(skip(self, target, replacement))]
    unsafe fn install_hook(
        &self,
        name: &str,
        target: *const (),
        replacement: *const (),
    ) -> Result<*const (), HookError> {
        // Held for the whole install so a name can only be claimed once
        let mut entries = self.entries.write();
        if self.names.contains_key(name) {
            return Err(HookError::DuplicateName(name.to_string()));
        }
        if target.is_null() {
            return Err(HookError::InvalidAddress(0));
        }
        if replacement.is_null() {
            return Err(HookError::InvalidAddress(0));
        }

        let target_addr = target as usize;
        let prologue = std::slice::from_raw_parts(target as *const u8, MAX_PROLOGUE);

        let slot = trampoline::alloc_near(target as *const u8)
            .ok_or(HookError::TrampolineAllocation(target_addr))?;
        let slot_addr = slot.as_ptr() as usize;

        let relocated = relocate_prologue(prologue, target_addr as u64, slot_addr as u64, JUMP_LEN)
            .and_then(|relocated| {
                if relocated.code.len() + JUMP_LEN > SLOT_SIZE {
                    return Err(HookError::RelocationFailed(format!(
                        "relocated prologue of {} bytes does not fit a trampoline",
                        relocated.code.len()
                    )));
                }
                Ok(relocated)
            });
        let relocated = match relocated {
            Ok(relocated) => relocated,
            Err(e) => {
                trampoline::release_unused(slot);
                return Err(e);
            }
        };

        let back = jump_bytes(
            slot_addr + relocated.code.len(),
            target_addr + relocated.consumed,
        );
        // SAFETY: the slot is SLOT_SIZE bytes of RWX memory owned by this hook
        std::ptr::copy_nonoverlapping(relocated.code.as_ptr(), slot.as_ptr(), relocated.code.len());
        std::ptr::copy_nonoverlapping(
            back.as_ptr(),
            slot.as_ptr().add(relocated.code.len()),
            back.len(),
        );

        let entry = DetourEntry {
            name: name.to_string(),
            target: target_addr,
            replacement: replacement as usize,
            trampoline: slot_addr,
            saved: prologue[..relocated.consumed].to_vec(),
            active: false,
        };

        let key = entries.insert(entry);
        self.names.insert(name.to_string(), key);

        tracing::debug!(
            "Prepared detour '{}' at {:x}, trampoline {:x} ({} bytes relocated)",
            name,
            target_addr,
            slot_addr,
            relocated.consumed
        );

        Ok(slot_addr as *const ())
    }

    fn activate(&self, name: &str) -> Result<(), HookError> {
        let key = self.key(name)?;
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| HookError::NotFound(name.to_string()))?;

        if entry.active {
            return Ok(());
        }

        let mut patch = entry.saved.clone();
        patch[..JUMP_LEN].copy_from_slice(&jump_bytes(entry.target, entry.replacement));
        // Pad leftover bytes of the last moved instruction
        patch[JUMP_LEN..].fill(0x90);

        // SAFETY: target was validated at install time and `saved` came from it
        unsafe { write_code(entry.target, &patch)? };
        entry.active = true;

        tracing::info!("Activated detour '{}' at {:x}", entry.name, entry.target);
        Ok(())
    }

    fn remove_hook(&self, name: &str) -> Result<(), HookError> {
        let (_, key) = self
            .names
            .remove(name)
            .ok_or_else(|| HookError::NotFound(name.to_string()))?;
        let entry = self
            .entries
            .write()
            .remove(key)
            .ok_or_else(|| HookError::NotFound(name.to_string()))?;

        if entry.active {
            // SAFETY: restoring the exact bytes read at install time
            unsafe { write_code(entry.target, &entry.saved)? };
        }

        tracing::info!(
            "Removed detour '{}' (trampoline {:x} left mapped)",
            entry.name,
            entry.trampoline
        );
        Ok(())
    }

    fn is_installed(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }
}
