use super::read_usize;
use crate::{
    error::{PatchError, Result},
    stream::PatchStream,
};

const VCD_SELF: u8 = 0;
const VCD_HERE: u8 = 1;

/// The near/same address cache COPY addresses are predicted from.
pub struct AddrCache {
    near: Vec<usize>,
    next_slot: usize,
    same: Vec<usize>,
}

impl Default for AddrCache {
    fn default() -> Self {
        Self::new(4, 3)
    }
}

impl AddrCache {
    pub fn new(s_near: usize, s_same: usize) -> Self {
        Self {
            near: vec![0; s_near],
            next_slot: 0,
            same: vec![0; s_same * 256],
        }
    }

    pub fn reset(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    pub fn update(&mut self, addr: usize) {
        if !self.near.is_empty() {
            self.near[self.next_slot] = addr;
            self.next_slot = (self.next_slot + 1) % self.near.len();
        }

        if !self.same.is_empty() {
            let len = self.same.len();
            self.same[addr % len] = addr;
        }
    }

    /// Resolves a COPY address for `mode`, reading its operand from `addrs`.
    pub fn decode(&mut self, here: usize, mode: u8, addrs: &mut PatchStream) -> Result<usize> {
        let near_modes = 2 + self.near.len();

        let addr = match mode {
            VCD_SELF => read_usize(addrs)?,
            VCD_HERE => here.checked_sub(read_usize(addrs)?).ok_or_else(|| {
                PatchError::GenericDecode(format!("here-relative address before 0 (here: {here})"))
            })?,
            m if (m as usize) < near_modes => self.near[m as usize - 2]
                .checked_add(read_usize(addrs)?)
                .ok_or_else(|| PatchError::overflow("near address"))?,
            m => {
                let index = (m as usize - near_modes) * 256 + addrs.read_u8()? as usize;
                *self.same.get(index).ok_or_else(|| {
                    PatchError::GenericDecode(format!("invalid copy address mode {m}"))
                })?
            }
        };

        self.update(addr);
        Ok(addr)
    }
}
