use std::sync::{Mutex, MutexGuard, PoisonError};

/// Guest physical memory shared between the emulator and DMA devices
/// Accesses past the end wrap around to the start
pub struct GuestMemory {
    bytes: Mutex<Vec<u8>>,
}

impl GuestMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size.max(1)]),
        }
    }

    fn bytes(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn read_byte(&self, addr: u32) -> u8 {
        let bytes = self.bytes();
        bytes[addr as usize % bytes.len()]
    }

    pub fn write_byte(&self, addr: u32, value: u8) {
        let mut bytes = self.bytes();
        let idx = addr as usize % bytes.len();
        bytes[idx] = value;
    }

    pub fn read(&self, addr: u32, out: &mut [u8]) {
        let bytes = self.bytes();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = bytes[(addr as usize + i) % bytes.len()];
        }
    }

    pub fn write(&self, addr: u32, data: &[u8]) {
        let mut bytes = self.bytes();
        let len = bytes.len();
        for (i, value) in data.iter().enumerate() {
            bytes[(addr as usize + i) % len] = *value;
        }
    }
}
