use thiserror::Error;

pub trait PortIoDevice {
    fn read(&mut self, port: u16, size: u8) -> u32;
    fn write(&mut self, port: u16, size: u8, value: u32);

    /// Reset the device back to its power-on state.
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IoBusError {
    #[error("I/O port range length must be non-zero")]
    EmptyRange,
    #[error("I/O port range wraps past 0xFFFF: start={start:#x} len={len:#x}")]
    Wraps { start: u16, len: u16 },
    #[error("overlapping I/O port ranges: new=[{start:#x}..{end:#x}) existing=[{existing_start:#x}..{existing_end:#x})")]
    Overlap {
        start: u16,
        end: u32,
        existing_start: u16,
        existing_end: u32,
    },
}

struct RangeDevice {
    start: u16,
    len: u16,
    dev: Box<dyn PortIoDevice>,
}

impl RangeDevice {
    fn end_exclusive(&self) -> u32 {
        u32::from(self.start) + u32::from(self.len)
    }

    fn contains(&self, port: u16) -> bool {
        let p = u32::from(port);
        p >= u32::from(self.start) && p < self.end_exclusive()
    }
}

/// Port-mapped I/O dispatch for the 64K x86 I/O space.
///
/// Devices claim non-overlapping windows; any access that lands outside every
/// window floats the bus high.
pub struct IoPortBus {
    ranges: Vec<RangeDevice>,
}

impl IoPortBus {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Registers a single device over a contiguous I/O port range.
    ///
    /// Ranges are kept sorted by start port; a window that would overlap an
    /// existing registration is refused so that attach can fail cleanly.
    pub fn register_range(
        &mut self,
        start: u16,
        len: u16,
        dev: Box<dyn PortIoDevice>,
    ) -> Result<(), IoBusError> {
        if len == 0 {
            return Err(IoBusError::EmptyRange);
        }

        let end_exclusive = u32::from(start) + u32::from(len);
        if end_exclusive > 0x1_0000 {
            return Err(IoBusError::Wraps { start, len });
        }

        let idx = self.ranges.partition_point(|r| r.start < start);

        let neighbours = [
            idx.checked_sub(1).and_then(|i| self.ranges.get(i)),
            self.ranges.get(idx),
        ];
        for existing in neighbours.into_iter().flatten() {
            let overlaps = u32::from(start) < existing.end_exclusive()
                && u32::from(existing.start) < end_exclusive;
            if overlaps {
                return Err(IoBusError::Overlap {
                    start,
                    end: end_exclusive,
                    existing_start: existing.start,
                    existing_end: existing.end_exclusive(),
                });
            }
        }

        tracing::debug!(start, len, "registered I/O port range");
        self.ranges.insert(idx, RangeDevice { start, len, dev });
        Ok(())
    }

    /// Unregister a range-mapped device previously registered via [`Self::register_range`].
    ///
    /// Returns the removed device if a range exactly matching `(start, len)` exists. Calling it
    /// again after removal returns `None`.
    pub fn unregister_range_device(
        &mut self,
        start: u16,
        len: u16,
    ) -> Option<Box<dyn PortIoDevice>> {
        if len == 0 {
            return None;
        }

        let idx = self.ranges.partition_point(|r| r.start < start);
        let cand = self.ranges.get(idx)?;
        if cand.start != start || cand.len != len {
            return None;
        }
        tracing::debug!(start, len, "unregistered I/O port range");
        Some(self.ranges.remove(idx).dev)
    }

    pub fn is_mapped(&self, port: u16) -> bool {
        self.find_range_index(port).is_some()
    }

    fn find_range_index(&self, port: u16) -> Option<usize> {
        let idx = self.ranges.partition_point(|r| r.start <= port);
        if idx == 0 {
            return None;
        }
        let cand = idx - 1;
        self.ranges
            .get(cand)
            .is_some_and(|r| r.contains(port))
            .then_some(cand)
    }

    pub fn read(&mut self, port: u16, size: u8) -> u32 {
        if size == 0 {
            return 0;
        }

        // x86 port I/O instructions only support access sizes {1,2,4}.
        if !matches!(size, 1 | 2 | 4) {
            return 0xFFFF_FFFF;
        }

        match self.find_range_index(port) {
            Some(idx) => self.ranges[idx].dev.read(port, size),
            None => match size {
                1 => 0xFF,
                2 => 0xFFFF,
                _ => 0xFFFF_FFFF,
            },
        }
    }

    pub fn write(&mut self, port: u16, size: u8, value: u32) {
        if !matches!(size, 1 | 2 | 4) {
            return;
        }
        if let Some(idx) = self.find_range_index(port) {
            self.ranges[idx].dev.write(port, size, value);
        }
    }

    pub fn read_u8(&mut self, port: u16) -> u8 {
        self.read(port, 1) as u8
    }

    pub fn write_u8(&mut self, port: u16, value: u8) {
        self.write(port, 1, value as u32);
    }

    pub fn reset(&mut self) {
        for range in self.ranges.iter_mut() {
            range.dev.reset();
        }
    }
}

impl Default for IoPortBus {
    fn default() -> Self {
        Self::new()
    }
}
