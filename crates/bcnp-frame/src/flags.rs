use std::fmt;

bitflags::bitflags! {
    /// Packet header flags.
    ///
    /// Bit 0 asks the receiver to clear its command queue before applying the
    /// batch. Bits 1-7 are reserved; they are carried through encode and
    /// decode unchanged.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// Drop queued commands before this batch.
        const CLEAR_QUEUE = 0x01;
    }
}

impl Flags {
    pub const NONE: Flags = Flags::empty();

    pub const fn clear_queue(self) -> bool {
        self.contains(Self::CLEAR_QUEUE)
    }

    /// Set or clear the clear-queue bit, keeping all other bits.
    pub const fn with_clear_queue(self, on: bool) -> Self {
        if on {
            Self::from_bits_retain(self.bits() | Self::CLEAR_QUEUE.bits())
        } else {
            Self::from_bits_retain(self.bits() & !Self::CLEAR_QUEUE.bits())
        }
    }

    /// Reserved bits that are set.
    pub const fn reserved(self) -> u8 {
        self.bits() & !Self::all().bits()
    }
}

impl From<u8> for Flags {
    fn from(bits: u8) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<Flags> for u8 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.bits())?;
        if self.clear_queue() {
            f.write_str(" [clear-queue]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_queue_bit() {
        assert!(!Flags::NONE.clear_queue());
        assert!(Flags::CLEAR_QUEUE.clear_queue());
        assert!(Flags::from_bits_retain(0x81).clear_queue());
        assert_eq!(Flags::NONE.with_clear_queue(true), Flags::CLEAR_QUEUE);
    }

    #[test]
    fn reserved_bits_survive_toggling() {
        let flags = Flags::from_bits_retain(0xA4).with_clear_queue(true);
        assert_eq!(flags.bits(), 0xA5);
        assert_eq!(flags.reserved(), 0xA4);
        assert_eq!(flags.with_clear_queue(false).bits(), 0xA4);
    }

    #[test]
    fn unknown_bits_rejected_by_strict_parse() {
        assert_eq!(Flags::from_bits(0x01), Some(Flags::CLEAR_QUEUE));
        assert_eq!(Flags::from_bits(0x80), None);
        assert_eq!(Flags::from(0x80).bits(), 0x80);
    }

    #[test]
    fn display() {
        assert_eq!(Flags::CLEAR_QUEUE.to_string(), "0x01 [clear-queue]");
        assert_eq!(Flags::from_bits_retain(0x40).to_string(), "0x40");
        assert_eq!((Flags::CLEAR_QUEUE | Flags::from(0x02)).bits(), 0x03);
    }
}
