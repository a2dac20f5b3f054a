//! Scan policy selection.
//!
//! A [`ScanPolicy`] tells a collection cycle which root regions to walk:
//! the calling thread's stack, the writable heap regions of the process,
//! the initialised (`data`) and zero-initialised (`bss`) static sections,
//! and the register snapshot. The bit values are stable and may be stored
//! or transmitted.

use std::fmt;

/// Bitmask selecting the root regions scanned by a collection cycle.
///
/// Individual flags combine with [`ScanPolicy::union`]; the predefined
/// unions cover the common configurations.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy(u8);

impl ScanPolicy {
    /// Scan no roots at all. Every collection sweeps every tracked record.
    pub const NONE: Self = Self(0);
    /// Scan the calling thread's stack.
    pub const STACK: Self = Self(0x01);
    /// Scan the writable heap regions of the process.
    pub const HEAPS: Self = Self(0x02);
    /// Scan the initialised static-data section.
    pub const DATA: Self = Self(0x04);
    /// Scan the zero-initialised static-data section.
    pub const BSS: Self = Self(0x08);
    /// Scan the register snapshot taken at the collection call site.
    pub const REGISTERS: Self = Self(0x10);

    /// Both static sections: `DATA | BSS`.
    pub const ALL_GLOBALS: Self = Self(0x04 | 0x08);
    /// Stack, heaps and both static sections.
    pub const ALL_MEMORY: Self = Self(0x01 | 0x02 | 0x04 | 0x08);
    /// Every root region including the register snapshot.
    pub const EVERYTHING: Self = Self(0x1f);
    /// [`ALL_MEMORY`](Self::ALL_MEMORY) without the heap regions.
    pub const ALL_MEMORY_EXCEPT_HEAPS: Self = Self(0x01 | 0x04 | 0x08);
    /// [`EVERYTHING`](Self::EVERYTHING) without the heap regions.
    pub const EVERYTHING_EXCEPT_HEAPS: Self = Self(0x1f & !0x02);

    const KNOWN_BITS: u8 = 0x1f;

    /// Create a policy from raw bits. Returns `None` if any unknown bit is set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::KNOWN_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// The raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Union of two policies.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Remove the regions selected by `other`.
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// True if every region selected by `other` is also selected by `self`.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Parse a policy from text.
    ///
    /// Accepts a named policy (`stack`, `heaps`, `data`, `bss`, `registers`,
    /// `all-globals`, `all-memory`, `everything`, `all-memory-except-heaps`,
    /// `everything-except-heaps`, `none`), a `|`-joined combination of names,
    /// or a hex bitmask such as `0x1d`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u8::from_str_radix(hex, 16).ok().and_then(Self::from_bits);
        }
        let mut policy = Self::NONE;
        for part in s.split('|') {
            let flag = match part.trim().to_lowercase().as_str() {
                "none" => Self::NONE,
                "stack" => Self::STACK,
                "heaps" | "heap" => Self::HEAPS,
                "data" => Self::DATA,
                "bss" => Self::BSS,
                "registers" | "regs" => Self::REGISTERS,
                "all-globals" | "globals" => Self::ALL_GLOBALS,
                "all-memory" => Self::ALL_MEMORY,
                "everything" => Self::EVERYTHING,
                "all-memory-except-heaps" => Self::ALL_MEMORY_EXCEPT_HEAPS,
                "everything-except-heaps" => Self::EVERYTHING_EXCEPT_HEAPS,
                _ => return None,
            };
            policy = policy.union(flag);
        }
        Some(policy)
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::EVERYTHING
    }
}

impl fmt::Debug for ScanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, &str); 5] = [
            (0x01, "stack"),
            (0x02, "heaps"),
            (0x04, "data"),
            (0x08, "bss"),
            (0x10, "registers"),
        ];
        let mut first = true;
        write!(f, "ScanPolicy(")?;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "none")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(ScanPolicy::STACK.bits(), 0x01);
        assert_eq!(ScanPolicy::HEAPS.bits(), 0x02);
        assert_eq!(ScanPolicy::DATA.bits(), 0x04);
        assert_eq!(ScanPolicy::BSS.bits(), 0x08);
        assert_eq!(ScanPolicy::REGISTERS.bits(), 0x10);
    }

    #[test]
    fn unions_compose() {
        assert_eq!(
            ScanPolicy::ALL_GLOBALS.bits(),
            ScanPolicy::DATA.union(ScanPolicy::BSS).bits()
        );
        assert_eq!(
            ScanPolicy::EVERYTHING.bits(),
            ScanPolicy::ALL_MEMORY.union(ScanPolicy::REGISTERS).bits()
        );
        assert_eq!(
            ScanPolicy::EVERYTHING_EXCEPT_HEAPS,
            ScanPolicy::EVERYTHING.without(ScanPolicy::HEAPS)
        );
        assert!(ScanPolicy::EVERYTHING.contains(ScanPolicy::ALL_GLOBALS));
        assert!(!ScanPolicy::ALL_GLOBALS.contains(ScanPolicy::STACK));
    }

    #[test]
    fn from_bits_rejects_unknown() {
        assert_eq!(ScanPolicy::from_bits(0x1f), Some(ScanPolicy::EVERYTHING));
        assert_eq!(ScanPolicy::from_bits(0x20), None);
        assert_eq!(ScanPolicy::from_bits(0xff), None);
    }

    #[test]
    fn parse_names_and_hex() {
        assert_eq!(ScanPolicy::parse("everything"), Some(ScanPolicy::EVERYTHING));
        assert_eq!(
            ScanPolicy::parse("stack|data|bss"),
            Some(ScanPolicy::ALL_MEMORY_EXCEPT_HEAPS)
        );
        assert_eq!(ScanPolicy::parse("0x1f"), Some(ScanPolicy::EVERYTHING));
        assert_eq!(ScanPolicy::parse("0x40"), None);
        assert_eq!(ScanPolicy::parse("bogus"), None);
    }

    #[test]
    fn debug_lists_flag_names() {
        let s = format!("{:?}", ScanPolicy::DATA.union(ScanPolicy::BSS));
        assert_eq!(s, "ScanPolicy(data|bss)");
        assert_eq!(format!("{:?}", ScanPolicy::NONE), "ScanPolicy(none)");
    }
}
