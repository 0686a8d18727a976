use std::fmt;

/// Byte orders accepted by the `byte_order` attribute of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first (`big-endian`)
    BigEndian,
    /// Least significant byte first (`little-endian`)
    LittleEndian,
    /// Byte order of the host (`native`)
    #[default]
    Native,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigEndian => "big-endian",
            Self::LittleEndian => "little-endian",
            Self::Native => "native",
        }
    }

    /// Parse an attribute value. Returns `None` for unknown spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "big-endian" | "be" | "big" => Some(Self::BigEndian),
            "little-endian" | "le" | "little" => Some(Self::LittleEndian),
            "native" => Some(Self::Native),
            _ => None,
        }
    }

    /// Replace [`ByteOrder::Native`] with the byte order of the host.
    pub fn resolve(self) -> Self {
        match self {
            Self::Native if cfg!(target_endian = "big") => Self::BigEndian,
            Self::Native => Self::LittleEndian,
            other => other,
        }
    }

    pub fn is_big_endian(self) -> bool {
        self.resolve() == Self::BigEndian
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
