/// SeedLink protocol generation negotiated with a server.
///
/// `V3` covers the legacy 8-byte-header dialogue (uni/multi-station,
/// `STATION`/`DATA`/`END`); `V4` covers the 17-byte variable-length framing
/// introduced alongside `SLPROTO`/`GETCAPABILITIES` negotiation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V3,
    V4,
}

impl ProtocolVersion {
    /// Classify a `"SeedLink vM.m"` major version (major `< 4` is v3, `>= 4` is v4).
    pub fn from_major_minor(major: u8, _minor: u8) -> Self {
        if major >= 4 { Self::V4 } else { Self::V3 }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V3 => "v3",
            Self::V4 => "v4",
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_below_four_is_v3() {
        assert_eq!(ProtocolVersion::from_major_minor(3, 1), ProtocolVersion::V3);
        assert_eq!(ProtocolVersion::from_major_minor(2, 93), ProtocolVersion::V3);
    }

    #[test]
    fn major_four_or_above_is_v4() {
        assert_eq!(ProtocolVersion::from_major_minor(4, 0), ProtocolVersion::V4);
        assert_eq!(ProtocolVersion::from_major_minor(5, 0), ProtocolVersion::V4);
    }

    #[test]
    fn display() {
        assert_eq!(ProtocolVersion::V3.to_string(), "v3");
        assert_eq!(ProtocolVersion::V4.to_string(), "v4");
    }
}
