use thiserror::Error;

/// Validation failures when attaching to a mapped section.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("section too small: {len} bytes")]
    Truncated { len: usize },

    #[error("bad section magic {found:#x}")]
    BadMagic { found: u32 },

    #[error("unsupported section version {found}")]
    BadVersion { found: u32 },

    #[error("section base is not 4-byte aligned")]
    Misaligned,
}
