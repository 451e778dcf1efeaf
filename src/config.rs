//! Codec behaviour switches owned by a [`SerializerRegistry`](crate::SerializerRegistry).

/// Nesting depth allowed by [`CodecConfig::default`].
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Options that change how values are written and how deep decoding may go.
///
/// ```rust
/// use senax_protobuf::CodecConfig;
///
/// let config = CodecConfig::default()
///     .with_encode_defaults(true)
///     .with_recursion_limit(16);
/// assert!(config.encode_defaults);
/// assert!(config.pack_repeated_scalars);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Write fields even when they hold their default value.
    pub encode_defaults: bool,
    /// Maximum depth of nested, polymorphic and map-entry messages, on encode and decode.
    pub recursion_limit: usize,
    /// Packing used for repeated scalar fields that leave `packed` unset.
    pub pack_repeated_scalars: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            encode_defaults: false,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            pack_repeated_scalars: true,
        }
    }
}

impl CodecConfig {
    pub fn with_encode_defaults(mut self, encode_defaults: bool) -> Self {
        self.encode_defaults = encode_defaults;
        self
    }

    pub fn with_recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }

    pub fn with_pack_repeated_scalars(mut self, pack: bool) -> Self {
        self.pack_repeated_scalars = pack;
        self
    }
}
