/// Byte order applied to each leaf primitive field of an encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Endianness {
    /// The byte order of the host machine.
    #[default]
    Native,
    Little,
    Big,
}

impl Endianness {
    /// Whether this byte order matches the host, i.e. no swapping is needed.
    #[inline]
    pub fn is_native(self) -> bool {
        match self {
            Endianness::Native => true,
            Endianness::Little => cfg!(target_endian = "little"),
            Endianness::Big => cfg!(target_endian = "big"),
        }
    }
}
