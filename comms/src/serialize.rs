pub trait Serialize<'a> {
    /// Appends the message's fixed-size fields to `buf` and optionally
    /// returns a borrowed tail to be written after it without copying.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
